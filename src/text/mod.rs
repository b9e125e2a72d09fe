//! テキスト（ロープ）モジュール
//!
//! 行単位のチャンクを葉に持つ不変B木によるドキュメント内容の表現。
//! 編集は新しい値を生成し、変更されなかった部分木は参照共有される

pub mod cursor;

pub use cursor::{Direction, LineCursor, PartialTextCursor, RawTextCursor, TextToken};

use crate::error::{text::Result, TextError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// 分岐係数のシフト量
pub(crate) const BRANCH_SHIFT: u32 = 5;
/// 葉が保持する最大行数、および分岐の目安となる子の数
pub(crate) const BRANCH: usize = 1 << BRANCH_SHIFT;

const OPEN_FROM: u8 = 1;
const OPEN_TO: u8 = 2;

/// 不変テキスト
///
/// 複製は参照カウントの増加のみで、既存の値が変更されることはない
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Text(Arc<Node>);

enum Node {
    Leaf(TextLeaf),
    Branch(TextBranch),
}

struct TextLeaf {
    /// 行（改行文字を含まない）
    text: Vec<String>,
    length: usize,
}

struct TextBranch {
    children: Vec<Text>,
    lines: usize,
    length: usize,
}

/// 行情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 行頭位置
    pub from: usize,
    /// 行末位置（改行の直前）
    pub to: usize,
    /// 行番号（1ベース）
    pub number: usize,
    /// 行の内容
    pub text: &'a str,
}

impl Line<'_> {
    /// 行の長さ（文字数）
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl Text {
    /// 空のドキュメント（1行の空行）
    pub fn empty() -> Text {
        static EMPTY: OnceLock<Text> = OnceLock::new();
        EMPTY
            .get_or_init(|| Text::leaf(vec![String::new()], 0))
            .clone()
    }

    /// 行の配列からテキストを作成
    ///
    /// 行は改行文字を含んではならない。0行の場合は失敗する
    pub fn of<I, S>(lines: I) -> Result<Text>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            return Err(TextError::EmptyDocument);
        }
        Ok(Text::from_lines(lines))
    }

    /// 分割済みの行から作成。0行なら空のドキュメント
    pub(crate) fn from_lines(lines: Vec<String>) -> Text {
        if lines.len() <= 1 && lines.first().map_or(true, String::is_empty) {
            return Text::empty();
        }
        if lines.len() <= BRANCH {
            return Text::leaf_from_lines(lines);
        }
        let mut leaves = Vec::with_capacity(lines.len() / BRANCH + 1);
        split_leaves(lines, &mut leaves);
        Text::from_children(leaves, None)
    }

    fn leaf(text: Vec<String>, length: usize) -> Text {
        Text(Arc::new(Node::Leaf(TextLeaf { text, length })))
    }

    fn leaf_from_lines(text: Vec<String>) -> Text {
        let length = text_length(&text);
        Text::leaf(text, length)
    }

    fn branch(children: Vec<Text>, length: usize) -> Text {
        let lines = children.iter().map(Text::lines).sum();
        Text(Arc::new(Node::Branch(TextBranch {
            children,
            lines,
            length,
        })))
    }

    /// 文字数（改行も1文字として数える）
    pub fn len(&self) -> usize {
        match &*self.0 {
            Node::Leaf(leaf) => leaf.length,
            Node::Branch(branch) => branch.length,
        }
    }

    /// 空ドキュメントかどうかを判定
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 行数
    pub fn lines(&self) -> usize {
        match &*self.0 {
            Node::Leaf(leaf) => leaf.text.len(),
            Node::Branch(branch) => branch.lines,
        }
    }

    /// 内部ノードの場合は子のリストを返す
    pub fn children(&self) -> Option<&[Text]> {
        match &*self.0 {
            Node::Leaf(_) => None,
            Node::Branch(branch) => Some(&branch.children),
        }
    }

    /// 同一の値（同じノード）を参照しているか
    pub fn ptr_eq(a: &Text, b: &Text) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub(crate) fn child_count(&self) -> usize {
        match &*self.0 {
            Node::Leaf(leaf) => leaf.text.len(),
            Node::Branch(branch) => branch.children.len(),
        }
    }

    /// 指定位置を含む行を取得
    pub fn line_at(&self, pos: usize) -> Result<Line<'_>> {
        if pos > self.len() {
            return Err(TextError::PositionOutOfRange {
                pos,
                length: self.len(),
            });
        }
        Ok(self.line_inner(pos, false, 1, 0))
    }

    /// 行番号（1ベース）で行を取得
    pub fn line(&self, n: usize) -> Result<Line<'_>> {
        if n < 1 || n > self.lines() {
            return Err(TextError::LineOutOfRange {
                line: n,
                lines: self.lines(),
            });
        }
        Ok(self.line_inner(n, true, 1, 0))
    }

    fn line_inner(&self, target: usize, is_line: bool, mut line: usize, mut offset: usize) -> Line<'_> {
        match &*self.0 {
            Node::Leaf(leaf) => {
                let last = leaf.text.len() - 1;
                for (i, string) in leaf.text.iter().enumerate() {
                    let end = offset + char_len(string);
                    if (if is_line { line } else { end }) >= target || i == last {
                        return Line {
                            from: offset,
                            to: end,
                            number: line,
                            text: string,
                        };
                    }
                    offset = end + 1;
                    line += 1;
                }
                unreachable!("leaf without lines")
            }
            Node::Branch(branch) => {
                let last = branch.children.len() - 1;
                for (i, child) in branch.children.iter().enumerate() {
                    let end = offset + child.len();
                    let end_line = line + child.lines() - 1;
                    if (if is_line { end_line } else { end }) >= target || i == last {
                        return child.line_inner(target, is_line, line, offset);
                    }
                    offset = end + 1;
                    line = end_line + 1;
                }
                unreachable!("branch without children")
            }
        }
    }

    fn check_range(&self, from: usize, to: usize) -> Result<()> {
        if from > to || to > self.len() {
            return Err(TextError::InvalidRange {
                from,
                to,
                length: self.len(),
            });
        }
        Ok(())
    }

    /// `[from, to)` を `text` で置き換えた新しいテキストを返す
    pub fn replace(&self, from: usize, to: usize, text: &Text) -> Result<Text> {
        self.check_range(from, to)?;
        Ok(self.replace_inner(from, to, text))
    }

    pub(crate) fn replace_inner(&self, from: usize, to: usize, text: &Text) -> Text {
        match (&*self.0, &*text.0) {
            (Node::Leaf(leaf), Node::Leaf(inserted)) => {
                let head = slice_text(&leaf.text, 0, from);
                let lines = append_text(&leaf.text, append_text(&inserted.text, head, 0, usize::MAX), to, usize::MAX);
                let new_len = leaf.length + inserted.length - (to - from);
                if lines.len() <= BRANCH {
                    return Text::leaf(lines, new_len);
                }
                let mut leaves = Vec::new();
                split_leaves(lines, &mut leaves);
                Text::from_children(leaves, Some(new_len))
            }
            (Node::Branch(branch), _) => {
                if text.lines() < branch.lines {
                    let mut pos = 0;
                    for (i, child) in branch.children.iter().enumerate() {
                        let end = pos + child.len();
                        // 1つの子に収まる編集で、子のサイズが許容範囲に留まるならその子だけを更新
                        if from >= pos && to <= end {
                            let updated = child.replace_inner(from - pos, to - pos, text);
                            let total_lines = branch.lines - child.lines() + updated.lines();
                            if updated.lines() < (total_lines >> (BRANCH_SHIFT - 1))
                                && updated.lines() > (total_lines >> (BRANCH_SHIFT + 1))
                            {
                                let mut copy = branch.children.clone();
                                copy[i] = updated;
                                return Text::branch(copy, branch.length - (to - from) + text.len());
                            }
                            log::trace!("text: child {} out of balance after edit, rebuilding", i);
                            return self.replace_general(pos, end, &updated);
                        }
                        pos = end + 1;
                    }
                }
                self.replace_general(from, to, text)
            }
            _ => self.replace_general(from, to, text),
        }
    }

    fn replace_general(&self, from: usize, to: usize, text: &Text) -> Text {
        let mut parts = Vec::new();
        self.decompose(0, from, &mut parts, OPEN_TO);
        if text.len() > 0 {
            text.decompose(0, text.len(), &mut parts, OPEN_FROM | OPEN_TO);
        }
        self.decompose(to, self.len(), &mut parts, OPEN_FROM);
        Text::from_children(parts, Some(self.len() - (to - from) + text.len()))
    }

    /// 末尾に別のテキストを連結
    pub fn append(&self, other: &Text) -> Text {
        self.replace_inner(self.len(), self.len(), other)
    }

    /// `[from, to)` の部分テキストを取得
    pub fn slice(&self, from: usize, to: usize) -> Result<Text> {
        self.check_range(from, to)?;
        Ok(self.slice_inner(from, to))
    }

    pub(crate) fn slice_inner(&self, from: usize, to: usize) -> Text {
        let mut parts = Vec::new();
        self.decompose(from, to, &mut parts, 0);
        Text::from_children(parts, Some(to - from))
    }

    /// `[from, to)` を文字列として取得（行は `line_sep` で連結）
    pub fn slice_string(&self, from: usize, to: usize, line_sep: &str) -> Result<String> {
        self.check_range(from, to)?;
        let mut result = String::new();
        self.slice_string_inner(from, to, line_sep, &mut result);
        Ok(result)
    }

    fn slice_string_inner(&self, from: usize, to: usize, line_sep: &str, result: &mut String) {
        let mut pos = 0;
        match &*self.0 {
            Node::Leaf(leaf) => {
                for (i, line) in leaf.text.iter().enumerate() {
                    if pos > to {
                        break;
                    }
                    let end = pos + char_len(line);
                    if pos > from && i > 0 {
                        result.push_str(line_sep);
                    }
                    if from < end && to > pos {
                        result.push_str(char_slice(line, from.saturating_sub(pos), to - pos));
                    }
                    pos = end + 1;
                }
            }
            Node::Branch(branch) => {
                for (i, child) in branch.children.iter().enumerate() {
                    if pos > to {
                        break;
                    }
                    let end = pos + child.len();
                    if pos > from && i > 0 {
                        result.push_str(line_sep);
                    }
                    if from < end && to > pos {
                        child.slice_string_inner(from.saturating_sub(pos), to - pos, line_sep, result);
                    }
                    pos = end + 1;
                }
            }
        }
    }

    /// 前方（または後方）へ行と改行を順に返すカーソル
    pub fn iter(&self, dir: Direction) -> RawTextCursor<'_> {
        RawTextCursor::new(self, dir)
    }

    /// 範囲内のみを走査するカーソル。`from > to` の場合は後方へ走査
    pub fn iter_range(&self, from: usize, to: usize) -> Result<PartialTextCursor<'_>> {
        let (lo, hi) = (from.min(to), from.max(to));
        self.check_range(lo, hi)?;
        Ok(PartialTextCursor::new(self, from, to))
    }

    /// ドキュメント全体を行単位で走査
    pub fn iter_lines(&self) -> LineCursor<'_> {
        LineCursor::new(self.iter(Direction::Forward).into())
    }

    /// 行番号 `from` から `to` の直前の行までを走査（`to` 省略時は最終行まで）
    pub fn iter_lines_range(&self, from: usize, to: Option<usize>) -> Result<LineCursor<'_>> {
        let to = to.unwrap_or(self.lines() + 1);
        let start = self.line(from)?.from;
        let end = if to == self.lines() + 1 {
            self.len()
        } else if to <= 1 {
            0
        } else {
            self.line(to - 1)?.to
        };
        let cursor = PartialTextCursor::new(self, start, start.max(end));
        Ok(LineCursor::new(cursor.into()))
    }

    /// 行の配列へ変換
    pub fn to_json(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.lines());
        self.flatten(&mut lines);
        lines
    }

    fn flatten(&self, target: &mut Vec<String>) {
        match &*self.0 {
            Node::Leaf(leaf) => target.extend(leaf.text.iter().cloned()),
            Node::Branch(branch) => {
                for child in &branch.children {
                    child.flatten(target);
                }
            }
        }
    }

    /// `[from, to)` を部品に分解して `target` に追加
    ///
    /// 開いている端の部品は隣接する部品と行を共有するため、葉として結合される
    fn decompose(&self, from: usize, to: usize, target: &mut Vec<Text>, open: u8) {
        match &*self.0 {
            Node::Leaf(leaf) => {
                let text = if from == 0 && to >= leaf.length {
                    self.clone()
                } else {
                    Text::leaf(slice_text(&leaf.text, from, to), to.min(leaf.length) - from)
                };
                if open & OPEN_FROM != 0 {
                    let mut prev_lines = Vec::new();
                    let prev_len = match target.pop() {
                        Some(prev) => {
                            prev.flatten(&mut prev_lines);
                            prev.len()
                        }
                        None => {
                            prev_lines.push(String::new());
                            0
                        }
                    };
                    let text_lines = match &*text.0 {
                        Node::Leaf(leaf) => &leaf.text,
                        Node::Branch(_) => unreachable!("decompose of a leaf yields a leaf"),
                    };
                    let joined = append_text(text_lines, prev_lines, 0, text.len());
                    if joined.len() <= BRANCH {
                        target.push(Text::leaf(joined, prev_len + text.len()));
                    } else {
                        let mut joined = joined;
                        let tail = joined.split_off(joined.len() >> 1);
                        target.push(Text::leaf_from_lines(joined));
                        target.push(Text::leaf_from_lines(tail));
                    }
                } else {
                    target.push(text);
                }
            }
            Node::Branch(branch) => {
                let mut pos = 0;
                for child in &branch.children {
                    if pos > to {
                        break;
                    }
                    let end = pos + child.len();
                    if from <= end && to >= pos {
                        let child_open = open
                            & ((if pos <= from { OPEN_FROM } else { 0 })
                                | (if end >= to { OPEN_TO } else { 0 }));
                        if pos >= from && end <= to && child_open == 0 {
                            target.push(child.clone());
                        } else {
                            child.decompose(
                                from.saturating_sub(pos),
                                (to - pos).min(child.len()),
                                target,
                                child_open,
                            );
                        }
                    }
                    pos = end + 1;
                }
            }
        }
    }

    /// 先頭（または末尾）から同一ノードを共有している長さを数える
    fn scan_identical(&self, other: &Text, dir: Direction) -> usize {
        let (a, b) = match (self.children(), other.children()) {
            (Some(a), Some(b)) => (a, b),
            _ => return 0,
        };
        let mut length = 0;
        for k in 0..a.len().min(b.len()) {
            let (child_a, child_b) = match dir {
                Direction::Forward => (&a[k], &b[k]),
                Direction::Backward => (&a[a.len() - 1 - k], &b[b.len() - 1 - k]),
            };
            if !Text::ptr_eq(child_a, child_b) {
                return length + child_a.scan_identical(child_b, dir);
            }
            length += child_a.len() + 1;
        }
        length
    }

    /// 子のリストから木を再構築する
    ///
    /// 合計行数が少なければ1つの葉に平坦化し、そうでなければ
    /// `lines / 32` 程度の行数を持つ塊にまとめる
    fn from_children(children: Vec<Text>, length: Option<usize>) -> Text {
        let length = length.unwrap_or_else(|| {
            children
                .iter()
                .map(|child| child.len() + 1)
                .sum::<usize>()
                .saturating_sub(1)
        });
        let lines: usize = children.iter().map(Text::lines).sum();
        if lines < BRANCH {
            let mut flat = Vec::with_capacity(lines);
            for child in &children {
                child.flatten(&mut flat);
            }
            return Text::leaf(flat, length);
        }

        let chunk = BRANCH.max(lines >> BRANCH_SHIFT);
        let mut chunker = Chunker::new(chunk);
        for child in children {
            chunker.add(child);
        }
        chunker.flush();
        let mut chunked = chunker.chunked;
        if chunked.len() == 1 {
            if let Some(only) = chunked.pop() {
                return only;
            }
        }
        Text::branch(chunked, length)
    }
}

/// 再構築時に子を一定サイズの塊へまとめる作業状態
struct Chunker {
    chunk: usize,
    max_chunk: usize,
    min_chunk: usize,
    chunked: Vec<Text>,
    current: Vec<Text>,
    current_lines: usize,
    /// 現在の塊の (長さ + 1) の合計
    current_len: usize,
}

impl Chunker {
    fn new(chunk: usize) -> Self {
        Self {
            chunk,
            max_chunk: chunk << 1,
            min_chunk: chunk >> 1,
            chunked: Vec::new(),
            current: Vec::new(),
            current_lines: 0,
            current_len: 0,
        }
    }

    fn add(&mut self, child: Text) {
        let child_lines = child.lines();
        if child_lines > self.max_chunk {
            if let Some(children) = child.children() {
                for node in children {
                    self.add(node.clone());
                }
                return;
            }
        }
        if child_lines > self.min_chunk && (self.current_lines > self.min_chunk || self.current_lines == 0) {
            self.flush();
            self.chunked.push(child);
            return;
        }
        if let (Node::Leaf(leaf), Some(last)) = (&*child.0, self.current.last_mut()) {
            if let Node::Leaf(last_leaf) = &*last.0 {
                if self.current_lines > 0 && child_lines + last_leaf.text.len() <= BRANCH {
                    let mut text = last_leaf.text.clone();
                    text.extend(leaf.text.iter().cloned());
                    let merged = Text::leaf(text, last_leaf.length + 1 + leaf.length);
                    self.current_lines += child_lines;
                    self.current_len += child.len() + 1;
                    *last = merged;
                    return;
                }
            }
        }
        if self.current_lines + child_lines > self.chunk {
            self.flush();
        }
        self.current_lines += child_lines;
        self.current_len += child.len() + 1;
        self.current.push(child);
    }

    fn flush(&mut self) {
        if self.current_lines == 0 {
            return;
        }
        let mut current = std::mem::take(&mut self.current);
        let node = if current.len() == 1 {
            current.remove(0)
        } else {
            Text::from_children(current, Some(self.current_len - 1))
        };
        self.chunked.push(node);
        self.current_lines = 0;
        self.current_len = 0;
    }
}

impl PartialEq for Text {
    /// 共有されている先頭・末尾の部分木を読み飛ばし、異なる中央部分のみを比較する
    fn eq(&self, other: &Text) -> bool {
        if Text::ptr_eq(self, other) {
            return true;
        }
        if self.len() != other.len() || self.lines() != other.lines() {
            return false;
        }
        let start = self.scan_identical(other, Direction::Forward);
        let end = self.len().saturating_sub(self.scan_identical(other, Direction::Backward));
        let mut a = RawTextCursor::new(self, Direction::Forward);
        let mut b = RawTextCursor::new(other, Direction::Forward);
        let mut skip = start;
        let mut pos = start;
        loop {
            let token_a = a.advance(skip);
            let token_b = b.advance(skip);
            skip = 0;
            if token_a != token_b {
                return false;
            }
            match token_a {
                None => return true,
                Some(token) => pos += token.len(),
            }
            if pos >= end {
                return true;
            }
        }
    }
}

impl Eq for Text {}

impl Default for Text {
    fn default() -> Self {
        Text::empty()
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = String::with_capacity(self.len());
        self.slice_string_inner(0, self.len(), "\n", &mut result);
        f.write_str(&result)
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Text").field(&self.to_json()).finish()
    }
}

impl FromStr for Text {
    type Err = TextError;

    /// `\r\n`・`\r`・`\n` のいずれかで行に分割して作成
    fn from_str(s: &str) -> Result<Text> {
        Text::of(crate::config::TextConfig::default().split(s))
    }
}

impl TryFrom<Vec<String>> for Text {
    type Error = TextError;

    fn try_from(lines: Vec<String>) -> Result<Text> {
        Text::of(lines)
    }
}

impl From<Text> for Vec<String> {
    fn from(text: Text) -> Self {
        text.to_json()
    }
}

/// 文字列の文字数
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(idx, _)| idx).unwrap_or(s.len())
}

/// 文字単位で部分文字列を取得（範囲外は切り詰める）
pub(crate) fn char_slice(s: &str, from: usize, to: usize) -> &str {
    if from >= to {
        return "";
    }
    let start = byte_offset(s, from);
    let end = start + byte_offset(&s[start..], to - from);
    &s[start..end]
}

fn text_length(text: &[String]) -> usize {
    text.iter().map(|line| char_len(line) + 1).sum::<usize>() - 1
}

/// `text` の `[from, to)` を `target` の末尾へ追加する。最初の行は `target` の最終行に連結される
fn append_text(text: &[String], mut target: Vec<String>, from: usize, to: usize) -> Vec<String> {
    let mut pos = 0;
    let mut first = true;
    for line in text {
        if pos > to {
            break;
        }
        let end = pos + char_len(line);
        if end >= from {
            let piece = char_slice(line, from.saturating_sub(pos), to.saturating_sub(pos).min(end - pos));
            if first {
                match target.last_mut() {
                    Some(last) => last.push_str(piece),
                    None => target.push(piece.to_string()),
                }
                first = false;
            } else {
                target.push(piece.to_string());
            }
        }
        pos = end + 1;
    }
    target
}

fn slice_text(text: &[String], from: usize, to: usize) -> Vec<String> {
    append_text(text, vec![String::new()], from, to)
}

/// 行の配列を最大 `BRANCH` 行の葉に分割
fn split_leaves(text: Vec<String>, target: &mut Vec<Text>) {
    let mut part = Vec::with_capacity(BRANCH);
    for line in text {
        part.push(line);
        if part.len() == BRANCH {
            target.push(Text::leaf_from_lines(std::mem::replace(&mut part, Vec::with_capacity(BRANCH))));
        }
    }
    if !part.is_empty() {
        target.push(Text::leaf_from_lines(part));
    }
}
