//! 区間列の操作
//!
//! 変更記述子を構成する区間の追加規則、区間カーソル、
//! および合成（compose）・写像（map）の2ポインタ併合処理

use crate::error::{change::Result, ChangeError};
use crate::text::Text;

/// 旧ドキュメント上の連続した区間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Section {
    /// 旧ドキュメントでの長さ
    pub len: usize,
    /// 置換後の長さ（`None` は変更なし）
    pub ins: Option<usize>,
}

/// カーソルが指している区間の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// 変更なし
    Unchanged,
    /// 置換（値は残りの挿入長）
    Replaced(usize),
    /// 走査終了
    Done,
}

/// 区間を末尾に追加する
///
/// 同種の区間は結合し、隣接する「変更なし」区間が2つ並ぶことはない。
/// `force_join` の場合は直前の置換区間に必ず結合する
pub(crate) fn add_section(sections: &mut Vec<Section>, len: usize, ins: Option<usize>, force_join: bool) {
    let unchanged_or_deletion = matches!(ins, None | Some(0));
    if len == 0 && unchanged_or_deletion {
        return;
    }
    if let Some(last) = sections.last_mut() {
        if unchanged_or_deletion && ins == last.ins {
            last.len += len;
            return;
        }
        if len == 0 && last.len == 0 {
            last.ins = Some(last.ins.unwrap_or(0) + ins.unwrap_or(0));
            return;
        }
        if force_join {
            last.len += len;
            last.ins = Some(last.ins.unwrap_or(0) + ins.unwrap_or(0));
            return;
        }
    }
    sections.push(Section { len, ins });
}

/// 直前に追加した区間の挿入内容を記録する
pub(crate) fn add_insert(values: &mut Vec<Text>, sections: &[Section], value: &Text) {
    if value.is_empty() {
        return;
    }
    let index = sections.len().saturating_sub(1);
    if index < values.len() {
        if let Some(last) = values.last_mut() {
            *last = last.append(value);
        }
    } else {
        while values.len() < index {
            values.push(Text::empty());
        }
        values.push(value.clone());
    }
}

/// 変更された範囲を順に走査する
///
/// `individual` でなければ隣接する置換区間は1つにまとめて報告する
pub(crate) fn iter_changes<F>(sections: &[Section], inserted: Option<&[Text]>, individual: bool, mut f: F)
where
    F: FnMut(usize, usize, usize, usize, Text),
{
    let (mut pos_a, mut pos_b) = (0, 0);
    let mut i = 0;
    while i < sections.len() {
        let section = sections[i];
        i += 1;
        if section.ins.is_none() {
            pos_a += section.len;
            pos_b += section.len;
            continue;
        }
        let (mut end_a, mut end_b) = (pos_a, pos_b);
        let mut text = Text::empty();
        let mut current = section;
        let mut index = i - 1;
        loop {
            end_a += current.len;
            end_b += current.ins.unwrap_or(0);
            if current.ins.unwrap_or(0) > 0 {
                if let Some(value) = inserted.and_then(|values| values.get(index)) {
                    text = text.append(value);
                }
            }
            if individual || i == sections.len() || sections[i].ins.is_none() {
                break;
            }
            current = sections[i];
            index = i;
            i += 1;
        }
        f(pos_a, end_a, pos_b, end_b, text);
        pos_a = end_a;
        pos_b = end_b;
    }
}

/// 区間を1つずつ消費するカーソル
///
/// 残りの長さ、区間の種類、挿入内容を公開する。一回限りの走査に使う
pub struct SectionCursor<'a> {
    sections: &'a [Section],
    inserted: Option<&'a [Text]>,
    /// 次に読む区間の番号
    i: usize,
    len: usize,
    kind: SectionKind,
    off: usize,
}

impl<'a> SectionCursor<'a> {
    pub(crate) fn new(sections: &'a [Section], inserted: Option<&'a [Text]>) -> Self {
        let mut cursor = Self {
            sections,
            inserted,
            i: 0,
            len: 0,
            kind: SectionKind::Done,
            off: 0,
        };
        cursor.next_section();
        cursor
    }

    /// 現在の区間の残り長（旧ドキュメント側）
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// 現在の区間内で消費済みの長さ
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn is_done(&self) -> bool {
        self.kind == SectionKind::Done
    }

    fn is_unchanged(&self) -> bool {
        self.kind == SectionKind::Unchanged
    }

    fn replaced(&self) -> Option<usize> {
        match self.kind {
            SectionKind::Replaced(ins) => Some(ins),
            _ => None,
        }
    }

    /// 次の区間へ進む
    pub fn next_section(&mut self) {
        match self.sections.get(self.i) {
            Some(section) => {
                self.len = section.len;
                self.kind = match section.ins {
                    None => SectionKind::Unchanged,
                    Some(ins) => SectionKind::Replaced(ins),
                };
                self.i += 1;
            }
            None => {
                self.len = 0;
                self.kind = SectionKind::Done;
            }
        }
        self.off = 0;
    }

    /// 新ドキュメント側の残り長
    fn len2(&self) -> usize {
        self.replaced().unwrap_or(self.len)
    }

    /// 現在の区間の挿入内容
    pub fn text(&self) -> Text {
        self.inserted
            .and_then(|values| values.get(self.i.wrapping_sub(1)))
            .cloned()
            .unwrap_or_else(Text::empty)
    }

    /// 現在の区間の挿入内容のうち、消費済み位置から `len` 文字
    fn text_bit(&self, len: usize) -> Text {
        match self.inserted.and_then(|values| values.get(self.i.wrapping_sub(1))) {
            Some(value) => {
                let from = self.off.min(value.len());
                value.slice_inner(from, (from + len).min(value.len()))
            }
            None => Text::empty(),
        }
    }

    /// 旧ドキュメント側で `len` 進める
    pub fn forward(&mut self, len: usize) {
        if len == self.len {
            self.next_section();
        } else {
            self.len -= len;
            self.off += len;
        }
    }

    /// 新ドキュメント側で `len` 進める
    fn forward2(&mut self, len: usize) {
        match self.kind {
            SectionKind::Replaced(ins) if ins == len => self.next_section(),
            SectionKind::Replaced(ins) => {
                self.kind = SectionKind::Replaced(ins - len);
                self.off += len;
            }
            _ => self.forward(len),
        }
    }
}

/// 合成・写像の結果
pub(crate) type Merged = (Vec<Section>, Option<Vec<Text>>);

/// `a` の後に `b` を適用する変更を求める
pub(crate) fn compose_sections(mut a: SectionCursor<'_>, mut b: SectionCursor<'_>, mk_set: bool) -> Result<Merged> {
    let mut sections = Vec::new();
    let mut insert: Option<Vec<Text>> = mk_set.then(Vec::new);
    let mut open = false;
    loop {
        if a.is_done() && b.is_done() {
            return Ok((sections, insert));
        } else if a.kind == SectionKind::Replaced(0) {
            // a での削除
            add_section(&mut sections, a.len, Some(0), open);
            a.next_section();
        } else if let (0, SectionKind::Replaced(ins)) = (b.len, b.kind) {
            // b での挿入
            add_section(&mut sections, 0, Some(ins), open);
            if let Some(insert) = insert.as_mut() {
                add_insert(insert, &sections, &b.text());
            }
            b.next_section();
        } else if a.is_done() || b.is_done() {
            return Err(ChangeError::MismatchedLengths);
        } else {
            let len = a.len2().min(b.len);
            let section_len = sections.len();
            match (a.replaced(), b.replaced()) {
                (None, b_ins) => {
                    let ins_b = b_ins.map(|ins| if b.off > 0 { 0 } else { ins });
                    add_section(&mut sections, len, ins_b, open);
                    if let (Some(insert), Some(ins)) = (insert.as_mut(), ins_b) {
                        if ins > 0 {
                            add_insert(insert, &sections, &b.text());
                        }
                    }
                }
                (Some(_), None) => {
                    add_section(&mut sections, if a.off > 0 { 0 } else { a.len }, Some(len), open);
                    if let Some(insert) = insert.as_mut() {
                        add_insert(insert, &sections, &a.text_bit(len));
                    }
                }
                (Some(_), Some(b_ins)) => {
                    add_section(
                        &mut sections,
                        if a.off > 0 { 0 } else { a.len },
                        Some(if b.off > 0 { 0 } else { b_ins }),
                        open,
                    );
                    if let Some(insert) = insert.as_mut() {
                        if b.off == 0 {
                            add_insert(insert, &sections, &b.text());
                        }
                    }
                }
            }
            let a_continues = matches!(a.kind, SectionKind::Replaced(ins) if ins > len);
            let b_continues = b.replaced().is_some() && b.len > len;
            open = (a_continues || b_continues) && (open || sections.len() > section_len);
            a.forward2(len);
            b.forward(len);
        }
    }
}

/// 同じドキュメントを起点とする `a` を、`b` の適用後に適用できる形へ写す
///
/// `before` は同一位置への挿入が競合したときに `a` の挿入を前に置くかどうか
pub(crate) fn map_sections(mut a: SectionCursor<'_>, mut b: SectionCursor<'_>, before: bool, mk_set: bool) -> Result<Merged> {
    let mut sections = Vec::new();
    let mut insert: Option<Vec<Text>> = mk_set.then(Vec::new);
    // 分割して処理する a の置換について、挿入内容を出力済みの区間番号
    let mut inserted: Option<usize> = None;
    loop {
        let fresh = |a: &SectionCursor<'_>, inserted: Option<usize>| inserted.map_or(true, |i| i < a.i);
        if (a.is_done() && b.len > 0) || (b.is_done() && a.len > 0) {
            return Err(ChangeError::MismatchedLengths);
        } else if a.is_unchanged() && b.is_unchanged() {
            // 両方で変更のない範囲
            let len = a.len.min(b.len);
            add_section(&mut sections, len, None, false);
            a.forward(len);
            b.forward(len);
        } else if let Some(b_ins) = b.replaced().filter(|_| {
            a.replaced().is_none()
                || inserted == Some(a.i)
                || (a.off == 0 && (b.len < a.len || (b.len == a.len && !before)))
        }) {
            // a の次の変更より前にある b の変更を飛ばし、覆われる a の変更を処理する
            let mut len = b.len;
            add_section(&mut sections, b_ins, None, false);
            while len > 0 {
                let piece = a.len.min(len);
                if piece == 0 && a.is_done() {
                    return Err(ChangeError::MismatchedLengths);
                }
                if let Some(a_ins) = a.replaced() {
                    if fresh(&a, inserted) && a.len <= piece {
                        add_section(&mut sections, 0, Some(a_ins), false);
                        if let Some(insert) = insert.as_mut() {
                            add_insert(insert, &sections, &a.text());
                        }
                        inserted = Some(a.i);
                    }
                }
                a.forward(piece);
                len -= piece;
            }
            b.next_section();
        } else if let Some(a_ins) = a.replaced() {
            // b の次の（削除以外の）変更が始まるまでの a の変更を処理する
            let mut len = 0;
            let mut left = a.len;
            while left > 0 {
                match b.kind {
                    SectionKind::Unchanged => {
                        let piece = left.min(b.len);
                        len += piece;
                        left -= piece;
                        b.forward(piece);
                    }
                    SectionKind::Replaced(0) if b.len < left => {
                        left -= b.len;
                        b.next_section();
                    }
                    _ => break,
                }
            }
            let is_fresh = fresh(&a, inserted);
            add_section(&mut sections, len, Some(if is_fresh { a_ins } else { 0 }), false);
            if is_fresh {
                if let Some(insert) = insert.as_mut() {
                    add_insert(insert, &sections, &a.text());
                }
            }
            inserted = Some(a.i);
            a.forward(a.len - left);
        } else if a.is_done() && b.is_done() {
            return Ok((sections, insert));
        } else {
            return Err(ChangeError::MismatchedLengths);
        }
    }
}
