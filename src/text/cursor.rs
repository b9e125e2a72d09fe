//! テキスト走査カーソル
//!
//! 行の内容と改行を順に返す単方向・一回限りのカーソル群。
//! 2回目の走査には新しいカーソルを作成する

use super::{char_len, char_slice, Node, Text};

/// 走査方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 前方
    Forward,
    /// 後方
    Backward,
}

/// カーソルが返す要素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextToken<'a> {
    /// 行の内容（空文字列は返さない）
    Chunk(&'a str),
    /// 改行
    LineBreak,
}

impl<'a> TextToken<'a> {
    /// 文字列としての値（改行は `"\n"`）
    pub fn as_str(&self) -> &'a str {
        match self {
            TextToken::Chunk(s) => s,
            TextToken::LineBreak => "\n",
        }
    }

    /// 文字数
    pub fn len(&self) -> usize {
        match self {
            TextToken::Chunk(s) => char_len(s),
            TextToken::LineBreak => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self, TextToken::LineBreak)
    }
}

/// 木全体を走査するカーソル
///
/// 各階層の位置は `2 * index + 1` のように符号化する。
/// 前方走査では奇数が「要素の直前」、偶数が「改行の直前」を表す
pub struct RawTextCursor<'a> {
    dir: Direction,
    nodes: Vec<&'a Text>,
    offsets: Vec<usize>,
    done: bool,
}

impl<'a> RawTextCursor<'a> {
    pub(crate) fn new(text: &'a Text, dir: Direction) -> Self {
        Self {
            dir,
            nodes: vec![text],
            offsets: vec![Self::start_offset(text, dir)],
            done: false,
        }
    }

    fn start_offset(node: &Text, dir: Direction) -> usize {
        match dir {
            Direction::Forward => 1,
            Direction::Backward => node.child_count() << 1,
        }
    }

    /// 走査が終了したか
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn step(&mut self, index: usize) {
        match self.dir {
            Direction::Forward => self.offsets[index] += 1,
            Direction::Backward => self.offsets[index] -= 1,
        }
    }

    /// `skip` 文字読み飛ばしてから次の要素を返す
    pub fn advance(&mut self, mut skip: usize) -> Option<TextToken<'a>> {
        let forward = self.dir == Direction::Forward;
        loop {
            if self.done {
                return None;
            }
            let last = self.nodes.len() - 1;
            let top: &'a Text = self.nodes[last];
            let offset_value = self.offsets[last];
            let offset = offset_value >> 1;
            let size = top.child_count();
            if offset == (if forward { size } else { 0 }) {
                if last == 0 {
                    self.done = true;
                    return None;
                }
                if forward {
                    self.offsets[last - 1] += 1;
                }
                self.nodes.pop();
                self.offsets.pop();
            } else if (offset_value & 1) == (if forward { 0 } else { 1 }) {
                self.step(last);
                if skip == 0 {
                    return Some(TextToken::LineBreak);
                }
                skip -= 1;
            } else {
                let index = if forward { offset } else { offset - 1 };
                match &*top.0 {
                    Node::Leaf(leaf) => {
                        let next = leaf.text[index].as_str();
                        self.step(last);
                        let len = char_len(next);
                        if len > skip {
                            let value = if skip == 0 {
                                next
                            } else if forward {
                                char_slice(next, skip, len)
                            } else {
                                char_slice(next, 0, len - skip)
                            };
                            return Some(TextToken::Chunk(value));
                        }
                        skip -= len;
                    }
                    Node::Branch(branch) => {
                        let next = &branch.children[index];
                        if skip > next.len() {
                            skip -= next.len();
                            self.step(last);
                        } else {
                            if !forward {
                                self.offsets[last] -= 1;
                            }
                            self.nodes.push(next);
                            self.offsets.push(Self::start_offset(next, self.dir));
                        }
                    }
                }
            }
        }
    }
}

impl<'a> Iterator for RawTextCursor<'a> {
    type Item = TextToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance(0)
    }
}

/// 範囲 `[from, to)` のみを走査するカーソル
pub struct PartialTextCursor<'a> {
    cursor: RawTextCursor<'a>,
    pos: usize,
    from: usize,
    to: usize,
    done: bool,
}

impl<'a> PartialTextCursor<'a> {
    pub(crate) fn new(text: &'a Text, start: usize, end: usize) -> Self {
        let backward = start > end;
        Self {
            cursor: RawTextCursor::new(
                text,
                if backward { Direction::Backward } else { Direction::Forward },
            ),
            pos: if backward { text.len() } else { 0 },
            from: start.min(end),
            to: start.max(end),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// `skip` 文字読み飛ばしてから次の要素を返す
    pub fn advance(&mut self, mut skip: usize) -> Option<TextToken<'a>> {
        let backward = self.cursor.dir == Direction::Backward;
        if self.done || (backward && self.pos <= self.from) || (!backward && self.pos >= self.to) {
            self.done = true;
            return None;
        }
        skip += if backward {
            self.pos.saturating_sub(self.to)
        } else {
            self.from.saturating_sub(self.pos)
        };
        let mut limit = if backward {
            self.pos - self.from
        } else {
            self.to - self.pos
        };
        skip = skip.min(limit);
        limit -= skip;

        let token = self.cursor.advance(skip);
        let value = token.map(|t| t.as_str()).unwrap_or("");
        let value_len = char_len(value);
        if backward {
            self.pos = self.pos.saturating_sub(value_len + skip);
        } else {
            self.pos += value_len + skip;
        }
        let value = if value_len <= limit {
            value
        } else if backward {
            char_slice(value, value_len - limit, value_len)
        } else {
            char_slice(value, 0, limit)
        };
        if value.is_empty() {
            self.done = true;
            return None;
        }
        match token {
            Some(TextToken::LineBreak) => Some(TextToken::LineBreak),
            _ => Some(TextToken::Chunk(value)),
        }
    }
}

impl<'a> Iterator for PartialTextCursor<'a> {
    type Item = TextToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance(0)
    }
}

/// 行カーソルの入力元
pub enum LineSource<'a> {
    Raw(RawTextCursor<'a>),
    Partial(PartialTextCursor<'a>),
}

impl<'a> LineSource<'a> {
    fn advance(&mut self) -> Option<TextToken<'a>> {
        match self {
            LineSource::Raw(cursor) => cursor.advance(0),
            LineSource::Partial(cursor) => cursor.advance(0),
        }
    }
}

impl<'a> From<RawTextCursor<'a>> for LineSource<'a> {
    fn from(cursor: RawTextCursor<'a>) -> Self {
        LineSource::Raw(cursor)
    }
}

impl<'a> From<PartialTextCursor<'a>> for LineSource<'a> {
    fn from(cursor: PartialTextCursor<'a>) -> Self {
        LineSource::Partial(cursor)
    }
}

/// 1行ずつ（改行を含まずに）返すカーソル。空行は空文字列として返す
pub struct LineCursor<'a> {
    inner: LineSource<'a>,
    after_break: bool,
    done: bool,
}

impl<'a> LineCursor<'a> {
    pub(crate) fn new(inner: LineSource<'a>) -> Self {
        Self {
            inner,
            after_break: true,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.done {
                return None;
            }
            match self.inner.advance() {
                None if self.after_break => {
                    self.after_break = false;
                    return Some("");
                }
                None => {
                    self.done = true;
                    return None;
                }
                Some(TextToken::LineBreak) => {
                    if self.after_break {
                        return Some("");
                    }
                    self.after_break = true;
                }
                Some(TextToken::Chunk(value)) => {
                    self.after_break = false;
                    return Some(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[&str]) -> Text {
        Text::of(lines.iter().copied()).unwrap()
    }

    #[test]
    fn test_forward_and_backward_tokens() {
        let text = doc(&["ab", "", "c"]);
        let forward: Vec<String> = text.iter(Direction::Forward).map(|t| t.as_str().to_string()).collect();
        assert_eq!(forward, vec!["ab", "\n", "\n", "c"]);
        let backward: Vec<String> = text.iter(Direction::Backward).map(|t| t.as_str().to_string()).collect();
        assert_eq!(backward, vec!["c", "\n", "\n", "ab"]);
    }

    #[test]
    fn test_cursor_is_single_pass() {
        let text = doc(&["a", "b"]);
        let mut cursor = text.iter(Direction::Forward);
        assert_eq!(cursor.by_ref().count(), 3);
        assert!(cursor.is_done());
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_raw_cursor_over_deep_tree() {
        let lines: Vec<String> = (0..1000).map(|i| i.to_string()).collect();
        let text = Text::of(lines.clone()).unwrap();
        let joined: String = text.iter(Direction::Forward).map(|t| t.as_str()).collect();
        assert_eq!(joined, lines.join("\n"));
        let mut reversed: Vec<&str> = text.iter(Direction::Backward).map(|t| t.as_str()).collect();
        reversed.reverse();
        assert_eq!(reversed.concat(), lines.join("\n"));
    }

    #[test]
    fn test_partial_cursor_forward_and_backward() {
        let text = doc(&["hello", "world"]);
        let forward: String = text.iter_range(3, 8).unwrap().map(|t| t.as_str()).collect();
        assert_eq!(forward, "lo\nwo");
        let backward: Vec<&str> = text.iter_range(8, 3).unwrap().map(|t| t.as_str()).collect();
        assert_eq!(backward, vec!["wo", "\n", "lo"]);
        assert!(text.iter_range(0, 99).is_err());
    }

    #[test]
    fn test_line_cursor_yields_empty_lines() {
        let text = doc(&["a", "", "b", ""]);
        let lines: Vec<&str> = text.iter_lines().collect();
        assert_eq!(lines, vec!["a", "", "b", ""]);
        let empty = Text::empty();
        assert_eq!(empty.iter_lines().collect::<Vec<_>>(), vec![""]);
    }

    #[test]
    fn test_line_cursor_range() {
        let text = doc(&["one", "two", "three", "four"]);
        let lines: Vec<&str> = text.iter_lines_range(2, Some(4)).unwrap().collect();
        assert_eq!(lines, vec!["two", "three"]);
        let rest: Vec<&str> = text.iter_lines_range(3, None).unwrap().collect();
        assert_eq!(rest, vec!["three", "four"]);
        assert!(text.iter_lines_range(0, None).is_err());
    }
}
