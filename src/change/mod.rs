//! 変更記述子・変更セット
//!
//! ドキュメントの編集を「旧ドキュメント上の区間列」として表現する。
//! 各区間は変更なし、または長さ `len` の範囲を `ins` 文字で置き換える置換のいずれか。
//! 合成（compose）・写像（map）・反転（invert）により
//! 同時編集の収束や位置の追跡を行う

mod section;
mod spec;

pub use section::{SectionCursor, SectionKind};
pub use spec::{ChangeSpec, Insertion};

use crate::error::{change::Result, ChangeError};
use crate::text::Text;
use section::{add_insert, add_section, compose_sections, iter_changes, map_sections, Section};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 位置の写像モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapMode {
    /// 常に位置を返す
    #[default]
    Simple,
    /// 位置の前後の文字が削除されたら消滅
    TrackDel,
    /// 位置の直前の文字が削除されたら消滅
    TrackBefore,
    /// 位置の直後の文字が削除されたら消滅
    TrackAfter,
}

/// 挿入位置で写像するときの寄せ方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assoc {
    /// 挿入の前に留まる
    #[default]
    Before,
    /// 挿入の後ろへ移動する
    After,
}

impl Assoc {
    /// 符号から決定（負なら `Before`）
    pub fn from_sign(side: i32) -> Self {
        if side < 0 {
            Assoc::Before
        } else {
            Assoc::After
        }
    }
}

/// 範囲と変更の関係
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// 接触しない
    No,
    /// 接触または重なる
    Yes,
    /// 範囲全体を含む単一の変更がある
    Covers,
}

/// 変更記述子
///
/// 挿入内容を持たず、位置の写像や変更範囲の列挙のみに使う
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ChangeDesc {
    sections: Vec<Section>,
}

impl ChangeDesc {
    pub(crate) fn from_sections(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub(crate) fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// 変更前のドキュメント長
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.len).sum()
    }

    /// 変更後のドキュメント長
    pub fn new_len(&self) -> usize {
        self.sections.iter().map(|s| s.ins.unwrap_or(s.len)).sum()
    }

    /// ドキュメントを変更しないか
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() || (self.sections.len() == 1 && self.sections[0].ins.is_none())
    }

    /// 区間を先頭から消費するカーソル
    pub fn cursor(&self) -> SectionCursor<'_> {
        SectionCursor::new(&self.sections, None)
    }

    /// 変更のない範囲を列挙する（旧位置、新位置、長さ）
    pub fn iter_gaps<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize, usize),
    {
        let (mut pos_a, mut pos_b) = (0, 0);
        for section in &self.sections {
            match section.ins {
                None => {
                    f(pos_a, pos_b, section.len);
                    pos_b += section.len;
                }
                Some(ins) => pos_b += ins,
            }
            pos_a += section.len;
        }
    }

    /// 変更された範囲を列挙する（旧開始、旧終了、新開始、新終了）
    ///
    /// `individual` でなければ隣接する変更はまとめて報告する
    pub fn iter_changed_ranges<F>(&self, mut f: F, individual: bool)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        iter_changes(&self.sections, None, individual, |fa, ta, fb, tb, _| f(fa, ta, fb, tb));
    }

    /// 変更後から変更前へ戻す記述子
    pub fn inverted_desc(&self) -> ChangeDesc {
        let mut sections = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            match section.ins {
                None => sections.push(*section),
                Some(ins) => sections.push(Section {
                    len: ins,
                    ins: Some(section.len),
                }),
            }
        }
        ChangeDesc { sections }
    }

    /// `self` の後に `other` を適用する記述子
    pub fn compose_desc(&self, other: &ChangeDesc) -> Result<ChangeDesc> {
        if self.new_len() != other.len() {
            return Err(ChangeError::MismatchedLengths);
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        let (sections, _) = compose_sections(self.cursor(), other.cursor(), false)?;
        Ok(ChangeDesc { sections })
    }

    /// 同じドキュメントを起点とする `other` の適用後に適用できるよう写す
    ///
    /// `before` が真なら同一位置への挿入で `self` を前に置く
    pub fn map_desc(&self, other: &ChangeDesc, before: bool) -> Result<ChangeDesc> {
        if self.len() != other.len() {
            return Err(ChangeError::MismatchedLengths);
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        let (sections, _) = map_sections(self.cursor(), other.cursor(), before, false)?;
        Ok(ChangeDesc { sections })
    }

    /// 位置を変更後のドキュメントへ写す
    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> Result<usize> {
        Ok(self.map_pos_tracked(pos, assoc, MapMode::Simple)?.unwrap_or(pos))
    }

    /// 位置を変更後のドキュメントへ写す
    ///
    /// `mode` の条件で位置が削除された場合は `None`
    pub fn map_pos_tracked(&self, pos: usize, assoc: Assoc, mode: MapMode) -> Result<Option<usize>> {
        let (mut pos_a, mut pos_b) = (0, 0);
        for section in &self.sections {
            let end_a = pos_a + section.len;
            match section.ins {
                None => {
                    if end_a > pos {
                        return Ok(Some(pos_b + (pos - pos_a)));
                    }
                    pos_b += section.len;
                }
                Some(ins) => {
                    if mode != MapMode::Simple
                        && end_a >= pos
                        && ((mode == MapMode::TrackDel && pos_a < pos && end_a > pos)
                            || (mode == MapMode::TrackBefore && pos_a < pos)
                            || (mode == MapMode::TrackAfter && end_a > pos))
                    {
                        return Ok(None);
                    }
                    if end_a > pos || (end_a == pos && assoc == Assoc::Before && section.len == 0) {
                        return Ok(Some(if pos == pos_a || assoc == Assoc::Before {
                            pos_b
                        } else {
                            pos_b + ins
                        }));
                    }
                    pos_b += ins;
                }
            }
            pos_a = end_a;
        }
        if pos > pos_a {
            return Err(ChangeError::MapPosOutOfRange { pos, length: pos_a });
        }
        Ok(Some(pos_b))
    }

    /// 範囲 `[from, to]` に変更が接触するか
    pub fn touches_range(&self, from: usize, to: usize) -> Touch {
        let mut pos = 0;
        for section in &self.sections {
            if pos > to {
                break;
            }
            let end = pos + section.len;
            if section.ins.is_some() && end >= from {
                return if pos < from && end > to { Touch::Covers } else { Touch::Yes };
            }
            pos = end;
        }
        Touch::No
    }

    /// `[len, ins, len, ins, ...]`（変更なしは `ins = -1`）の形式で出力
    pub fn to_json(&self) -> Vec<i64> {
        let mut result = Vec::with_capacity(self.sections.len() * 2);
        for section in &self.sections {
            result.push(section.len as i64);
            result.push(section.ins.map_or(-1, |ins| ins as i64));
        }
        result
    }

    /// [`ChangeDesc::to_json`] の形式から復元
    pub fn from_json(json: &Value) -> Result<ChangeDesc> {
        let invalid = || ChangeError::InvalidJson { kind: "ChangeDesc" };
        let items = json.as_array().ok_or_else(invalid)?;
        if items.len() % 2 != 0 {
            return Err(invalid());
        }
        let mut sections = Vec::with_capacity(items.len() / 2);
        for pair in items.chunks(2) {
            let len = pair[0].as_u64().ok_or_else(invalid)? as usize;
            let ins = match pair[1].as_i64().ok_or_else(invalid)? {
                -1 => None,
                n if n >= 0 => Some(n as usize),
                _ => return Err(invalid()),
            };
            sections.push(Section { len, ins });
        }
        Ok(ChangeDesc { sections })
    }
}

impl AsRef<ChangeDesc> for ChangeDesc {
    fn as_ref(&self) -> &ChangeDesc {
        self
    }
}

impl fmt::Display for ChangeDesc {
    /// `len` または `len:ins` を空白区切りで並べる
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match section.ins {
                None => write!(f, "{}", section.len)?,
                Some(ins) => write!(f, "{}:{}", section.len, ins)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChangeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeDesc({})", self)
    }
}

impl Serialize for ChangeDesc {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeDesc {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ChangeDesc::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// 変更セット
///
/// 変更記述子に挿入内容を加えたもの。ドキュメントへ適用できる
#[derive(Clone, PartialEq)]
pub struct ChangeSet {
    desc: ChangeDesc,
    /// 区間ごとの挿入内容（最後の挿入より後ろは省略、途中は空で埋める）
    inserted: Vec<Text>,
}

/// [`ChangeSet::filter`] の結果
#[derive(Debug, Clone)]
pub struct FilteredChanges {
    /// 指定範囲に接触しない変更
    pub changes: ChangeSet,
    /// 指定範囲内にあった変更
    pub filtered: ChangeDesc,
}

impl ChangeSet {
    pub(crate) fn create(sections: Vec<Section>, inserted: Vec<Text>) -> Self {
        Self {
            desc: ChangeDesc::from_sections(sections),
            inserted,
        }
    }

    /// 長さ `length` のドキュメントを変更しないセット
    pub fn empty(length: usize) -> ChangeSet {
        let sections = if length > 0 {
            vec![Section { len: length, ins: None }]
        } else {
            Vec::new()
        };
        ChangeSet::create(sections, Vec::new())
    }

    /// 変更指定から作成
    ///
    /// 指定内の位置はすべて長さ `length` の元ドキュメントを基準とする。
    /// 文字列の挿入は `line_sep`（`None` なら自動判定）で行に分割する
    pub fn of(spec: impl Into<ChangeSpec>, length: usize, line_sep: Option<&str>) -> Result<ChangeSet> {
        spec::build(spec.into(), length, line_sep)
    }

    /// 挿入内容を除いた記述子
    pub fn desc(&self) -> &ChangeDesc {
        &self.desc
    }

    pub fn len(&self) -> usize {
        self.desc.len()
    }

    pub fn new_len(&self) -> usize {
        self.desc.new_len()
    }

    pub fn is_empty(&self) -> bool {
        self.desc.is_empty()
    }

    /// 挿入内容付きの区間カーソル
    pub fn cursor(&self) -> SectionCursor<'_> {
        SectionCursor::new(self.desc.sections(), Some(&self.inserted))
    }

    /// ドキュメントに適用する
    pub fn apply(&self, doc: &Text) -> Result<Text> {
        if self.len() != doc.len() {
            return Err(ChangeError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut result = doc.clone();
        iter_changes(self.desc.sections(), Some(&self.inserted), false, |from_a, to_a, from_b, _, text| {
            result = result.replace_inner(from_b, from_b + (to_a - from_a), &text);
        });
        Ok(result)
    }

    /// 適用前のドキュメント `doc` を与えて逆変更を作成
    pub fn invert(&self, doc: &Text) -> Result<ChangeSet> {
        if self.len() != doc.len() {
            return Err(ChangeError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut sections = Vec::with_capacity(self.desc.sections().len());
        let mut inserted = Vec::new();
        let mut pos = 0;
        for (i, section) in self.desc.sections().iter().enumerate() {
            match section.ins {
                None => sections.push(*section),
                Some(ins) => {
                    sections.push(Section {
                        len: ins,
                        ins: Some(section.len),
                    });
                    while inserted.len() < i {
                        inserted.push(Text::empty());
                    }
                    inserted.push(if section.len > 0 {
                        doc.slice_inner(pos, pos + section.len)
                    } else {
                        Text::empty()
                    });
                }
            }
            pos += section.len;
        }
        Ok(ChangeSet::create(sections, inserted))
    }

    /// `self` の後に `other` を適用する変更セット
    pub fn compose(&self, other: &ChangeSet) -> Result<ChangeSet> {
        if self.new_len() != other.len() {
            return Err(ChangeError::MismatchedLengths);
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        let (sections, inserted) = compose_sections(self.cursor(), other.cursor(), true)?;
        Ok(ChangeSet::create(sections, inserted.unwrap_or_default()))
    }

    /// 同じドキュメントを起点とする `other` の適用後に適用できるよう写す
    ///
    /// `before` が真なら同一位置への挿入で `self` を前に置く
    pub fn map(&self, other: impl AsRef<ChangeDesc>, before: bool) -> Result<ChangeSet> {
        let other = other.as_ref();
        if self.len() != other.len() {
            return Err(ChangeError::MismatchedLengths);
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        let (sections, inserted) = map_sections(self.cursor(), other.cursor(), before, true)?;
        Ok(ChangeSet::create(sections, inserted.unwrap_or_default()))
    }

    /// 変更を列挙する（旧開始、旧終了、新開始、新終了、挿入内容）
    pub fn iter_changes<F>(&self, f: F, individual: bool)
    where
        F: FnMut(usize, usize, usize, usize, Text),
    {
        iter_changes(self.desc.sections(), Some(&self.inserted), individual, f);
    }

    pub fn iter_gaps<F>(&self, f: F)
    where
        F: FnMut(usize, usize, usize),
    {
        self.desc.iter_gaps(f)
    }

    pub fn iter_changed_ranges<F>(&self, f: F, individual: bool)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        self.desc.iter_changed_ranges(f, individual)
    }

    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> Result<usize> {
        self.desc.map_pos(pos, assoc)
    }

    pub fn map_pos_tracked(&self, pos: usize, assoc: Assoc, mode: MapMode) -> Result<Option<usize>> {
        self.desc.map_pos_tracked(pos, assoc, mode)
    }

    pub fn touches_range(&self, from: usize, to: usize) -> Touch {
        self.desc.touches_range(from, to)
    }

    /// 変更を範囲 `ranges`（旧ドキュメント上、昇順）の内外に分割する
    pub fn filter(&self, ranges: &[(usize, usize)]) -> FilteredChanges {
        let mut result_sections = Vec::new();
        let mut result_inserted = Vec::new();
        let mut filtered_sections = Vec::new();
        let mut iter = self.cursor();
        let kept_ins = |iter: &SectionCursor<'_>| match iter.kind() {
            SectionKind::Replaced(ins) => Some(if iter.offset() == 0 { ins } else { 0 }),
            _ => None,
        };
        let mut pos = 0;
        let mut ranges = ranges.iter();
        'done: loop {
            let (next, end) = match ranges.next() {
                Some(&(from, to)) => (from, Some(to)),
                None => (usize::MAX, None),
            };
            while pos < next || (pos == next && iter.is_empty()) {
                if iter.is_done() {
                    break 'done;
                }
                let len = iter.len().min(next - pos);
                add_section(&mut filtered_sections, len, None, false);
                let ins = kept_ins(&iter);
                add_section(&mut result_sections, len, ins, false);
                if ins.unwrap_or(0) > 0 {
                    add_insert(&mut result_inserted, &result_sections, &iter.text());
                }
                iter.forward(len);
                pos += len;
            }
            let Some(end) = end else { break };
            while pos < end {
                if iter.is_done() {
                    break 'done;
                }
                let len = iter.len().min(end - pos);
                add_section(&mut result_sections, len, None, false);
                add_section(&mut filtered_sections, len, kept_ins(&iter), false);
                iter.forward(len);
                pos += len;
            }
        }
        FilteredChanges {
            changes: ChangeSet::create(result_sections, result_inserted),
            filtered: ChangeDesc::from_sections(filtered_sections),
        }
    }

    /// 区間ごとに、変更なしは長さ、削除は `[len]`、置換は `[len, 行...]` で出力
    pub fn to_json(&self) -> Value {
        let mut parts = Vec::with_capacity(self.desc.sections().len());
        for (i, section) in self.desc.sections().iter().enumerate() {
            match section.ins {
                None => parts.push(Value::from(section.len)),
                Some(0) => parts.push(Value::Array(vec![Value::from(section.len)])),
                Some(_) => {
                    let mut part = vec![Value::from(section.len)];
                    if let Some(text) = self.inserted.get(i) {
                        part.extend(text.to_json().into_iter().map(Value::String));
                    }
                    parts.push(Value::Array(part));
                }
            }
        }
        Value::Array(parts)
    }

    /// [`ChangeSet::to_json`] の形式から復元
    pub fn from_json(json: &Value) -> Result<ChangeSet> {
        let invalid = || ChangeError::InvalidJson { kind: "ChangeSet" };
        let parts = json.as_array().ok_or_else(invalid)?;
        let mut sections = Vec::with_capacity(parts.len());
        let mut inserted = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if let Some(len) = part.as_u64() {
                sections.push(Section {
                    len: len as usize,
                    ins: None,
                });
                continue;
            }
            let items = part.as_array().ok_or_else(invalid)?;
            let (first, lines) = items.split_first().ok_or_else(invalid)?;
            let len = first.as_u64().ok_or_else(invalid)? as usize;
            if lines.is_empty() {
                sections.push(Section { len, ins: Some(0) });
                continue;
            }
            let lines = lines
                .iter()
                .map(|line| line.as_str().map(str::to_string).ok_or_else(invalid))
                .collect::<Result<Vec<String>>>()?;
            let text = Text::of(lines)?;
            sections.push(Section {
                len,
                ins: Some(text.len()),
            });
            while inserted.len() < i {
                inserted.push(Text::empty());
            }
            inserted.push(text);
        }
        Ok(ChangeSet::create(sections, inserted))
    }
}

impl AsRef<ChangeDesc> for ChangeSet {
    fn as_ref(&self) -> &ChangeDesc {
        &self.desc
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeSet({})", self.desc)
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ChangeSet::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(s: &str) -> Text {
        s.parse().unwrap()
    }

    fn change(spec: impl Into<ChangeSpec>, length: usize) -> ChangeSet {
        ChangeSet::of(spec, length, None).unwrap()
    }

    #[test]
    fn test_empty_set() {
        let set = ChangeSet::empty(5);
        assert!(set.is_empty());
        assert_eq!((set.len(), set.new_len()), (5, 5));
        assert_eq!(set.desc().to_json(), vec![5, -1]);
        assert!(ChangeSet::empty(0).desc().to_json().is_empty());
    }

    #[test]
    fn test_apply_insert_and_delete() {
        let text = doc("hello world");
        let set = change(
            vec![ChangeSpec::replace(0, 5, "goodbye"), ChangeSpec::delete(5, 11)],
            11,
        );
        assert_eq!(set.desc().to_string(), "5:7 6:0");
        assert_eq!(set.apply(&text).unwrap().to_string(), "goodbye");
    }

    #[test]
    fn test_apply_rejects_wrong_length() {
        let set = change(ChangeSpec::insert(0, "x"), 3);
        assert_eq!(
            set.apply(&doc("ab")).unwrap_err(),
            ChangeError::LengthMismatch { expected: 3, actual: 2 }
        );
    }

    #[test]
    fn test_of_validates_ranges() {
        assert_eq!(
            ChangeSet::of(ChangeSpec::delete(2, 9), 5, None).unwrap_err(),
            ChangeError::InvalidRange { from: 2, to: 9, length: 5 }
        );
        assert_eq!(
            ChangeSet::of(ChangeSpec::delete(3, 2), 5, None).unwrap_err(),
            ChangeError::InvalidRange { from: 3, to: 2, length: 5 }
        );
        let nested = ChangeSet::empty(4);
        assert_eq!(
            ChangeSet::of(nested, 5, None).unwrap_err(),
            ChangeError::SpecLengthMismatch { expected: 5, actual: 4 }
        );
    }

    #[test]
    fn test_out_of_order_specs_are_relative_to_start() {
        let text = doc("abcdef");
        let set = change(vec![ChangeSpec::insert(4, "X"), ChangeSpec::insert(1, "Y")], 6);
        assert_eq!(set.apply(&text).unwrap().to_string(), "aYbcdXef");
    }

    #[test]
    fn test_multiline_insert() {
        let text = doc("ab");
        let set = change(ChangeSpec::insert(1, "x\r\ny"), 2);
        let result = set.apply(&text).unwrap();
        assert_eq!(result.lines(), 2);
        assert_eq!(result.to_string(), "ax\nyb");
    }

    #[test]
    fn test_invert_restores_document() {
        let text = doc("one two three");
        let set = change(vec![ChangeSpec::replace(4, 7, "2"), ChangeSpec::insert(13, "!")], 13);
        let changed = set.apply(&text).unwrap();
        assert_eq!(changed.to_string(), "one 2 three!");
        let inverse = set.invert(&text).unwrap();
        assert_eq!(inverse.apply(&changed).unwrap(), text);
    }

    #[test]
    fn test_compose_applies_in_sequence() {
        let text = doc("abc");
        let a = change(ChangeSpec::insert(1, "XY"), 3);
        let b = change(ChangeSpec::delete(2, 4), 5);
        let composed = a.compose(&b).unwrap();
        assert_eq!(composed.apply(&text).unwrap().to_string(), "aXc");
        assert_eq!(composed.apply(&text).unwrap(), b.apply(&a.apply(&text).unwrap()).unwrap());
    }

    #[test]
    fn test_compose_rejects_mismatched_lengths() {
        let a = change(ChangeSpec::insert(0, "x"), 3);
        let b = ChangeSet::empty(3);
        assert_eq!(a.compose(&b).unwrap_err(), ChangeError::MismatchedLengths);
        assert!(a.map(&b, false).is_ok());
        assert_eq!(a.map(ChangeSet::empty(2).desc(), false).unwrap_err(), ChangeError::MismatchedLengths);
    }

    #[test]
    fn test_concurrent_inserts_converge() {
        let text = doc("abc");
        let a = change(ChangeSpec::insert(1, "X"), 3);
        let b = change(ChangeSpec::insert(2, "Y"), 3);
        let left = a.compose(&b.map(&a, false).unwrap()).unwrap();
        let right = b.compose(&a.map(&b, true).unwrap()).unwrap();
        assert_eq!(left.apply(&text).unwrap().to_string(), "aXbYc");
        assert_eq!(right.apply(&text).unwrap().to_string(), "aXbYc");
    }

    #[test]
    fn test_same_position_inserts_respect_before() {
        let text = doc("ab");
        let a = change(ChangeSpec::insert(1, "A"), 2);
        let b = change(ChangeSpec::insert(1, "B"), 2);
        let left = a.compose(&b.map(&a, false).unwrap()).unwrap();
        let right = b.compose(&a.map(&b, true).unwrap()).unwrap();
        assert_eq!(left.apply(&text).unwrap().to_string(), "aABb");
        assert_eq!(right.apply(&text).unwrap().to_string(), "aABb");
    }

    #[test]
    fn test_map_over_deletion_drops_inner_insert() {
        let text = doc("abcdef");
        let a = change(ChangeSpec::insert(3, "X"), 6);
        let b = change(ChangeSpec::delete(1, 5), 6);
        let mapped = a.map(&b, false).unwrap();
        let result = mapped.apply(&b.apply(&text).unwrap()).unwrap();
        assert_eq!(result.to_string(), "aXf");
    }

    #[test]
    fn test_map_pos_around_insertion() {
        let set = change(ChangeSpec::insert(2, "Z"), 3);
        assert_eq!(set.map_pos(2, Assoc::Before).unwrap(), 2);
        assert_eq!(set.map_pos(2, Assoc::After).unwrap(), 3);
        assert_eq!(set.map_pos(0, Assoc::After).unwrap(), 0);
        assert_eq!(set.map_pos(3, Assoc::Before).unwrap(), 4);
    }

    #[test]
    fn test_map_pos_in_deleted_range() {
        let set = change(ChangeSpec::delete(1, 3), 4);
        assert_eq!(set.map_pos_tracked(2, Assoc::Before, MapMode::TrackDel).unwrap(), None);
        assert_eq!(set.map_pos_tracked(2, Assoc::Before, MapMode::Simple).unwrap(), Some(1));
        assert_eq!(set.map_pos_tracked(1, Assoc::After, MapMode::TrackDel).unwrap(), Some(1));
        assert_eq!(set.map_pos_tracked(1, Assoc::After, MapMode::TrackAfter).unwrap(), None);
        assert_eq!(set.map_pos_tracked(3, Assoc::Before, MapMode::TrackBefore).unwrap(), None);
        assert_eq!(set.map_pos_tracked(3, Assoc::Before, MapMode::TrackAfter).unwrap(), Some(1));
    }

    #[test]
    fn test_map_pos_out_of_range() {
        let set = ChangeSet::empty(3);
        assert_eq!(
            set.map_pos(4, Assoc::Before).unwrap_err(),
            ChangeError::MapPosOutOfRange { pos: 4, length: 3 }
        );
    }

    #[test]
    fn test_touches_range() {
        let set = change(ChangeSpec::replace(2, 6, "x"), 10);
        assert_eq!(set.touches_range(0, 1), Touch::No);
        assert_eq!(set.touches_range(0, 2), Touch::Yes);
        assert_eq!(set.touches_range(3, 4), Touch::Covers);
        assert_eq!(set.touches_range(6, 8), Touch::Yes);
        assert_eq!(set.touches_range(7, 8), Touch::No);
    }

    #[test]
    fn test_iter_gaps_and_changed_ranges() {
        let set = change(vec![ChangeSpec::delete(1, 2), ChangeSpec::insert(4, "xy")], 5);
        let mut gaps = Vec::new();
        set.iter_gaps(|a, b, len| gaps.push((a, b, len)));
        assert_eq!(gaps, vec![(0, 0, 1), (2, 1, 2), (4, 5, 1)]);
        let mut changes = Vec::new();
        set.iter_changes(|fa, ta, fb, tb, text| changes.push((fa, ta, fb, tb, text.to_string())), false);
        assert_eq!(changes, vec![(1, 2, 1, 1, String::new()), (4, 4, 3, 5, "xy".to_string())]);
    }

    #[test]
    fn test_filter_splits_changes() {
        let text = doc("0123456789");
        let set = change(vec![ChangeSpec::insert(1, "a"), ChangeSpec::replace(5, 7, "b")], 10);
        let FilteredChanges { changes, filtered } = set.filter(&[(4, 8)]);
        assert_eq!(changes.apply(&text).unwrap().to_string(), "0a123456789");
        assert_eq!(filtered.to_string(), "5 2:1 3");
        assert_eq!(filtered.len(), 10);
    }

    #[test]
    fn test_desc_json_round_trip_and_validation() {
        let set = change(ChangeSpec::replace(1, 2, "xyz"), 4);
        let json = set.desc().to_json();
        assert_eq!(json, vec![1, -1, 1, 3, 2, -1]);
        let restored = ChangeDesc::from_json(&json!(json)).unwrap();
        assert_eq!(&restored, set.desc());
        assert!(ChangeDesc::from_json(&json!([1, -1, 2])).is_err());
        assert!(ChangeDesc::from_json(&json!([1, -2])).is_err());
        assert!(ChangeDesc::from_json(&json!("1:2")).is_err());
    }

    #[test]
    fn test_set_json_format() {
        let set = change(vec![ChangeSpec::delete(0, 1), ChangeSpec::replace(2, 3, "a\nb")], 4);
        let json = set.to_json();
        assert_eq!(json, json!([[1], 1, [1, "a", "b"], 1]));
        let restored = ChangeSet::from_json(&json).unwrap();
        assert_eq!(restored.apply(&doc("wxyz")).unwrap().to_string(), "xa\nbz");
        assert_eq!(
            ChangeSet::from_json(&json!([[]])).unwrap_err(),
            ChangeError::InvalidJson { kind: "ChangeSet" }
        );
    }

    #[test]
    fn test_serde_uses_json_format() {
        let set = change(ChangeSpec::insert(0, "hi"), 2);
        let encoded = serde_json::to_string(&set).unwrap();
        assert_eq!(encoded, r#"[[0,"hi"],2]"#);
        let decoded: ChangeSet = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, set);
    }
}
