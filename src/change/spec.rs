//! 変更指定
//!
//! 単一の編集、既存の変更セット、およびそれらの入れ子の並びから
//! 変更セットを組み立てる

use super::section::{add_insert, add_section, Section};
use super::ChangeSet;
use crate::config::split_lines;
use crate::error::{change::Result, ChangeError};
use crate::text::Text;

/// 挿入内容
#[derive(Debug, Clone, Default)]
pub enum Insertion {
    /// 挿入なし
    #[default]
    Nothing,
    /// 行区切りで分割して挿入する文字列
    Str(String),
    /// テキスト
    Text(Text),
}

impl From<&str> for Insertion {
    fn from(s: &str) -> Self {
        Insertion::Str(s.to_string())
    }
}

impl From<String> for Insertion {
    fn from(s: String) -> Self {
        Insertion::Str(s)
    }
}

impl From<Text> for Insertion {
    fn from(text: Text) -> Self {
        Insertion::Text(text)
    }
}

/// 変更指定
///
/// 位置はすべて変更前のドキュメントを基準とする
#[derive(Debug, Clone)]
pub enum ChangeSpec {
    /// `[from, to)` を `insert` で置き換える
    Edit { from: usize, to: usize, insert: Insertion },
    /// 既存の変更セット
    Set(ChangeSet),
    /// 指定の並び
    Batch(Vec<ChangeSpec>),
}

impl ChangeSpec {
    pub fn insert(pos: usize, text: impl Into<Insertion>) -> Self {
        ChangeSpec::Edit {
            from: pos,
            to: pos,
            insert: text.into(),
        }
    }

    pub fn delete(from: usize, to: usize) -> Self {
        ChangeSpec::Edit {
            from,
            to,
            insert: Insertion::Nothing,
        }
    }

    pub fn replace(from: usize, to: usize, text: impl Into<Insertion>) -> Self {
        ChangeSpec::Edit {
            from,
            to,
            insert: text.into(),
        }
    }
}

impl From<ChangeSet> for ChangeSpec {
    fn from(set: ChangeSet) -> Self {
        ChangeSpec::Set(set)
    }
}

impl From<Vec<ChangeSpec>> for ChangeSpec {
    fn from(specs: Vec<ChangeSpec>) -> Self {
        ChangeSpec::Batch(specs)
    }
}

/// 組み立て中の状態
///
/// 昇順に並んだ編集は区間列へ直接追加し、
/// 順序が崩れたら蓄積分を確定して累積結果へ合成する
struct Builder<'a> {
    sections: Vec<Section>,
    inserted: Vec<Text>,
    pos: usize,
    total: Option<ChangeSet>,
    length: usize,
    line_sep: Option<&'a str>,
}

pub(super) fn build(spec: ChangeSpec, length: usize, line_sep: Option<&str>) -> Result<ChangeSet> {
    let mut builder = Builder {
        sections: Vec::new(),
        inserted: Vec::new(),
        pos: 0,
        total: None,
        length,
        line_sep,
    };
    builder.process(spec)?;
    let force = builder.total.is_none();
    builder.flush(force)?;
    Ok(builder.total.unwrap_or_else(|| ChangeSet::empty(length)))
}

impl Builder<'_> {
    fn flush(&mut self, force: bool) -> Result<()> {
        if !force && self.sections.is_empty() {
            return Ok(());
        }
        if self.pos < self.length {
            add_section(&mut self.sections, self.length - self.pos, None, false);
        }
        let set = ChangeSet::create(std::mem::take(&mut self.sections), std::mem::take(&mut self.inserted));
        log::trace!("flushing change batch: {:?}", set);
        self.total = Some(match self.total.take() {
            Some(total) => {
                let mapped = set.map(&total, false)?;
                total.compose(&mapped)?
            }
            None => set,
        });
        self.pos = 0;
        Ok(())
    }

    fn process(&mut self, spec: ChangeSpec) -> Result<()> {
        match spec {
            ChangeSpec::Batch(specs) => {
                for spec in specs {
                    self.process(spec)?;
                }
            }
            ChangeSpec::Set(set) => {
                if set.len() != self.length {
                    return Err(ChangeError::SpecLengthMismatch {
                        expected: self.length,
                        actual: set.len(),
                    });
                }
                self.flush(false)?;
                self.total = Some(match self.total.take() {
                    Some(total) => {
                        let mapped = set.map(&total, false)?;
                        total.compose(&mapped)?
                    }
                    None => set,
                });
            }
            ChangeSpec::Edit { from, to, insert } => {
                if from > to || to > self.length {
                    return Err(ChangeError::InvalidRange {
                        from,
                        to,
                        length: self.length,
                    });
                }
                let text = match insert {
                    Insertion::Nothing => Text::empty(),
                    Insertion::Str(s) => Text::of(split_lines(&s, self.line_sep))?,
                    Insertion::Text(text) => text,
                };
                let ins_len = text.len();
                if from == to && ins_len == 0 {
                    return Ok(());
                }
                if from < self.pos {
                    self.flush(false)?;
                }
                if from > self.pos {
                    add_section(&mut self.sections, from - self.pos, None, false);
                }
                add_section(&mut self.sections, to - from, Some(ins_len), false);
                add_insert(&mut self.inserted, &self.sections, &text);
                self.pos = to;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_edit_gives_empty_set() {
        let set = ChangeSet::of(ChangeSpec::insert(2, ""), 4, None).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_nested_batches() {
        let doc: Text = "abcd".parse().unwrap();
        let spec = ChangeSpec::Batch(vec![
            ChangeSpec::insert(0, ">"),
            ChangeSpec::Batch(vec![ChangeSpec::delete(1, 2), ChangeSpec::insert(4, "<")]),
        ]);
        let set = ChangeSet::of(spec, 4, None).unwrap();
        assert_eq!(set.apply(&doc).unwrap().to_string(), ">acd<");
    }

    #[test]
    fn test_nested_set_is_relative_to_start() {
        let doc: Text = "abcd".parse().unwrap();
        let inner = ChangeSet::of(ChangeSpec::insert(1, "X"), 4, None).unwrap();
        let spec = vec![ChangeSpec::insert(3, "Y"), inner.into()];
        let set = ChangeSet::of(spec, 4, None).unwrap();
        assert_eq!(set.apply(&doc).unwrap().to_string(), "aXbcYd");
    }

    #[test]
    fn test_fixed_line_separator() {
        let set = ChangeSet::of(ChangeSpec::insert(0, "a\r\nb|c"), 0, Some("|")).unwrap();
        let text = set.apply(&Text::empty()).unwrap();
        assert_eq!(text.lines(), 2);
        assert_eq!(text.line(2).unwrap().text, "c");
    }
}
