//! 範囲集合のチャンク
//!
//! 最大 [`CHUNK_SIZE`] 件の範囲を、基準位置からの相対位置で保持する不変の単位

use super::{RangeValue, Side};
use crate::change::ChangeDesc;
use crate::error::range_set::Result;

/// チャンクあたりの最大件数
pub(crate) const CHUNK_SIZE: usize = 250;

/// 重なりのない範囲の列
///
/// `from`・`to`・`value` は同じ長さで、(from, start_side) の昇順に並ぶ
#[derive(Debug)]
pub(crate) struct Chunk<T> {
    pub from: Vec<usize>,
    pub to: Vec<usize>,
    pub value: Vec<T>,
    /// 点範囲の最大幅（点範囲がなければ `None`）
    pub max_point: Option<usize>,
}

impl<T: RangeValue> Chunk<T> {
    /// 基準位置からの長さ
    pub fn length(&self) -> usize {
        self.to.last().copied().unwrap_or(0)
    }

    /// (pos, side) 以上となる最初の添字を二分探索で求める
    ///
    /// `end` が真なら終端位置、偽なら開始位置で比較する
    pub fn find_index(&self, pos: usize, side: Side, end: bool, start_at: usize) -> usize {
        let positions = if end { &self.to } else { &self.from };
        let (mut lo, mut hi) = (start_at, positions.len());
        loop {
            if lo == hi {
                return lo;
            }
            let mid = (lo + hi) >> 1;
            let value_side = if end {
                self.value[mid].end_side()
            } else {
                self.value[mid].start_side()
            };
            let diff = positions[mid].cmp(&pos).then(value_side.cmp(&side));
            if mid == lo {
                return if diff.is_ge() { lo } else { hi };
            }
            if diff.is_ge() {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    }

    /// 絶対位置 `[from, to]` に重なる範囲を列挙する。`f` が偽を返したら偽で終了
    pub fn between<F>(&self, offset: usize, from: usize, to: usize, f: &mut F) -> bool
    where
        F: FnMut(usize, usize, &T) -> bool,
    {
        let start = if from < offset {
            0
        } else {
            self.find_index(from - offset, Side::MIN, true, 0)
        };
        let end = self.find_index(to - offset, Side::MAX, false, start);
        for i in start..end {
            if !f(self.from[i] + offset, self.to[i] + offset, &self.value[i]) {
                return false;
            }
        }
        true
    }

    /// 変更を通して各範囲を写す
    ///
    /// 残った範囲のチャンクと、その新しい基準位置を返す
    pub fn map(&self, offset: usize, changes: &ChangeDesc) -> Result<(Option<Chunk<T>>, usize)> {
        let mut value = Vec::new();
        let mut from = Vec::new();
        let mut to = Vec::new();
        let mut new_pos: Option<usize> = None;
        let mut max_point = None;
        for (i, val) in self.value.iter().enumerate() {
            let cur_from = self.from[i] + offset;
            let cur_to = self.to[i] + offset;
            let (new_from, new_to);
            if cur_from == cur_to {
                let Some(mapped) = changes.map_pos_tracked(cur_from, val.start_side().assoc(), val.map_mode())? else {
                    continue;
                };
                new_from = mapped;
                if val.start_side() != val.end_side() {
                    new_to = changes.map_pos(cur_from, val.end_side().assoc())?;
                    if new_to < new_from {
                        continue;
                    }
                } else {
                    new_to = mapped;
                }
            } else {
                new_from = changes.map_pos(cur_from, val.start_side().assoc())?;
                new_to = changes.map_pos(cur_to, val.end_side().assoc())?;
                if new_from > new_to
                    || (new_from == new_to && val.start_side() > Side::DEFAULT && val.end_side() <= Side::DEFAULT)
                {
                    continue;
                }
            }
            if new_to.cmp(&new_from).then(val.end_side().cmp(&val.start_side())).is_lt() {
                continue;
            }
            let base = *new_pos.get_or_insert(new_from);
            if val.is_point() {
                max_point = max_point.max(Some(new_to - new_from));
            }
            value.push(val.clone());
            from.push(new_from.saturating_sub(base));
            to.push(new_to.saturating_sub(base));
        }
        match new_pos {
            Some(pos) => Ok((
                Some(Chunk {
                    from,
                    to,
                    value,
                    max_point,
                }),
                pos,
            )),
            None => Ok((None, 0)),
        }
    }
}
