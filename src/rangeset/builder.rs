//! 範囲集合ビルダー

use super::chunk::{Chunk, CHUNK_SIZE};
use super::{Layer, RangeSet, RangeValue, Side};
use crate::error::{range_set::Result, RangeSetError};
use std::sync::Arc;

/// 直前に追加した範囲
#[derive(Debug, Clone, Copy)]
struct LastRange {
    from: usize,
    to: usize,
    start_side: Side,
    end_side: Side,
}

/// 範囲を (from, start_side) の昇順で受け取り、範囲集合を組み立てる
///
/// 直前の範囲と重なる範囲は次の層のビルダーへ回す
pub struct RangeSetBuilder<T> {
    chunks: Vec<Arc<Chunk<T>>>,
    chunk_pos: Vec<usize>,
    chunk_start: Option<usize>,
    last: Option<LastRange>,
    from: Vec<usize>,
    to: Vec<usize>,
    value: Vec<T>,
    max_point: Option<usize>,
    next_layer: Option<Box<RangeSetBuilder<T>>>,
}

impl<T> Default for RangeSetBuilder<T> {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            chunk_pos: Vec::new(),
            chunk_start: None,
            last: None,
            from: Vec::new(),
            to: Vec::new(),
            value: Vec::new(),
            max_point: None,
            next_layer: None,
        }
    }
}

impl<T: RangeValue> RangeSetBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_chunk(&mut self) {
        let chunk = Chunk {
            from: std::mem::take(&mut self.from),
            to: std::mem::take(&mut self.to),
            value: std::mem::take(&mut self.value),
            max_point: self.max_point.take(),
        };
        self.chunks.push(Arc::new(chunk));
        self.chunk_pos.push(self.chunk_start.take().unwrap_or(0));
    }

    /// 範囲を追加する
    ///
    /// (from, start_side) が直前の範囲より小さい場合は失敗する
    pub fn add(&mut self, from: usize, to: usize, value: T) -> Result<()> {
        if to < from {
            return Err(RangeSetError::InvalidRange { from, to });
        }
        if self.accepts(from, &value)? {
            self.push(from, to, value);
            return Ok(());
        }
        log::trace!("range {}..{} overlaps the previous one, spilling to next layer", from, to);
        self.next_layer.get_or_insert_with(Default::default).add(from, to, value)
    }

    /// この層に追加できるか判定する（順序違反はエラー）
    pub(crate) fn accepts(&self, from: usize, value: &T) -> Result<bool> {
        let Some(last) = self.last else {
            return Ok(true);
        };
        let diff = from.cmp(&last.to).then(value.start_side().cmp(&last.end_side));
        if diff.is_le() && from.cmp(&last.from).then(value.start_side().cmp(&last.start_side)).is_lt() {
            return Err(RangeSetError::Unsorted {
                from,
                last_from: last.from,
            });
        }
        Ok(diff.is_ge())
    }

    /// [`RangeSetBuilder::accepts`] を満たす範囲をこの層に追加する
    pub(crate) fn push(&mut self, from: usize, to: usize, value: T) {
        if self.from.len() == CHUNK_SIZE {
            self.finish_chunk();
        }
        let start = *self.chunk_start.get_or_insert(from);
        self.from.push(from - start);
        self.to.push(to - start);
        self.last = Some(LastRange {
            from,
            to,
            start_side: value.start_side(),
            end_side: value.end_side(),
        });
        if value.is_point() {
            self.max_point = self.max_point.max(Some(to - from));
        }
        self.value.push(value);
    }

    /// 既存のチャンクをそのまま追加する。順序が合わなければ偽
    pub(crate) fn add_chunk(&mut self, from: usize, chunk: Arc<Chunk<T>>) -> bool {
        let (Some(first), Some(last_value)) = (chunk.value.first(), chunk.value.last()) else {
            return false;
        };
        if let Some(last) = self.last {
            if from.cmp(&last.to).then(first.start_side().cmp(&last.end_side)).is_lt() {
                return false;
            }
        }
        if !self.from.is_empty() {
            self.finish_chunk();
        }
        log::trace!("reusing chunk of {} ranges at {}", chunk.value.len(), from);
        let index = chunk.value.len() - 1;
        self.last = Some(LastRange {
            from: chunk.from[index] + from,
            to: chunk.to[index] + from,
            start_side: last_value.start_side(),
            end_side: last_value.end_side(),
        });
        self.chunks.push(chunk);
        self.chunk_pos.push(from);
        true
    }

    /// 範囲集合を完成させる
    pub fn finish(self) -> RangeSet<T> {
        self.finish_inner(RangeSet::Empty)
    }

    /// `next` を下の層として範囲集合を完成させる
    pub(crate) fn finish_inner(mut self, next: RangeSet<T>) -> RangeSet<T> {
        if !self.from.is_empty() {
            self.finish_chunk();
        }
        if self.chunks.is_empty() {
            return next;
        }
        let next_layer = match self.next_layer.take() {
            Some(builder) => builder.finish_inner(next),
            None => next,
        };
        RangeSet::Chunked(Arc::new(Layer::new(self.chunk_pos, self.chunks, next_layer)))
    }
}
