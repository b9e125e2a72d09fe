//! 範囲集合カーソル
//!
//! 層ごとのカーソル、複数の層・集合をまとめるヒープ、
//! および重なりを区間へ分解するスパンカーソル

use super::chunk::Chunk;
use super::{Layer, Range, RangeSet, RangeValue, Side, FAR};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// 比較時に読み飛ばすチャンク（アドレスで識別）
pub(crate) type SharedChunks<T> = HashSet<*const Chunk<T>>;

/// 1つの層を順に走査するカーソル
pub(crate) struct LayerCursor<'a, T> {
    layer: &'a Layer<T>,
    skip: Option<&'a SharedChunks<T>>,
    min_point: Option<usize>,
    pub rank: usize,
    pub from: usize,
    pub to: usize,
    pub value: Option<&'a T>,
    pub chunk_index: usize,
    pub range_index: usize,
}

impl<'a, T: RangeValue> LayerCursor<'a, T> {
    pub fn new(layer: &'a Layer<T>, skip: Option<&'a SharedChunks<T>>, min_point: Option<usize>, rank: usize) -> Self {
        Self {
            layer,
            skip,
            min_point,
            rank,
            from: FAR,
            to: FAR,
            value: None,
            chunk_index: 0,
            range_index: 0,
        }
    }

    pub fn start_side(&self) -> Side {
        self.value.map_or(Side::DEFAULT, |v| v.start_side())
    }

    pub fn end_side(&self) -> Side {
        self.value.map_or(Side::DEFAULT, |v| v.end_side())
    }

    fn is_skipped(&self, chunk: &Arc<Chunk<T>>) -> bool {
        self.skip.map_or(false, |skip| skip.contains(&Arc::as_ptr(chunk)))
    }

    pub fn goto(&mut self, pos: usize, side: Side) {
        self.chunk_index = 0;
        self.range_index = 0;
        self.goto_inner(pos, side, false);
    }

    fn goto_inner(&mut self, pos: usize, side: Side, mut forward: bool) {
        let layer = self.layer;
        while let Some(next) = layer.chunks.get(self.chunk_index) {
            if !(self.is_skipped(next) || layer.chunk_end(self.chunk_index) < pos || next.max_point < self.min_point) {
                break;
            }
            self.chunk_index += 1;
            forward = false;
        }
        if let Some(chunk) = layer.chunks.get(self.chunk_index) {
            let base = layer.chunk_pos[self.chunk_index];
            let range_index = if pos < base {
                0
            } else {
                chunk.find_index(pos - base, side, true, 0)
            };
            if !forward || self.range_index < range_index {
                self.set_range_index(range_index);
            }
        }
        self.next();
    }

    /// (pos, side) 以降の位置まで進める
    pub fn forward(&mut self, pos: usize, side: Side) {
        if self.to.cmp(&pos).then(self.end_side().cmp(&side)).is_lt() {
            self.goto_inner(pos, side, true);
        }
    }

    pub fn next(&mut self) {
        let layer = self.layer;
        loop {
            let Some(chunk) = layer.chunks.get(self.chunk_index) else {
                self.from = FAR;
                self.to = FAR;
                self.value = None;
                break;
            };
            let chunk_pos = layer.chunk_pos[self.chunk_index];
            let value: &'a T = &chunk.value[self.range_index];
            self.from = chunk_pos + chunk.from[self.range_index];
            self.to = chunk_pos + chunk.to[self.range_index];
            self.value = Some(value);
            self.set_range_index(self.range_index + 1);
            match self.min_point {
                None => break,
                Some(min) if value.is_point() && self.to - self.from >= min => break,
                Some(_) => {}
            }
        }
    }

    fn set_range_index(&mut self, index: usize) {
        let layer = self.layer;
        if index == layer.chunks[self.chunk_index].value.len() {
            self.chunk_index += 1;
            while layer
                .chunks
                .get(self.chunk_index)
                .map_or(false, |chunk| self.is_skipped(chunk))
            {
                self.chunk_index += 1;
            }
            self.range_index = 0;
        } else {
            self.range_index = index;
        }
    }

    /// 現在のチャンクの残りを読み飛ばす
    pub fn next_chunk(&mut self) {
        self.chunk_index += 1;
        self.range_index = 0;
        self.next();
    }

    /// from, start_side, rank, to, end_side の順で比較
    fn compare(&self, other: &Self) -> Ordering {
        self.from
            .cmp(&other.from)
            .then(self.start_side().cmp(&other.start_side()))
            .then(self.rank.cmp(&other.rank))
            .then(self.to.cmp(&other.to))
            .then(self.end_side().cmp(&other.end_side()))
    }
}

/// 複数の層カーソルを最小ヒープで併合するカーソル
pub(crate) struct HeapCursor<'a, T> {
    heap: Vec<LayerCursor<'a, T>>,
    pub from: usize,
    pub to: usize,
    pub value: Option<&'a T>,
    pub rank: usize,
}

impl<'a, T: RangeValue> HeapCursor<'a, T> {
    /// 各集合のすべての層を対象にする。集合の順番がランクになる
    pub fn new(sets: &[&'a RangeSet<T>], skip: Option<&'a SharedChunks<T>>, min_point: Option<usize>) -> Self {
        let mut heap = Vec::new();
        for (rank, set) in sets.iter().enumerate() {
            for layer in set.layers() {
                if layer.max_point >= min_point {
                    heap.push(LayerCursor::new(layer, skip, min_point, rank));
                }
            }
        }
        Self {
            heap,
            from: FAR,
            to: FAR,
            value: None,
            rank: 0,
        }
    }

    pub fn start_side(&self) -> Side {
        self.value.map_or(Side::DEFAULT, |v| v.start_side())
    }

    fn heapify(&mut self) {
        for i in (0..=(self.heap.len() >> 1)).rev() {
            heap_bubble(&mut self.heap, i);
        }
    }

    pub fn goto(&mut self, pos: usize, side: Side) {
        for cursor in &mut self.heap {
            cursor.goto(pos, side);
        }
        self.heapify();
        self.next();
    }

    pub fn forward(&mut self, pos: usize, side: Side) {
        for cursor in &mut self.heap {
            cursor.forward(pos, side);
        }
        self.heapify();
        let end_side = self.value.map_or(Side::DEFAULT, |v| v.end_side());
        if self.to.cmp(&pos).then(end_side.cmp(&side)).is_lt() {
            self.next();
        }
    }

    pub fn next(&mut self) {
        let Some(top) = self.heap.first_mut() else {
            self.from = FAR;
            self.to = FAR;
            self.value = None;
            return;
        };
        self.from = top.from;
        self.to = top.to;
        self.value = top.value;
        self.rank = top.rank;
        if top.value.is_some() {
            top.next();
        }
        heap_bubble(&mut self.heap, 0);
    }
}

fn heap_bubble<T: RangeValue>(heap: &mut [LayerCursor<'_, T>], mut index: usize) {
    loop {
        let mut child = (index << 1) + 1;
        if child >= heap.len() {
            break;
        }
        if child + 1 < heap.len() && heap[child].compare(&heap[child + 1]).is_ge() {
            child += 1;
        }
        if heap[index].compare(&heap[child]).is_lt() {
            break;
        }
        heap.swap(index, child);
        index = child;
    }
}

/// 範囲を (from, start_side, 集合の順, to, end_side) の順に返すカーソル
///
/// 一回限りの走査に使う。[`RangeCursor::goto`] で位置を移動できる
pub struct RangeCursor<'a, T> {
    inner: HeapCursor<'a, T>,
}

impl<'a, T: RangeValue> RangeCursor<'a, T> {
    pub(crate) fn new(sets: &[&'a RangeSet<T>], from: usize) -> Self {
        let mut inner = HeapCursor::new(sets, None, None);
        inner.goto(from, Side::MIN);
        Self { inner }
    }

    /// `pos` で終わる、または `pos` より後ろで終わる最初の範囲へ移動
    pub fn goto(&mut self, pos: usize) -> &mut Self {
        self.inner.goto(pos, Side::MIN);
        self
    }

    /// 現在の範囲の値（終了していれば `None`）
    pub fn value(&self) -> Option<&'a T> {
        self.inner.value
    }

    pub fn from(&self) -> usize {
        self.inner.from
    }

    pub fn to(&self) -> usize {
        self.inner.to
    }

    /// 現在の範囲が属する集合の番号
    pub fn rank(&self) -> usize {
        self.inner.rank
    }
}

impl<'a, T: RangeValue> Iterator for RangeCursor<'a, T> {
    type Item = Range<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.inner.value?;
        let range = Range {
            from: self.inner.from,
            to: self.inner.to,
            value,
        };
        self.inner.next();
        Some(range)
    }
}

/// 範囲の重なりを、有効な範囲の組が一定の区間と点範囲へ分解するカーソル
pub(crate) struct SpanCursor<'a, T> {
    cursor: HeapCursor<'a, T>,
    pub active: Vec<&'a T>,
    active_to: Vec<usize>,
    active_rank: Vec<usize>,
    min_active: Option<usize>,
    /// 現在の区間が点範囲ならその値
    pub point: Option<&'a T>,
    pub point_from: usize,
    pub point_rank: usize,
    pub to: usize,
    pub end_side: Side,
    pub open_start: Option<usize>,
}

impl<'a, T: RangeValue> SpanCursor<'a, T> {
    pub fn new(sets: &[&'a RangeSet<T>], skip: Option<&'a SharedChunks<T>>, min_point: Option<usize>) -> Self {
        Self {
            cursor: HeapCursor::new(sets, skip, min_point),
            active: Vec::new(),
            active_to: Vec::new(),
            active_rank: Vec::new(),
            min_active: None,
            point: None,
            point_from: 0,
            point_rank: 0,
            to: 0,
            end_side: Side::MIN,
            open_start: None,
        }
    }

    pub fn goto(&mut self, pos: usize, side: Side) -> &mut Self {
        self.cursor.goto(pos, side);
        self.active.clear();
        self.active_to.clear();
        self.active_rank.clear();
        self.min_active = None;
        self.to = pos;
        self.end_side = side;
        self.open_start = None;
        self.next();
        self
    }

    fn forward(&mut self, pos: usize, side: Side) {
        while let Some(min) = self.min_active {
            let ends_before = self.active_to[min]
                .cmp(&pos)
                .then(self.active[min].end_side().cmp(&side))
                .is_lt();
            if !ends_before {
                break;
            }
            self.remove_active(min);
        }
        self.cursor.forward(pos, side);
    }

    fn remove_active(&mut self, index: usize) {
        self.active.remove(index);
        self.active_to.remove(index);
        self.active_rank.remove(index);
        self.min_active = find_min_index(&self.active, &self.active_to);
    }

    fn add_active(&mut self, track_open: Option<&mut Vec<usize>>) {
        let Some(value) = self.cursor.value else {
            return;
        };
        let (to, rank) = (self.cursor.to, self.cursor.rank);
        // ランク、次に終了位置の順に並べる
        let mut i = 0;
        while i < self.active_rank.len() && rank.cmp(&self.active_rank[i]).then(to.cmp(&self.active_to[i])).is_gt() {
            i += 1;
        }
        self.active.insert(i, value);
        self.active_to.insert(i, to);
        self.active_rank.insert(i, rank);
        if let Some(track_open) = track_open {
            track_open.insert(i, self.cursor.from);
        }
        self.min_active = find_min_index(&self.active, &self.active_to);
    }

    /// 次の区間へ進む
    ///
    /// 呼び出し後、`point` が `Some` なら点範囲、そうでなければ `active` に覆われた区間
    pub fn next(&mut self) {
        let from = self.to;
        let was_point = self.point.is_some();
        self.point = None;
        let mut track_open: Option<Vec<usize>> = self.open_start.is_none().then(Vec::new);
        loop {
            let ending = self.min_active.filter(|&a| {
                self.active_to[a]
                    .cmp(&self.cursor.from)
                    .then(self.active[a].end_side().cmp(&self.cursor.start_side()))
                    .is_lt()
            });
            if let Some(a) = ending {
                if self.active_to[a] > from {
                    self.to = self.active_to[a];
                    self.end_side = self.active[a].end_side();
                    break;
                }
                self.remove_active(a);
                if let Some(track_open) = track_open.as_mut() {
                    track_open.remove(a);
                }
            } else if let Some(next_value) = self.cursor.value {
                if self.cursor.from > from {
                    self.to = self.cursor.from;
                    self.end_side = self.cursor.start_side();
                    break;
                }
                if !next_value.is_point() {
                    self.add_active(track_open.as_mut());
                    self.cursor.next();
                } else if was_point && self.cursor.to == self.to && self.cursor.from < self.cursor.to {
                    // 直前の点範囲の終端で終わる点範囲は無視
                    self.cursor.next();
                } else {
                    self.point = Some(next_value);
                    self.point_from = self.cursor.from;
                    self.point_rank = self.cursor.rank;
                    self.to = self.cursor.to;
                    self.end_side = next_value.end_side();
                    self.cursor.next();
                    self.forward(self.to, self.end_side);
                    break;
                }
            } else {
                self.to = FAR;
                self.end_side = Side::MAX;
                break;
            }
        }
        if let Some(track_open) = track_open {
            let open = track_open.iter().rev().take_while(|&&start| start < from).count();
            self.open_start = Some(open);
        }
    }

    /// 現在の点範囲を囲んで有効な範囲
    pub fn active_for_point(&self, to: usize) -> Vec<&'a T> {
        let point_end = self.point.map_or(Side::MIN, |p| p.end_side());
        let mut active = Vec::new();
        for i in (0..self.active.len()).rev() {
            if self.active_rank[i] < self.point_rank {
                break;
            }
            if self.active_to[i] > to || (self.active_to[i] == to && self.active[i].end_side() >= point_end) {
                active.push(self.active[i]);
            }
        }
        active.reverse();
        active
    }

    /// `to` を越えて続く有効な範囲の数
    pub fn open_end(&self, to: usize) -> usize {
        self.active_to.iter().rev().take_while(|&&end| end > to).count()
    }
}

fn find_min_index<T: RangeValue>(values: &[&T], positions: &[usize]) -> Option<usize> {
    let mut found: Option<usize> = None;
    for (i, &pos) in positions.iter().enumerate() {
        let smaller = match found {
            None => true,
            Some(f) => pos
                .cmp(&positions[f])
                .then(values[i].end_side().cmp(&values[f].end_side()))
                .is_lt(),
        };
        if smaller {
            found = Some(i);
        }
    }
    found
}
