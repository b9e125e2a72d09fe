//! 範囲集合
//!
//! 位置に結び付いた値（マーク、診断、ウィジェットなど）の不変な集合。
//! 範囲はチャンクにまとめられ、重なる範囲は下の層に置かれる。
//! 更新・写像では影響を受けないチャンクを参照共有する

mod builder;
mod chunk;
mod compare;
mod cursor;

pub use builder::RangeSetBuilder;
pub use compare::{RangeComparator, SpanIterator};
pub use cursor::RangeCursor;

use crate::change::{Assoc, ChangeDesc, MapMode, Touch};
use crate::error::{range_set::Result, RangeSetError};
use chunk::Chunk;
use cursor::{LayerCursor, SpanCursor};
use std::cmp::Ordering;
use std::sync::Arc;

/// 走査の番兵として使う十分遠い位置
pub(crate) const FAR: usize = 1_000_000_000;

/// 同じ位置にある範囲の並び順を決める値
///
/// 小さいほど前に並ぶ。写像時の寄せ方向は符号で決まる
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Side(i32);

impl Side {
    /// 探索用の最小値
    pub const MIN: Side = Side(-(FAR as i32));
    /// 探索用の最大値
    pub const MAX: Side = Side(FAR as i32);
    /// 同じ位置の範囲より前
    pub const BEFORE: Side = Side(-1);
    pub const DEFAULT: Side = Side(0);
    /// 同じ位置の範囲より後ろ
    pub const AFTER: Side = Side(1);

    /// 任意の並び順を作成（`MIN`・`MAX` の範囲に収める）
    pub const fn new(order: i32) -> Side {
        if order < Side::MIN.0 {
            Side::MIN
        } else if order > Side::MAX.0 {
            Side::MAX
        } else {
            Side(order)
        }
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// 写像時の寄せ方向
    pub fn assoc(self) -> Assoc {
        Assoc::from_sign(self.0)
    }
}

/// 範囲集合に格納する値
pub trait RangeValue: Clone + PartialEq {
    /// 範囲の開始側の並び順
    fn start_side(&self) -> Side {
        Side::DEFAULT
    }

    /// 範囲の終了側の並び順
    fn end_side(&self) -> Side {
        Side::DEFAULT
    }

    /// 空範囲が削除に巻き込まれたときの扱い
    fn map_mode(&self) -> MapMode {
        MapMode::TrackDel
    }

    /// 点範囲（不可分な範囲）か
    fn is_point(&self) -> bool {
        false
    }

    /// 値を範囲 `[from, to)` に結び付ける
    fn range(self, from: usize, to: usize) -> Range<Self>
    where
        Self: Sized,
    {
        Range { from, to, value: self }
    }
}

/// 値と位置の組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range<T> {
    pub from: usize,
    pub to: usize,
    pub value: T,
}

impl<T> Range<T> {
    pub fn new(from: usize, to: usize, value: T) -> Self {
        Self { from, to, value }
    }
}

fn cmp_range<T: RangeValue>(a: &Range<T>, b: &Range<T>) -> Ordering {
    a.from
        .cmp(&b.from)
        .then(a.value.start_side().cmp(&b.value.start_side()))
}

/// 範囲集合の1層
#[derive(Debug)]
pub struct Layer<T> {
    /// 各チャンクの基準位置（昇順）
    pub(crate) chunk_pos: Vec<usize>,
    pub(crate) chunks: Vec<Arc<Chunk<T>>>,
    pub(crate) next_layer: RangeSet<T>,
    /// この層以下の点範囲の最大幅
    pub(crate) max_point: Option<usize>,
}

impl<T: RangeValue> Layer<T> {
    pub(crate) fn new(chunk_pos: Vec<usize>, chunks: Vec<Arc<Chunk<T>>>, next_layer: RangeSet<T>) -> Self {
        let own = chunks.iter().map(|chunk| chunk.max_point).max().flatten();
        let max_point = own.max(next_layer.max_point());
        Self {
            chunk_pos,
            chunks,
            next_layer,
            max_point,
        }
    }

    pub(crate) fn chunk_end(&self, index: usize) -> usize {
        self.chunk_pos[index] + self.chunks[index].length()
    }
}

/// 不変な範囲集合
///
/// 空集合は専用の値で表す。複製は参照カウントの増加のみ
#[derive(Debug)]
pub enum RangeSet<T> {
    Empty,
    Chunked(Arc<Layer<T>>),
}

impl<T> Clone for RangeSet<T> {
    fn clone(&self) -> Self {
        match self {
            RangeSet::Empty => RangeSet::Empty,
            RangeSet::Chunked(layer) => RangeSet::Chunked(Arc::clone(layer)),
        }
    }
}

impl<T> Default for RangeSet<T> {
    fn default() -> Self {
        RangeSet::Empty
    }
}

/// [`RangeSet::update`] の指定
pub struct RangeSetUpdate<'f, T> {
    /// 追加する範囲
    pub add: Vec<Range<T>>,
    /// `add` を並べ替えるか（偽なら昇順で渡す）
    pub sort: bool,
    /// 既存の範囲を残すか判定する。偽を返した範囲は削除
    pub filter: Option<Box<dyn FnMut(usize, usize, &T) -> bool + 'f>>,
    /// `filter` を適用する範囲の開始
    pub filter_from: usize,
    /// `filter` を適用する範囲の終了（`None` なら集合の末尾まで）
    pub filter_to: Option<usize>,
}

impl<T> Default for RangeSetUpdate<'_, T> {
    fn default() -> Self {
        Self {
            add: Vec::new(),
            sort: false,
            filter: None,
            filter_from: 0,
            filter_to: None,
        }
    }
}

impl<'f, T> RangeSetUpdate<'f, T> {
    /// 範囲の追加
    pub fn add(ranges: Vec<Range<T>>) -> Self {
        Self {
            add: ranges,
            ..Default::default()
        }
    }

    pub fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    /// 既存の範囲の選別
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(usize, usize, &T) -> bool + 'f,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// 選別を `[from, to]` に重なる範囲に限る
    pub fn filter_range(mut self, from: usize, to: usize) -> Self {
        self.filter_from = from;
        self.filter_to = Some(to);
        self
    }
}

impl<T: RangeValue> RangeSet<T> {
    pub fn empty() -> Self {
        RangeSet::Empty
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RangeSet::Empty)
    }

    /// 同じ値を共有しているか
    pub fn ptr_eq(a: &RangeSet<T>, b: &RangeSet<T>) -> bool {
        match (a, b) {
            (RangeSet::Empty, RangeSet::Empty) => true,
            (RangeSet::Chunked(a), RangeSet::Chunked(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn layers(&self) -> impl Iterator<Item = &Layer<T>> {
        let mut current = self;
        std::iter::from_fn(move || match current {
            RangeSet::Empty => None,
            RangeSet::Chunked(layer) => {
                current = &layer.next_layer;
                Some(&**layer)
            }
        })
    }

    pub(crate) fn max_point(&self) -> Option<usize> {
        match self {
            RangeSet::Empty => None,
            RangeSet::Chunked(layer) => layer.max_point,
        }
    }

    /// 範囲の数
    pub fn size(&self) -> usize {
        self.layers()
            .flat_map(|layer| layer.chunks.iter())
            .map(|chunk| chunk.value.len())
            .sum()
    }

    /// 最後の範囲の終了位置
    pub fn length(&self) -> usize {
        self.layers()
            .filter_map(|layer| layer.chunks.len().checked_sub(1).map(|last| layer.chunk_end(last)))
            .max()
            .unwrap_or(0)
    }

    /// 範囲の配列から作成
    ///
    /// `sort` が偽なら (from, start_side) の昇順で渡す必要がある
    pub fn of<I>(ranges: I, sort: bool) -> Result<RangeSet<T>>
    where
        I: IntoIterator<Item = Range<T>>,
    {
        let mut ranges: Vec<Range<T>> = ranges.into_iter().collect();
        if sort {
            ranges.sort_by(cmp_range);
        }
        let mut builder = RangeSetBuilder::new();
        for range in ranges {
            builder.add(range.from, range.to, range.value)?;
        }
        Ok(builder.finish())
    }

    /// 複数の集合を1つにまとめる（チャンクは共有）
    pub fn join(sets: &[RangeSet<T>]) -> RangeSet<T> {
        let Some((last, rest)) = sets.split_last() else {
            return RangeSet::Empty;
        };
        let mut result = last.clone();
        for set in rest.iter().rev() {
            for layer in set.layers() {
                result = RangeSet::Chunked(Arc::new(Layer::new(
                    layer.chunk_pos.clone(),
                    layer.chunks.clone(),
                    result,
                )));
            }
        }
        result
    }

    /// 範囲の追加・削除を行った新しい集合
    ///
    /// 追加も選別もなければ同じ値を返す。
    /// 選別範囲の外にあり追加範囲とも重ならないチャンクは共有される
    pub fn update(&self, update: RangeSetUpdate<'_, T>) -> Result<RangeSet<T>> {
        let RangeSetUpdate {
            mut add,
            sort,
            mut filter,
            filter_from,
            filter_to,
        } = update;
        if add.is_empty() && filter.is_none() {
            return Ok(self.clone());
        }
        if let Some(range) = add.iter().find(|range| range.to < range.from) {
            return Err(RangeSetError::InvalidRange {
                from: range.from,
                to: range.to,
            });
        }
        if sort {
            add.sort_by(cmp_range);
        }
        let filter_to = filter_to.unwrap_or_else(|| self.length());
        self.update_inner(add, filter.as_deref_mut(), filter_from, filter_to)
    }

    fn update_inner<'f>(
        &self,
        add: Vec<Range<T>>,
        mut filter: Option<&mut (dyn FnMut(usize, usize, &T) -> bool + 'f)>,
        filter_from: usize,
        filter_to: usize,
    ) -> Result<RangeSet<T>> {
        if add.is_empty() && filter.is_none() {
            return Ok(self.clone());
        }
        let layer = match self {
            RangeSet::Empty if add.is_empty() => return Ok(RangeSet::Empty),
            RangeSet::Empty => return RangeSet::of(add, false),
            RangeSet::Chunked(layer) => layer,
        };

        let mut cur = LayerCursor::new(layer, None, None, 0);
        cur.goto(0, Side::MIN);
        let mut add = add.into_iter().peekable();
        let mut spill = Vec::new();
        let mut builder = RangeSetBuilder::new();
        while cur.value.is_some() || add.peek().is_some() {
            let add_first = add.peek().map_or(false, |range| {
                cur.from
                    .cmp(&range.from)
                    .then(cur.start_side().cmp(&range.value.start_side()))
                    .is_ge()
            });
            if add_first {
                if let Some(range) = add.next() {
                    if builder.accepts(range.from, &range.value)? {
                        builder.push(range.from, range.to, range.value);
                    } else {
                        spill.push(range);
                    }
                }
                continue;
            }
            let index = cur.chunk_index;
            let whole_chunk = cur.range_index == 1
                && index < layer.chunks.len()
                && add.peek().map_or(true, |range| layer.chunk_end(index) < range.from)
                && (filter.is_none() || filter_from > layer.chunk_end(index) || filter_to < layer.chunk_pos[index]);
            if whole_chunk && builder.add_chunk(layer.chunk_pos[index], Arc::clone(&layer.chunks[index])) {
                cur.next_chunk();
                continue;
            }
            if let Some(value) = cur.value {
                let (from, to) = (cur.from, cur.to);
                let keep = match filter.as_mut() {
                    Some(f) => filter_from > to || filter_to < from || f(from, to, value),
                    None => true,
                };
                if keep {
                    if builder.accepts(from, value)? {
                        builder.push(from, to, value.clone());
                    } else {
                        spill.push(Range::new(from, to, value.clone()));
                    }
                }
            }
            cur.next();
        }

        let next = if layer.next_layer.is_empty() && spill.is_empty() {
            RangeSet::Empty
        } else {
            if !spill.is_empty() {
                log::trace!("{} ranges spilled into the next layer", spill.len());
            }
            layer.next_layer.update_inner(spill, filter, filter_from, filter_to)?
        };
        Ok(builder.finish_inner(next))
    }

    /// 変更を通して写した集合
    ///
    /// 変更のない範囲にあるチャンクは基準位置だけを写して共有し、
    /// 変更に触れるチャンクは範囲ごとに写す。変更が空なら同じ値を返す
    pub fn map(&self, changes: &ChangeDesc) -> Result<RangeSet<T>> {
        let layer = match self {
            RangeSet::Chunked(layer) if !changes.is_empty() => layer,
            _ => return Ok(self.clone()),
        };
        let mut chunks = Vec::new();
        let mut chunk_pos = Vec::new();
        for (i, chunk) in layer.chunks.iter().enumerate() {
            let start = layer.chunk_pos[i];
            match changes.touches_range(start, start + chunk.length()) {
                Touch::No => {
                    chunks.push(Arc::clone(chunk));
                    chunk_pos.push(changes.map_pos(start, Assoc::Before)?);
                }
                Touch::Yes => {
                    if let (Some(mapped), pos) = chunk.map(start, changes)? {
                        chunks.push(Arc::new(mapped));
                        chunk_pos.push(pos);
                    }
                }
                Touch::Covers => {}
            }
        }
        let next = layer.next_layer.map(changes)?;
        if chunks.is_empty() {
            return Ok(next);
        }
        Ok(RangeSet::Chunked(Arc::new(Layer::new(chunk_pos, chunks, next))))
    }

    /// `[from, to]` に重なるすべての範囲について `f` を呼ぶ（順不同）
    ///
    /// `f` が偽を返したら終了する
    pub fn between<F>(&self, from: usize, to: usize, mut f: F)
    where
        F: FnMut(usize, usize, &T) -> bool,
    {
        for layer in self.layers() {
            for (i, chunk) in layer.chunks.iter().enumerate() {
                let start = layer.chunk_pos[i];
                if to >= start && from <= start + chunk.length() && !chunk.between(start, from, to, &mut f) {
                    return;
                }
            }
        }
    }

    /// `from` 以降で終わる範囲を順に返すカーソル
    pub fn iter(&self, from: usize) -> RangeCursor<'_, T> {
        RangeCursor::new(&[self], from)
    }

    /// 複数の集合を併合して順に返すカーソル
    pub fn iter_sets(sets: &[RangeSet<T>], from: usize) -> RangeCursor<'_, T> {
        let sets: Vec<&RangeSet<T>> = sets.iter().collect();
        RangeCursor::new(&sets, from)
    }

    /// `[from, to]` を、覆う範囲の組が一定の区間と点範囲に分解して `iterator` へ渡す
    ///
    /// `min_point_size` を指定するとそれより小さい点範囲は無視する。
    /// `to` の時点で開いている範囲の数を返す
    pub fn spans<I>(sets: &[RangeSet<T>], from: usize, to: usize, iterator: &mut I, min_point_size: Option<usize>) -> usize
    where
        I: SpanIterator<T> + ?Sized,
    {
        let sets: Vec<&RangeSet<T>> = sets.iter().collect();
        compare::spans(&sets, from, to, iterator, min_point_size)
    }

    /// 変更 `text_diff` の前後の集合群を比較し、異なる区間を `comparator` へ渡す
    ///
    /// 位置・内容とも変わらないチャンクは読み飛ばす
    pub fn compare<C>(
        old_sets: &[RangeSet<T>],
        new_sets: &[RangeSet<T>],
        text_diff: &ChangeDesc,
        comparator: &mut C,
        min_point_size: Option<usize>,
    ) where
        C: RangeComparator<T> + ?Sized,
    {
        let relevant = |set: &&RangeSet<T>| {
            set.max_point() > Some(0) || (!set.is_empty() && set.max_point() >= min_point_size)
        };
        let a: Vec<&RangeSet<T>> = old_sets.iter().filter(relevant).collect();
        let b: Vec<&RangeSet<T>> = new_sets.iter().filter(relevant).collect();
        let shared = compare::find_shared_chunks(&a, &b, Some(text_diff));
        let mut side_a = SpanCursor::new(&a, Some(&shared), min_point_size);
        let mut side_b = SpanCursor::new(&b, Some(&shared), min_point_size);
        text_diff.iter_gaps(|from_a, from_b, length| {
            compare::compare_spans(&mut side_a, from_a, &mut side_b, from_b, length, &mut *comparator);
        });
        if text_diff.is_empty() && text_diff.len() == 0 {
            compare::compare_spans(&mut side_a, 0, &mut side_b, 0, 0, comparator);
        }
    }

    /// `[from, to]` で2つの集合群の内容が等しいか（`to` 省略時は末尾まで）
    pub fn eq(old_sets: &[RangeSet<T>], new_sets: &[RangeSet<T>], from: usize, to: Option<usize>) -> bool {
        compare::eq(old_sets, new_sets, from, to.unwrap_or(FAR - 1))
    }
}
