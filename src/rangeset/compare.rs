//! 範囲集合の比較と区間分解

use super::cursor::{SharedChunks, SpanCursor};
use super::{RangeSet, RangeValue, Side, FAR};
use crate::change::{Assoc, ChangeDesc, Touch};
use std::collections::HashMap;
use std::sync::Arc;

/// [`RangeSet::spans`] の受け手
pub trait SpanIterator<T> {
    /// 点範囲を含まない区間。`active` はその区間を覆う範囲、
    /// `open_start` はそのうち区間の開始より前から続いている数
    fn span(&mut self, from: usize, to: usize, active: &[&T], open_start: usize);

    /// 点範囲。`index` は点範囲が属する集合の番号
    fn point(&mut self, from: usize, to: usize, value: &T, active: &[&T], open_start: usize, index: usize);
}

/// [`RangeSet::compare`] の受け手
pub trait RangeComparator<T> {
    /// 覆っている範囲の組が異なる区間
    fn compare_range(&mut self, from: usize, to: usize, active_a: &[&T], active_b: &[&T]);

    /// 点範囲が異なる区間
    fn compare_point(&mut self, from: usize, to: usize, point_a: Option<&T>, point_b: Option<&T>);

    /// 片側だけで区間の境界が変わる位置、または開いている範囲の数が両側で異なる境界
    fn bound_change(&mut self, _pos: usize) {}
}

pub(crate) fn same_value<T: PartialEq>(a: &T, b: &T) -> bool {
    std::ptr::eq(a, b) || a == b
}

/// 並び順を問わず同じ値の組か
///
/// 異なる層にある同一の範囲は、走査ごとに並ぶ順番が変わりうる
pub(crate) fn same_values<T: PartialEq>(a: &[&T], b: &[&T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.iter().zip(b).all(|(x, y)| same_value(*x, *y)) {
        return true;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = (0..b.len()).find(|&i| !used[i] && same_value(*x, b[i]));
        if let Some(i) = found {
            used[i] = true;
        }
        found.is_some()
    })
}

/// 両側に同じ位置で存在するチャンクを求める
///
/// `text_diff` があれば旧位置を写したうえで、変更に触れていないものに限る
pub(crate) fn find_shared_chunks<T: RangeValue>(
    a: &[&RangeSet<T>],
    b: &[&RangeSet<T>],
    text_diff: Option<&ChangeDesc>,
) -> SharedChunks<T> {
    let mut in_a = HashMap::new();
    for set in a {
        for layer in set.layers() {
            for (i, chunk) in layer.chunks.iter().enumerate() {
                if chunk.max_point <= Some(0) {
                    in_a.insert(Arc::as_ptr(chunk), layer.chunk_pos[i]);
                }
            }
        }
    }
    let mut shared = SharedChunks::new();
    for set in b {
        for layer in set.layers() {
            for (i, chunk) in layer.chunks.iter().enumerate() {
                let ptr = Arc::as_ptr(chunk);
                let Some(&known) = in_a.get(&ptr) else {
                    continue;
                };
                let same_place = match text_diff {
                    Some(diff) => {
                        diff.map_pos(known, Assoc::Before).map_or(false, |pos| pos == layer.chunk_pos[i])
                            && diff.touches_range(known, known + chunk.length()) == Touch::No
                    }
                    None => known == layer.chunk_pos[i],
                };
                if same_place {
                    shared.insert(ptr);
                }
            }
        }
    }
    log::debug!("{} chunks shared between compared sets", shared.len());
    shared
}

/// 旧側 `[start_a, start_a + length)` と新側 `[start_b, start_b + length)` を比較する
pub(crate) fn compare_spans<T, C>(
    a: &mut SpanCursor<'_, T>,
    start_a: usize,
    b: &mut SpanCursor<'_, T>,
    start_b: usize,
    length: usize,
    comparator: &mut C,
) where
    T: RangeValue,
    C: RangeComparator<T> + ?Sized,
{
    a.goto(start_a, Side::MIN);
    b.goto(start_b, Side::MIN);
    let end_b = start_b + length;
    let mut pos = start_b;
    loop {
        let a_to = (a.to + start_b).saturating_sub(start_a);
        let d_end = a_to.cmp(&b.to);
        let diff = d_end.then(a.end_side.cmp(&b.end_side));
        let end = if diff.is_lt() { a_to } else { b.to };
        let clip_end = end.min(end_b);
        if a.point.is_some() || b.point.is_some() {
            let same = match (a.point, b.point) {
                (Some(pa), Some(pb)) => {
                    same_value(pa, pb) && same_values(&a.active_for_point(a.to), &b.active_for_point(b.to))
                }
                _ => false,
            };
            if !same {
                comparator.compare_point(pos, clip_end, a.point, b.point);
            }
        } else if clip_end > pos && !same_values(&a.active, &b.active) {
            comparator.compare_range(pos, clip_end, &a.active, &b.active);
        }
        if end > end_b {
            break;
        }
        let end_a = (end + start_a).saturating_sub(start_b);
        if d_end.is_ne() || a.open_end(end_a) != b.open_end(end) {
            comparator.bound_change(end);
        }
        pos = end;
        if diff.is_le() {
            a.next();
        }
        if diff.is_ge() {
            b.next();
        }
    }
}

/// 集合群を区間と点範囲に分解して `iterator` へ渡す
pub(crate) fn spans<T, I>(
    sets: &[&RangeSet<T>],
    from: usize,
    to: usize,
    iterator: &mut I,
    min_point_size: Option<usize>,
) -> usize
where
    T: RangeValue,
    I: SpanIterator<T> + ?Sized,
{
    let to = to.min(FAR - 1);
    let mut cursor = SpanCursor::new(sets, None, min_point_size);
    cursor.goto(from, Side::MIN);
    let mut pos = from;
    let mut open_ranges = cursor.open_start.unwrap_or(0);
    loop {
        let cur_to = cursor.to.min(to);
        if let Some(point) = cursor.point {
            let active = cursor.active_for_point(cursor.to);
            let open_count = if cursor.point_from < from {
                active.len() + 1
            } else if point.start_side() < Side::DEFAULT {
                active.len()
            } else {
                active.len().min(open_ranges)
            };
            iterator.point(pos, cur_to, point, &active, open_count, cursor.point_rank);
            open_ranges = cursor.open_end(cur_to).min(active.len());
        } else if cur_to > pos {
            iterator.span(pos, cur_to, &cursor.active, open_ranges);
            open_ranges = cursor.open_end(cur_to);
        }
        if cursor.to > to {
            return open_ranges + usize::from(cursor.point.is_some());
        }
        pos = cursor.to;
        cursor.next();
    }
}

/// 範囲 `[from, to]` で2つの集合群が同じ内容か
pub(crate) fn eq<T: RangeValue>(old_sets: &[RangeSet<T>], new_sets: &[RangeSet<T>], from: usize, to: usize) -> bool {
    let contains = |sets: &[RangeSet<T>], set: &RangeSet<T>| sets.iter().any(|s| RangeSet::ptr_eq(s, set));
    let a: Vec<&RangeSet<T>> = old_sets
        .iter()
        .filter(|set| !set.is_empty() && !contains(new_sets, *set))
        .collect();
    let b: Vec<&RangeSet<T>> = new_sets
        .iter()
        .filter(|set| !set.is_empty() && !contains(old_sets, *set))
        .collect();
    if a.len() != b.len() {
        return false;
    }
    if a.is_empty() {
        return true;
    }
    let shared = find_shared_chunks(&a, &b, None);
    let mut side_a = SpanCursor::new(&a, Some(&shared), None);
    let mut side_b = SpanCursor::new(&b, Some(&shared), None);
    side_a.goto(from, Side::MIN);
    side_b.goto(from, Side::MIN);
    loop {
        let point_differs = match (side_a.point, side_b.point) {
            (Some(pa), Some(pb)) => !same_value(pa, pb),
            (Some(_), None) | (None, Some(_)) => true,
            _ => false,
        };
        if side_a.to != side_b.to || !same_values(&side_a.active, &side_b.active) || point_differs {
            return false;
        }
        if side_a.to > to {
            return true;
        }
        side_a.next();
        side_b.next();
    }
}
