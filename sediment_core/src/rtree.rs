// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable packed R-tree over per-op bounds.
//!
//! The tree is bulk-loaded once, bottom-up, from `(Rect, op_index)` entries
//! using sort-tile-recursive packing and never modified afterwards. Nodes and
//! leaves live in flat arrays and refer to their children by index range, in
//! the same struct-of-arrays style as the rest of the crate.
//!
//! ```text
//!   level 2            [root]
//!                   ┌────┴────┐
//!   level 1       [n0]  ...  [n7]      up to FANOUT children each
//!                 ┌┴┐
//!   leaves       e0 e1 ... e7          (rect, op_index)
//! ```

use alloc::vec::Vec;

use kurbo::Rect;

/// Maximum children per node.
const FANOUT: usize = 8;

/// Closed rectangle intersection: touching edges count.
#[inline]
pub(crate) fn intersects(a: &Rect, b: &Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Whether `outer` contains all of `inner`.
#[inline]
pub(crate) fn contains(outer: &Rect, inner: &Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

/// A spatial index mapping device-space rectangles to op indices.
#[derive(Clone, Debug, Default)]
pub struct SpatialIndex {
    leaf_rects: Vec<Rect>,
    leaf_ids: Vec<u32>,
    node_bounds: Vec<Rect>,
    /// First child of each node, in leaves or in nodes.
    node_first: Vec<u32>,
    node_len: Vec<u32>,
    /// Whether a node's children are leaves.
    node_over_leaves: Vec<bool>,
    root: Option<u32>,
    bounds: Rect,
}

impl SpatialIndex {
    /// Bulk-loads an index from `(rect, op_index)` entries.
    ///
    /// Rectangles are normalized; entries with NaN coordinates are dropped.
    #[must_use]
    pub fn new(entries: &[(Rect, u32)]) -> Self {
        let mut items: Vec<(Rect, u32)> = entries
            .iter()
            .map(|&(r, id)| (r.abs(), id))
            .filter(|(r, _)| !r.is_nan())
            .collect();
        let mut index = Self::default();
        if items.is_empty() {
            return index;
        }

        str_sort(&mut items);
        let mut bounds = items[0].0;
        for &(r, id) in &items {
            bounds = bounds.union(r);
            index.leaf_rects.push(r);
            index.leaf_ids.push(id);
        }
        index.bounds = bounds;

        // Level 0: group leaves.
        let groups: Vec<(Rect, usize)> = index
            .leaf_rects
            .chunks(FANOUT)
            .map(|chunk| (union_all(chunk), chunk.len()))
            .collect();
        let mut level: Vec<u32> = Vec::with_capacity(groups.len());
        for (group, (bounds, len)) in groups.into_iter().enumerate() {
            level.push(index.push_node(bounds, group * FANOUT, len, true));
        }

        // Upper levels: group nodes until one remains. Nodes of a level are
        // contiguous, so a chunk of them is a contiguous child range.
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(FANOUT));
            for chunk in level.chunks(FANOUT) {
                let first = chunk[0] as usize;
                let bounds = union_all(&index.node_bounds[first..first + chunk.len()]);
                let node = index.push_node(bounds, first, chunk.len(), false);
                next.push(node);
            }
            level = next;
        }
        index.root = level.first().copied();
        index
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "op indices are u32, so node and leaf counts fit"
    )]
    fn push_node(&mut self, bounds: Rect, first: usize, len: usize, over_leaves: bool) -> u32 {
        let index = self.node_bounds.len() as u32;
        self.node_bounds.push(bounds);
        self.node_first.push(first as u32);
        self.node_len.push(len as u32);
        self.node_over_leaves.push(over_leaves);
        index
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaf_ids.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_ids.is_empty()
    }

    /// Union of all entry rectangles, or [`Rect::ZERO`] when empty.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Returns the sorted, deduplicated op indices whose rectangles
    /// intersect `query`.
    #[must_use]
    pub fn search(&self, query: Rect) -> Vec<u32> {
        let mut out = Vec::new();
        self.visit_leaves(query, |leaf| out.push(self.leaf_ids[leaf]));
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Returns the area drawn inside `query` as rectangles with no
    /// positive-area overlap between them.
    ///
    /// Entry rectangles are taken in op-index order and each one absorbs
    /// every kept rectangle it overlaps, so the result is a set of disjoint
    /// unions covering all matching entries. Rectangles that only touch
    /// stay separate.
    #[must_use]
    pub fn search_non_overlapping(&self, query: Rect) -> Vec<Rect> {
        let mut hits = Vec::new();
        self.visit_leaves(query, |leaf| hits.push((self.leaf_ids[leaf], self.leaf_rects[leaf])));
        hits.sort_by_key(|&(id, _)| id);

        let mut out: Vec<Rect> = Vec::with_capacity(hits.len());
        for (_, mut rect) in hits {
            if out.iter().any(|kept| contains(kept, &rect)) {
                continue;
            }
            while let Some(i) = out.iter().position(|kept| overlaps(kept, &rect)) {
                rect = rect.union(out.remove(i));
            }
            out.push(rect);
        }
        out
    }

    /// Calls `f` with the index of every leaf whose rectangle intersects
    /// `query`.
    fn visit_leaves(&self, query: Rect, mut f: impl FnMut(usize)) {
        let query = query.abs();
        let Some(root) = self.root else {
            return;
        };
        let mut stack = alloc::vec![root];
        while let Some(node) = stack.pop() {
            let node = node as usize;
            if !intersects(&self.node_bounds[node], &query) {
                continue;
            }
            let first = self.node_first[node];
            let len = self.node_len[node];
            if self.node_over_leaves[node] {
                for leaf in first as usize..(first + len) as usize {
                    if intersects(&self.leaf_rects[leaf], &query) {
                        f(leaf);
                    }
                }
            } else {
                stack.extend(first..first + len);
            }
        }
    }
}

/// Open rectangle intersection: the overlap has positive area.
#[inline]
fn overlaps(a: &Rect, b: &Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

fn union_all(rects: &[Rect]) -> Rect {
    rects[1..].iter().fold(rects[0], |acc, r| acc.union(*r))
}

/// Sort-tile-recursive ordering: vertical slices by center x, each slice
/// sorted by center y.
fn str_sort(items: &mut [(Rect, u32)]) {
    let leaves = items.len().div_ceil(FANOUT);
    let slices = isqrt(leaves).max(1);
    let per_slice = slices * FANOUT;
    items.sort_by(|a, b| a.0.center().x.total_cmp(&b.0.center().x));
    for slice in items.chunks_mut(per_slice) {
        slice.sort_by(|a, b| a.0.center().y.total_cmp(&b.0.center().y));
    }
}

fn isqrt(n: usize) -> usize {
    let mut r = 0;
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    // Round up so slices * slices covers n.
    if r * r < n { r + 1 } else { r }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> Vec<(Rect, u32)> {
        (0..n * n)
            .map(|i| {
                let x = f64::from(i % n) * 10.0;
                let y = f64::from(i / n) * 10.0;
                (Rect::new(x, y, x + 8.0, y + 8.0), i)
            })
            .collect()
    }

    fn brute_force(entries: &[(Rect, u32)], query: Rect) -> Vec<u32> {
        let mut ids: Vec<u32> = entries
            .iter()
            .filter(|(r, _)| intersects(r, &query))
            .map(|&(_, id)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn empty_index() {
        let index = SpatialIndex::new(&[]);
        assert!(index.is_empty());
        assert_eq!(index.bounds(), Rect::ZERO);
        assert!(index.search(Rect::new(-1e9, -1e9, 1e9, 1e9)).is_empty());
    }

    #[test]
    fn single_entry() {
        let index = SpatialIndex::new(&[(Rect::new(0.0, 0.0, 10.0, 10.0), 3)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(Rect::new(5.0, 5.0, 6.0, 6.0)), [3]);
        assert!(index.search(Rect::new(11.0, 0.0, 20.0, 10.0)).is_empty());
    }

    #[test]
    fn touching_edges_intersect() {
        let index = SpatialIndex::new(&[(Rect::new(0.0, 0.0, 10.0, 10.0), 0)]);
        assert_eq!(index.search(Rect::new(10.0, 0.0, 20.0, 10.0)), [0]);
    }

    #[test]
    fn matches_brute_force_on_a_grid() {
        let entries = grid(23);
        let index = SpatialIndex::new(&entries);
        assert_eq!(index.len(), entries.len());
        assert_eq!(index.bounds(), Rect::new(0.0, 0.0, 228.0, 228.0));
        for query in [
            Rect::new(0.0, 0.0, 5.0, 5.0),
            Rect::new(15.0, 15.0, 95.0, 35.0),
            Rect::new(100.0, -50.0, 101.0, 500.0),
            Rect::new(8.5, 8.5, 9.5, 9.5),
            Rect::new(-10.0, -10.0, 300.0, 300.0),
        ] {
            assert_eq!(index.search(query), brute_force(&entries, query), "{query:?}");
        }
    }

    #[test]
    fn results_are_sorted_and_unique() {
        let r = Rect::new(0.0, 0.0, 1.0, 1.0);
        let index = SpatialIndex::new(&[(r, 9), (r, 2), (r, 9), (r, 5)]);
        assert_eq!(index.search(r), [2, 5, 9]);
    }

    #[test]
    fn reversed_rects_are_normalized() {
        let index = SpatialIndex::new(&[(Rect::new(10.0, 10.0, 0.0, 0.0), 1)]);
        assert_eq!(index.search(Rect::new(2.0, 2.0, 3.0, 3.0)), [1]);
    }

    #[test]
    fn non_overlapping_search_merges_overlaps() {
        let index = SpatialIndex::new(&[
            (Rect::new(0.0, 0.0, 10.0, 10.0), 0),
            (Rect::new(5.0, 5.0, 15.0, 15.0), 1),
            (Rect::new(40.0, 0.0, 50.0, 10.0), 2),
            // Touches the first union without overlapping it.
            (Rect::new(15.0, 0.0, 20.0, 5.0), 3),
            (Rect::new(100.0, 100.0, 110.0, 110.0), 4),
        ]);
        let rects = index.search_non_overlapping(Rect::new(0.0, 0.0, 60.0, 60.0));
        assert_eq!(
            rects,
            [
                Rect::new(0.0, 0.0, 15.0, 15.0),
                Rect::new(40.0, 0.0, 50.0, 10.0),
                Rect::new(15.0, 0.0, 20.0, 5.0),
            ]
        );
    }

    #[test]
    fn non_overlapping_search_chains_merges() {
        // The last rect bridges two earlier disjoint ones, whose union then
        // swallows the contained rect recorded after it.
        let index = SpatialIndex::new(&[
            (Rect::new(0.0, 0.0, 10.0, 10.0), 0),
            (Rect::new(20.0, 0.0, 30.0, 10.0), 1),
            (Rect::new(5.0, 2.0, 25.0, 8.0), 2),
            (Rect::new(12.0, 1.0, 14.0, 3.0), 3),
        ]);
        assert_eq!(
            index.search_non_overlapping(Rect::new(-5.0, -5.0, 50.0, 50.0)),
            [Rect::new(0.0, 0.0, 30.0, 10.0)]
        );
    }

    #[test]
    fn non_overlapping_search_results_are_disjoint() {
        let entries: Vec<(Rect, u32)> = (0..60u32)
            .map(|i| {
                let x = f64::from(i * 7 % 50);
                let y = f64::from(i * 13 % 40);
                (Rect::new(x, y, x + 6.0, y + 4.0), i)
            })
            .collect();
        let index = SpatialIndex::new(&entries);
        let query = Rect::new(10.0, 10.0, 35.0, 30.0);
        let rects = index.search_non_overlapping(query);
        for (i, a) in rects.iter().enumerate() {
            for b in &rects[i + 1..] {
                assert!(!overlaps(a, b), "{a:?} overlaps {b:?}");
            }
        }
        for id in index.search(query) {
            let entry = entries[id as usize].0;
            assert!(rects.iter().any(|r| contains(r, &entry)), "{entry:?} not covered");
        }
    }

    #[test]
    fn non_overlapping_search_on_empty_index() {
        let index = SpatialIndex::new(&[]);
        assert!(index.search_non_overlapping(Rect::new(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn isqrt_rounds_up() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(4), 2);
        assert_eq!(isqrt(5), 3);
    }
}
