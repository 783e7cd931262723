// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visibility decisions for culled dispatch.

use alloc::vec::Vec;
use core::ops::RangeInclusive;

use kurbo::Rect;

use crate::rtree::{SpatialIndex, contains};

/// An integer device-space rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge.
    pub x1: i32,
    /// Bottom edge.
    pub y1: i32,
}

impl IRect {
    /// Creates a rectangle from its edges.
    #[must_use]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Creates a rectangle from an origin and a size.
    #[must_use]
    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Converts to a floating-point rectangle.
    #[must_use]
    pub fn to_rect(self) -> Rect {
        Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

impl From<IRect> for Rect {
    fn from(r: IRect) -> Self {
        r.to_rect()
    }
}

/// Decides which op indices culled dispatch must visit.
///
/// Built from an optional [`SpatialIndex`] and a query rectangle. The visible
/// set is a superset of the ops whose recorded bounds intersect the query.
/// Without an index, or when the query covers everything the index holds,
/// every op is visible and the index is never searched.
#[derive(Clone, Debug)]
pub struct Culler {
    /// Sorted visible op indices; `None` means everything is visible.
    visible: Option<Vec<u32>>,
}

impl Culler {
    /// Creates a culler for `query` against `index`.
    #[must_use]
    pub fn new(index: Option<&SpatialIndex>, query: Rect) -> Self {
        let visible = match index {
            Some(index) if !contains(&query.abs(), &index.bounds()) => Some(index.search(query)),
            _ => None,
        };
        Self { visible }
    }

    /// A culler that reports every op visible.
    #[must_use]
    pub const fn visit_all() -> Self {
        Self { visible: None }
    }

    /// Whether any op can be reported invisible.
    #[must_use]
    pub fn is_culling(&self) -> bool {
        self.visible.is_some()
    }

    /// Whether the op at `op_index` must be visited.
    #[must_use]
    pub fn is_visible(&self, op_index: u32) -> bool {
        match &self.visible {
            None => true,
            Some(ids) => ids.binary_search(&op_index).is_ok(),
        }
    }

    /// Whether any op in `range` must be visited.
    #[must_use]
    pub fn any_visible(&self, range: RangeInclusive<u32>) -> bool {
        match &self.visible {
            None => true,
            Some(ids) => {
                let first = ids.partition_point(|&id| id < *range.start());
                ids.get(first).is_some_and(|id| id <= range.end())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SpatialIndex {
        SpatialIndex::new(&[
            (Rect::new(0.0, 0.0, 10.0, 10.0), 1),
            (Rect::new(50.0, 50.0, 60.0, 60.0), 4),
            (Rect::new(0.0, 50.0, 10.0, 60.0), 6),
        ])
    }

    #[test]
    fn irect_conversion() {
        let r = IRect::from_xywh(-5, 2, 10, 20);
        assert_eq!(r, IRect::new(-5, 2, 5, 22));
        assert_eq!(Rect::from(r), Rect::new(-5.0, 2.0, 5.0, 22.0));
    }

    #[test]
    fn no_index_visits_everything() {
        let culler = Culler::new(None, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(!culler.is_culling());
        assert!(culler.is_visible(12345));
        assert!(culler.any_visible(0..=0));
    }

    #[test]
    fn covering_query_visits_everything() {
        let index = index();
        let culler = Culler::new(Some(&index), Rect::new(-1.0, -1.0, 100.0, 100.0));
        assert!(!culler.is_culling());
        assert!(culler.is_visible(2), "ops without entries stay visible");
    }

    #[test]
    fn partial_query_filters() {
        let index = index();
        let culler = Culler::new(Some(&index), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert!(culler.is_culling());
        assert!(culler.is_visible(1));
        assert!(!culler.is_visible(4));
        assert!(!culler.is_visible(6));
        assert!(!culler.is_visible(0));
    }

    #[test]
    fn any_visible_checks_ranges() {
        let index = index();
        let culler = Culler::new(Some(&index), Rect::new(45.0, 0.0, 70.0, 70.0));
        assert!(!culler.any_visible(0..=3));
        assert!(culler.any_visible(2..=4));
        assert!(culler.any_visible(4..=4));
        assert!(!culler.any_visible(5..=9));
    }
}
