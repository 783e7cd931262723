// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 transform for full-perspective records.
//!
//! Most transform records are 2-D and decode to [`kurbo::Affine`]. The
//! full-perspective record carries a [`Transform3d`], and the recorder keeps
//! its current matrix in this form so both kinds concatenate uniformly.

use core::ops::Mul;

use kurbo::{Affine, Point, Rect};

/// Homogeneous `w` at or below this is treated as behind the eye.
const MIN_W: f64 = 1e-9;

/// A column-major 4×4 transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix. Points are mapped as
/// `(x, y, 0, 1)`, so the third column never affects 2-D results.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from a column-major 2-D array.
    #[inline]
    #[must_use]
    pub const fn from_cols_array_2d(cols: [[f64; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Returns the columns as a 2-D array.
    #[inline]
    #[must_use]
    pub const fn to_cols_array_2d(self) -> [[f64; 4]; 4] {
        self.cols
    }

    /// Embeds a 2-D affine transform.
    #[must_use]
    pub fn from_affine(affine: Affine) -> Self {
        let [a, b, c, d, e, f] = affine.as_coeffs();
        Self {
            cols: [
                [a, b, 0.0, 0.0],
                [c, d, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [e, f, 0.0, 1.0],
            ],
        }
    }

    /// Returns the 2-D affine part if this transform has no perspective.
    #[must_use]
    pub fn to_affine(&self) -> Option<Affine> {
        let c = &self.cols;
        if c[0][3] != 0.0 || c[1][3] != 0.0 || c[3][3] != 1.0 {
            return None;
        }
        Some(Affine::new([c[0][0], c[0][1], c[1][0], c[1][1], c[3][0], c[3][1]]))
    }

    /// Maps a 2-D point, returning `None` if it projects behind the eye.
    #[must_use]
    pub fn map_point(&self, p: Point) -> Option<Point> {
        let c = &self.cols;
        let x = c[0][0] * p.x + c[1][0] * p.y + c[3][0];
        let y = c[0][1] * p.x + c[1][1] * p.y + c[3][1];
        let w = c[0][3] * p.x + c[1][3] * p.y + c[3][3];
        if w <= MIN_W {
            return None;
        }
        Some(Point::new(x / w, y / w))
    }

    /// Returns the axis-aligned bounds of a mapped rectangle.
    ///
    /// Returns `None` when any corner projects behind the eye, in which case
    /// the image of the rectangle is unbounded.
    #[must_use]
    pub fn map_rect_bbox(&self, rect: Rect) -> Option<Rect> {
        if let Some(affine) = self.to_affine() {
            return Some(affine.transform_rect_bbox(rect));
        }
        let corners = [
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x0, rect.y1),
            Point::new(rect.x1, rect.y1),
        ];
        let mut out: Option<Rect> = None;
        for corner in corners {
            let p = self.map_point(corner)?;
            out = Some(match out {
                Some(r) => r.union_pt(p),
                None => Rect::from_points(p, p),
            });
        }
        out
    }

    /// Is this transform [finite]?
    ///
    /// [finite]: f64::is_finite
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Affine> for Transform3d {
    fn from(affine: Affine) -> Self {
        Self::from_affine(affine)
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perspective(d: f64) -> Transform3d {
        // w = 1 + x / d
        let mut t = Transform3d::IDENTITY;
        t.cols[0][3] = 1.0 / d;
        t
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform3d::default(), Transform3d::IDENTITY);
    }

    #[test]
    fn affine_round_trip() {
        let a = Affine::new([2.0, 0.5, -0.5, 3.0, 10.0, 20.0]);
        let t = Transform3d::from_affine(a);
        assert_eq!(t.to_affine(), Some(a));
        assert_eq!(Transform3d::IDENTITY.to_affine(), Some(Affine::IDENTITY));
    }

    #[test]
    fn multiply_matches_affine_composition() {
        let a = Affine::translate((5.0, 6.0));
        let b = Affine::scale_non_uniform(2.0, 3.0);
        let t = Transform3d::from(a) * Transform3d::from(b);
        assert_eq!(t.to_affine(), Some(a * b));
    }

    #[test]
    fn map_rect_through_affine() {
        let t = Transform3d::from_affine(Affine::translate((10.0, 0.0)) * Affine::scale(2.0));
        assert_eq!(
            t.map_rect_bbox(Rect::new(0.0, 0.0, 5.0, 5.0)),
            Some(Rect::new(10.0, 0.0, 20.0, 10.0))
        );
    }

    #[test]
    fn perspective_has_no_affine_part() {
        assert_eq!(perspective(100.0).to_affine(), None);
    }

    #[test]
    fn perspective_divides_by_w() {
        let t = perspective(100.0);
        let p = t.map_point(Point::new(100.0, 50.0));
        assert_eq!(p, Some(Point::new(50.0, 25.0)));
    }

    #[test]
    fn points_behind_the_eye_are_unbounded() {
        let t = perspective(-10.0);
        assert_eq!(t.map_point(Point::new(20.0, 0.0)), None);
        assert_eq!(t.map_rect_bbox(Rect::new(0.0, 0.0, 20.0, 20.0)), None);
    }

    #[test]
    fn nan_is_not_finite() {
        let mut t = Transform3d::IDENTITY;
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
        assert!(Transform3d::IDENTITY.is_finite());
    }
}
