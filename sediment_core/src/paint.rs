// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-value paint attributes carried inline in records.
//!
//! Everything here is `Copy` and encodes to a `u32` discriminant (or a raw
//! `u32` in the case of [`Color`]). Decoding an out-of-range discriminant is
//! a writer bug and panics.

use core::fmt;

/// A non-premultiplied 32-bit ARGB color.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u32);

impl Color {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self(0x0000_0000);
    /// Opaque black.
    pub const BLACK: Self = Self(0xFF00_0000);
    /// Opaque white.
    pub const WHITE: Self = Self(0xFFFF_FFFF);

    /// Creates a color from its four 8-bit channels.
    #[inline]
    #[must_use]
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Returns the alpha channel.
    #[inline]
    #[must_use]
    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns this color with the alpha channel replaced.
    #[inline]
    #[must_use]
    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self((self.0 & 0x00FF_FFFF) | ((alpha as u32) << 24))
    }

    /// Whether the alpha channel is zero.
    #[inline]
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.alpha() == 0
    }

    /// Whether the alpha channel is 255.
    #[inline]
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        self.alpha() == 0xFF
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color(#{:08X})", self.0)
    }
}

/// Porter-Duff and separable blend modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendMode {
    /// Result is transparent.
    Clear = 0,
    /// Source replaces destination.
    Src = 1,
    /// Destination is kept.
    Dst = 2,
    /// Source over destination.
    #[default]
    SrcOver = 3,
    /// Destination over source.
    DstOver = 4,
    /// Source inside destination.
    SrcIn = 5,
    /// Destination inside source.
    DstIn = 6,
    /// Source outside destination.
    SrcOut = 7,
    /// Destination outside source.
    DstOut = 8,
    /// Source atop destination.
    SrcATop = 9,
    /// Destination atop source.
    DstATop = 10,
    /// Exclusive or.
    Xor = 11,
    /// Saturating add.
    Plus = 12,
    /// Component-wise multiply, alpha included.
    Modulate = 13,
    /// Screen.
    Screen = 14,
    /// Overlay.
    Overlay = 15,
    /// Darken.
    Darken = 16,
    /// Lighten.
    Lighten = 17,
    /// Multiply.
    Multiply = 18,
}

impl BlendMode {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Clear,
            1 => Self::Src,
            2 => Self::Dst,
            3 => Self::SrcOver,
            4 => Self::DstOver,
            5 => Self::SrcIn,
            6 => Self::DstIn,
            7 => Self::SrcOut,
            8 => Self::DstOut,
            9 => Self::SrcATop,
            10 => Self::DstATop,
            11 => Self::Xor,
            12 => Self::Plus,
            13 => Self::Modulate,
            14 => Self::Screen,
            15 => Self::Overlay,
            16 => Self::Darken,
            17 => Self::Lighten,
            18 => Self::Multiply,
            _ => panic!("invalid BlendMode discriminant {v}"),
        }
    }

    /// Whether blending any source onto a transparent-black destination
    /// always yields transparent black.
    ///
    /// With `Da = 0` these modes reduce to zero regardless of the source.
    #[must_use]
    pub const fn nops_on_transparent_dst(self) -> bool {
        matches!(
            self,
            Self::Clear | Self::Dst | Self::SrcIn | Self::DstIn | Self::DstOut | Self::Modulate
        )
    }
}

/// How geometry is filled or stroked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DrawStyle {
    /// Fill the interior.
    #[default]
    Fill = 0,
    /// Stroke the outline.
    Stroke = 1,
    /// Fill and then stroke.
    StrokeAndFill = 2,
}

impl DrawStyle {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Fill,
            1 => Self::Stroke,
            2 => Self::StrokeAndFill,
            _ => panic!("invalid DrawStyle discriminant {v}"),
        }
    }

    /// Whether this style strokes outlines.
    #[must_use]
    pub const fn strokes(self) -> bool {
        !matches!(self, Self::Fill)
    }
}

/// Style of a blur mask filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlurStyle {
    /// Blur inside and outside.
    #[default]
    Normal = 0,
    /// Solid inside, blurred outside.
    Solid = 1,
    /// Nothing inside, blurred outside.
    Outer = 2,
    /// Blurred inside, nothing outside.
    Inner = 3,
}

impl BlurStyle {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Solid,
            2 => Self::Outer,
            3 => Self::Inner,
            _ => panic!("invalid BlurStyle discriminant {v}"),
        }
    }
}

/// A blur mask filter, small enough to live inline in its record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskFilter {
    /// Blur style.
    pub style: BlurStyle,
    /// Gaussian standard deviation in local units.
    pub sigma: f64,
}

impl MaskFilter {
    /// How far the blur can spread outside the geometry.
    #[must_use]
    pub fn outset(&self) -> f64 {
        self.sigma.abs() * 3.0
    }
}

/// Whether a clip keeps the inside or the outside of its shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ClipOp {
    /// Keep the intersection with the shape.
    #[default]
    Intersect = 0,
    /// Remove the shape from the clip.
    Difference = 1,
}

impl ClipOp {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Intersect,
            1 => Self::Difference,
            _ => panic!("invalid ClipOp discriminant {v}"),
        }
    }
}

/// How a point list is interpreted by `draw_points`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PointMode {
    /// Each point is drawn individually.
    #[default]
    Points = 0,
    /// Pairs of points are drawn as separate segments.
    Lines = 1,
    /// Consecutive points are joined into an open polyline.
    Polygon = 2,
}

impl PointMode {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Points,
            1 => Self::Lines,
            2 => Self::Polygon,
            _ => panic!("invalid PointMode discriminant {v}"),
        }
    }
}

/// Image sampling quality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Sampling {
    /// Nearest-neighbor.
    #[default]
    Nearest = 0,
    /// Bilinear.
    Linear = 1,
    /// Bilinear with mipmaps.
    MipmapLinear = 2,
    /// Bicubic.
    Cubic = 3,
}

impl Sampling {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Nearest,
            1 => Self::Linear,
            2 => Self::MipmapLinear,
            3 => Self::Cubic,
            _ => panic!("invalid Sampling discriminant {v}"),
        }
    }
}

/// Whether `draw_image_rect` may sample outside its source rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SrcRectConstraint {
    /// Sampling stays strictly inside the source rectangle.
    Strict = 0,
    /// Sampling may bleed for speed.
    #[default]
    Fast = 1,
}

impl SrcRectConstraint {
    pub(crate) fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Strict,
            1 => Self::Fast,
            _ => panic!("invalid SrcRectConstraint discriminant {v}"),
        }
    }
}

/// How a vertex list is assembled into triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VertexMode {
    /// Every three vertices form a triangle.
    #[default]
    Triangles = 0,
    /// Each vertex after the second forms a triangle with the two before it.
    TriangleStrip = 1,
    /// Each vertex after the second forms a triangle with its predecessor
    /// and the first vertex.
    TriangleFan = 2,
}

/// A rotation-scale plus translation placing one atlas sprite.
///
/// Maps a sprite-local point `(x, y)` to
/// `(scos * x - ssin * y + tx, ssin * x + scos * y + ty)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RsTransform {
    /// Scale times cosine of the rotation.
    pub scos: f64,
    /// Scale times sine of the rotation.
    pub ssin: f64,
    /// Horizontal translation.
    pub tx: f64,
    /// Vertical translation.
    pub ty: f64,
}

impl RsTransform {
    /// A translation without rotation or scale.
    #[must_use]
    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self {
            scos: 1.0,
            ssin: 0.0,
            tx,
            ty,
        }
    }

    /// The equivalent affine transform.
    #[must_use]
    pub fn to_affine(self) -> kurbo::Affine {
        kurbo::Affine::new([self.scos, self.ssin, -self.ssin, self.scos, self.tx, self.ty])
    }

    /// Bounds of a `width` by `height` sprite placed by this transform.
    #[must_use]
    pub fn sprite_bounds(self, width: f64, height: f64) -> kurbo::Rect {
        self.to_affine()
            .transform_rect_bbox(kurbo::Rect::new(0.0, 0.0, width, height))
    }
}

pub(crate) fn cap_to_u32(cap: kurbo::Cap) -> u32 {
    match cap {
        kurbo::Cap::Butt => 0,
        kurbo::Cap::Square => 1,
        kurbo::Cap::Round => 2,
    }
}

pub(crate) fn cap_from_u32(v: u32) -> kurbo::Cap {
    match v {
        0 => kurbo::Cap::Butt,
        1 => kurbo::Cap::Square,
        2 => kurbo::Cap::Round,
        _ => panic!("invalid Cap discriminant {v}"),
    }
}

pub(crate) fn join_to_u32(join: kurbo::Join) -> u32 {
    match join {
        kurbo::Join::Bevel => 0,
        kurbo::Join::Miter => 1,
        kurbo::Join::Round => 2,
    }
}

pub(crate) fn join_from_u32(v: u32) -> kurbo::Join {
    match v {
        0 => kurbo::Join::Bevel,
        1 => kurbo::Join::Miter,
        2 => kurbo::Join::Round,
        _ => panic!("invalid Join discriminant {v}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_channels() {
        let c = Color::from_argb(0x80, 0x12, 0x34, 0x56);
        assert_eq!(c.0, 0x8012_3456);
        assert_eq!(c.alpha(), 0x80);
        assert!(!c.is_transparent());
        assert!(!c.is_opaque());
        assert!(c.with_alpha(0).is_transparent());
        assert!(c.with_alpha(0xFF).is_opaque());
    }

    #[test]
    fn blend_mode_discriminants_are_stable() {
        for v in 0..=18 {
            assert_eq!(BlendMode::from_u32(v) as u32, v);
        }
    }

    #[test]
    #[should_panic(expected = "invalid BlendMode discriminant")]
    fn unknown_blend_mode_panics() {
        let _ = BlendMode::from_u32(99);
    }

    #[test]
    fn transparent_dst_nops() {
        assert!(BlendMode::Clear.nops_on_transparent_dst());
        assert!(BlendMode::DstIn.nops_on_transparent_dst());
        assert!(!BlendMode::SrcOver.nops_on_transparent_dst());
        assert!(!BlendMode::Src.nops_on_transparent_dst());
        assert!(!BlendMode::Multiply.nops_on_transparent_dst());
    }

    #[test]
    fn rs_transform_places_sprites() {
        let shift = RsTransform::translate(10.0, 20.0);
        assert_eq!(
            shift.sprite_bounds(4.0, 2.0),
            kurbo::Rect::new(10.0, 20.0, 14.0, 22.0)
        );
        // A quarter turn at twice the size.
        let turn = RsTransform {
            scos: 0.0,
            ssin: 2.0,
            tx: 0.0,
            ty: 0.0,
        };
        assert_eq!(
            turn.sprite_bounds(4.0, 2.0),
            kurbo::Rect::new(-4.0, 0.0, 0.0, 8.0)
        );
    }

    #[test]
    fn stroke_styles() {
        assert!(!DrawStyle::Fill.strokes());
        assert!(DrawStyle::Stroke.strokes());
        assert!(DrawStyle::StrokeAndFill.strokes());
    }
}
