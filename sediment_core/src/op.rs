// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed catalog of operation records.
//!
//! A record is a one-byte [`OpType`] discriminant followed by a packed
//! payload. Payloads are `#[repr(C)]` [`Pod`] structs written with
//! [`bytemuck::bytes_of`] and read back with
//! [`bytemuck::pod_read_unaligned`], so records need no alignment and the
//! buffer can be walked byte by byte.
//!
//! Payloads that own a shared resource store its slot index in the store's
//! resource table as their *first* field. Disposal relies on this: the slot
//! of any owning record sits at bytes `1..5`.
//!
//! ```text
//!   offset   0      1            1 + payload_len
//!            ┌──────┬────────────┐
//!            │ tag  │  payload   │  next record ...
//!            └──────┴────────────┘
//! ```
//!
//! [`OpType::DrawPoints`] and the two atlas kinds are variable-length: a
//! points header is followed by `count` points of two `f64` each, and an
//! atlas header by `count` sprite transforms, `count` texture rects and,
//! when flagged, `count` packed colors.

use alloc::sync::Arc;
use core::fmt;
use core::mem::size_of;

use bytemuck::{Pod, Zeroable};
use kurbo::{
    Affine, BezPath, Cap, Join, Point, Rect, RoundedRect, RoundedRectRadii, Vec2,
};

use crate::options::SaveLayerOptions;
use crate::paint::{
    BlendMode, BlurStyle, ClipOp, Color, DrawStyle, MaskFilter, PointMode, RsTransform,
    Sampling, SrcRectConstraint, cap_from_u32, join_from_u32,
};
use crate::recording::Recording;
use crate::resource::{
    ColorFilter, ColorSource, Image, ImageFilter, PathEffect, Resource, TextBlob, Vertices,
};
use crate::storage::{RawRecord, Storage};
use crate::transform::Transform3d;

// ---------------------------------------------------------------------------
// OpType / OpCategory
// ---------------------------------------------------------------------------

/// Broad grouping of operation kinds.
///
/// The dispatcher's culling policy is keyed on the category: state records
/// ([`Attribute`](Self::Attribute), [`Transform`](Self::Transform),
/// [`Clip`](Self::Clip)) are always visited, while
/// [`Draw`](Self::Draw) and [`Composite`](Self::Composite) records may be
/// skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCategory {
    /// Sets one rendering attribute.
    Attribute,
    /// Pushes or pops a save level.
    SaveRestore,
    /// Concatenates or resets the current transform.
    Transform,
    /// Narrows the current clip.
    Clip,
    /// Renders a primitive.
    Draw,
    /// Renders another recording.
    Composite,
}

/// Discriminant of an operation record.
///
/// Values are fixed; adding a kind changes the in-memory format, which is
/// never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[expect(missing_docs, reason = "each variant names the receiver method it maps to")]
pub enum OpType {
    SetAntiAlias = 0,
    SetDither = 1,
    SetInvertColors = 2,
    SetStrokeCap = 3,
    SetStrokeJoin = 4,
    SetStyle = 5,
    SetStrokeWidth = 6,
    SetStrokeMiter = 7,
    SetColor = 8,
    SetBlendMode = 9,
    SetMaskFilter = 10,
    ClearMaskFilter = 11,
    SetColorFilter = 12,
    ClearColorFilter = 13,
    SetImageFilter = 14,
    ClearImageFilter = 15,
    SetColorSource = 16,
    ClearColorSource = 17,
    SetPathEffect = 18,
    ClearPathEffect = 19,

    Save = 20,
    SaveLayer = 21,
    SaveLayerBackdrop = 22,
    Restore = 23,

    Translate = 24,
    Scale = 25,
    Rotate = 26,
    Skew = 27,
    Transform2DAffine = 28,
    TransformFullPerspective = 29,
    TransformReset = 30,

    ClipRect = 31,
    ClipRoundedRect = 32,
    ClipPath = 33,

    DrawPaint = 34,
    DrawColor = 35,
    DrawLine = 36,
    DrawRect = 37,
    DrawOval = 38,
    DrawCircle = 39,
    DrawRoundedRect = 40,
    DrawDoubleRoundedRect = 41,
    DrawArc = 42,
    DrawPath = 43,
    DrawPoints = 44,
    DrawVertices = 45,
    DrawImage = 46,
    DrawImageRect = 47,
    DrawImageNine = 48,
    DrawAtlas = 49,
    DrawAtlasCulled = 50,
    DrawTextBlob = 51,
    DrawShadow = 52,

    DrawDisplayList = 53,
}

impl OpType {
    /// Every kind, in discriminant order.
    pub const ALL: [Self; 54] = [
        Self::SetAntiAlias,
        Self::SetDither,
        Self::SetInvertColors,
        Self::SetStrokeCap,
        Self::SetStrokeJoin,
        Self::SetStyle,
        Self::SetStrokeWidth,
        Self::SetStrokeMiter,
        Self::SetColor,
        Self::SetBlendMode,
        Self::SetMaskFilter,
        Self::ClearMaskFilter,
        Self::SetColorFilter,
        Self::ClearColorFilter,
        Self::SetImageFilter,
        Self::ClearImageFilter,
        Self::SetColorSource,
        Self::ClearColorSource,
        Self::SetPathEffect,
        Self::ClearPathEffect,
        Self::Save,
        Self::SaveLayer,
        Self::SaveLayerBackdrop,
        Self::Restore,
        Self::Translate,
        Self::Scale,
        Self::Rotate,
        Self::Skew,
        Self::Transform2DAffine,
        Self::TransformFullPerspective,
        Self::TransformReset,
        Self::ClipRect,
        Self::ClipRoundedRect,
        Self::ClipPath,
        Self::DrawPaint,
        Self::DrawColor,
        Self::DrawLine,
        Self::DrawRect,
        Self::DrawOval,
        Self::DrawCircle,
        Self::DrawRoundedRect,
        Self::DrawDoubleRoundedRect,
        Self::DrawArc,
        Self::DrawPath,
        Self::DrawPoints,
        Self::DrawVertices,
        Self::DrawImage,
        Self::DrawImageRect,
        Self::DrawImageNine,
        Self::DrawAtlas,
        Self::DrawAtlasCulled,
        Self::DrawTextBlob,
        Self::DrawShadow,
        Self::DrawDisplayList,
    ];

    /// Looks up a discriminant, returning `None` for unknown values.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// The category this kind belongs to.
    #[must_use]
    pub const fn category(self) -> OpCategory {
        match self as u8 {
            0..=19 => OpCategory::Attribute,
            20..=23 => OpCategory::SaveRestore,
            24..=30 => OpCategory::Transform,
            31..=33 => OpCategory::Clip,
            34..=52 => OpCategory::Draw,
            _ => OpCategory::Composite,
        }
    }

    /// Whether records of this kind may be skipped by culled dispatch.
    #[must_use]
    pub const fn is_cullable(self) -> bool {
        matches!(self.category(), OpCategory::Draw | OpCategory::Composite)
    }

    /// Whether this kind opens a save block closed by a [`Restore`](Self::Restore).
    #[must_use]
    pub const fn is_save(self) -> bool {
        matches!(
            self,
            Self::Save | Self::SaveLayer | Self::SaveLayerBackdrop
        )
    }

    /// Whether the payload's first field is a resource slot.
    #[must_use]
    pub(crate) const fn owns_resource(self) -> bool {
        matches!(
            self,
            Self::SetColorFilter
                | Self::SetImageFilter
                | Self::SetColorSource
                | Self::SetPathEffect
                | Self::SaveLayerBackdrop
                | Self::ClipPath
                | Self::DrawPath
                | Self::DrawVertices
                | Self::DrawImage
                | Self::DrawImageRect
                | Self::DrawImageNine
                | Self::DrawAtlas
                | Self::DrawAtlasCulled
                | Self::DrawTextBlob
                | Self::DrawShadow
                | Self::DrawDisplayList
        )
    }

    /// Length of the fixed part of the payload.
    ///
    /// For the variable-length kinds this is the header only.
    #[must_use]
    pub const fn payload_len(self) -> usize {
        match self {
            Self::SetAntiAlias | Self::SetDither | Self::SetInvertColors => {
                size_of::<BoolPayload>()
            }
            Self::SetStrokeCap
            | Self::SetStrokeJoin
            | Self::SetStyle
            | Self::SetColor
            | Self::SetBlendMode => size_of::<U32Payload>(),
            Self::SetStrokeWidth | Self::SetStrokeMiter | Self::Rotate => {
                size_of::<ScalarPayload>()
            }
            Self::SetMaskFilter => size_of::<MaskFilterPayload>(),
            Self::SetColorFilter
            | Self::SetImageFilter
            | Self::SetColorSource
            | Self::SetPathEffect
            | Self::DrawPath => size_of::<SlotPayload>(),
            Self::ClearMaskFilter
            | Self::ClearColorFilter
            | Self::ClearImageFilter
            | Self::ClearColorSource
            | Self::ClearPathEffect
            | Self::Restore
            | Self::TransformReset
            | Self::DrawPaint => 0,
            Self::Save => size_of::<SavePayload>(),
            Self::SaveLayer => size_of::<SaveLayerPayload>(),
            Self::SaveLayerBackdrop => size_of::<SaveLayerBackdropPayload>(),
            Self::Translate | Self::Scale | Self::Skew => size_of::<PairPayload>(),
            Self::Transform2DAffine => size_of::<AffinePayload>(),
            Self::TransformFullPerspective => size_of::<PerspectivePayload>(),
            Self::ClipRect => size_of::<ClipRectPayload>(),
            Self::ClipRoundedRect => size_of::<ClipRoundedRectPayload>(),
            Self::ClipPath => size_of::<ClipPathPayload>(),
            Self::DrawColor => size_of::<DrawColorPayload>(),
            Self::DrawLine => size_of::<LinePayload>(),
            Self::DrawRect | Self::DrawOval => size_of::<RectPayload>(),
            Self::DrawCircle => size_of::<CirclePayload>(),
            Self::DrawRoundedRect => size_of::<RoundedRectPayload>(),
            Self::DrawDoubleRoundedRect => size_of::<DoubleRoundedRectPayload>(),
            Self::DrawArc => size_of::<ArcPayload>(),
            Self::DrawPoints => size_of::<PointsHeader>(),
            Self::DrawVertices => size_of::<VerticesPayload>(),
            Self::DrawImage => size_of::<ImagePayload>(),
            Self::DrawImageRect => size_of::<ImageRectPayload>(),
            Self::DrawImageNine => size_of::<ImageNinePayload>(),
            Self::DrawAtlas => size_of::<AtlasHeader>(),
            Self::DrawAtlasCulled => size_of::<AtlasCulledHeader>(),
            Self::DrawTextBlob => size_of::<TextBlobPayload>(),
            Self::DrawShadow => size_of::<ShadowPayload>(),
            Self::DrawDisplayList => size_of::<DisplayListPayload>(),
        }
    }

    /// Total byte length of the record starting at `record[0]`.
    ///
    /// Only the discriminant and, for variable-length kinds, the header are
    /// read.
    ///
    /// # Panics
    ///
    /// Panics if `record` is too short to hold the header.
    #[must_use]
    pub fn record_len(self, record: &[u8]) -> usize {
        let fixed = 1 + self.payload_len();
        match self {
            Self::DrawPoints => {
                let header: PointsHeader = read(&record[1..fixed]);
                fixed + header.count as usize * POINT_LEN
            }
            Self::DrawAtlas | Self::DrawAtlasCulled => {
                // Both headers lead with the shared atlas header.
                let header: AtlasHeader = read(&record[1..]);
                fixed + header.sprites_len()
            }
            _ => fixed,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

pub(crate) const POINT_LEN: usize = size_of::<[f64; 2]>();

pub(crate) const SAVE_HAS_ATTRIBUTES: u32 = 1 << 0;
pub(crate) const SAVE_HAS_BOUNDS: u32 = 1 << 1;

pub(crate) const ATLAS_WITH_ATTRIBUTES: u32 = 1 << 0;
pub(crate) const ATLAS_HAS_COLORS: u32 = 1 << 1;

pub(crate) const SPRITE_TRANSFORM_LEN: usize = size_of::<[f64; 4]>();
pub(crate) const SPRITE_RECT_LEN: usize = size_of::<[f64; 4]>();
pub(crate) const SPRITE_COLOR_LEN: usize = size_of::<u32>();

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct BoolPayload {
    pub(crate) value: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct U32Payload {
    pub(crate) value: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ScalarPayload {
    pub(crate) value: f64,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct MaskFilterPayload {
    pub(crate) sigma: f64,
    pub(crate) style: u32,
    pub(crate) _pad: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct SlotPayload {
    pub(crate) slot: u32,
}

/// Shared head of every save-family payload once decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    /// Byte offset of the matching restore record.
    pub(crate) restore_offset: u32,
    /// Op index of the matching restore record.
    pub(crate) restore_index: u32,
    pub(crate) flags: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct SavePayload {
    pub(crate) restore_offset: u32,
    pub(crate) restore_index: u32,
    pub(crate) flags: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct SaveLayerPayload {
    pub(crate) restore_offset: u32,
    pub(crate) restore_index: u32,
    pub(crate) flags: u32,
    pub(crate) options: u32,
    pub(crate) bounds: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct SaveLayerBackdropPayload {
    pub(crate) slot: u32,
    pub(crate) restore_offset: u32,
    pub(crate) restore_index: u32,
    pub(crate) flags: u32,
    pub(crate) options: u32,
    pub(crate) _pad: u32,
    pub(crate) bounds: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct PairPayload {
    pub(crate) x: f64,
    pub(crate) y: f64,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct AffinePayload {
    pub(crate) coeffs: [f64; 6],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct PerspectivePayload {
    pub(crate) cols: [[f64; 4]; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ClipRectPayload {
    pub(crate) rect: [f64; 4],
    pub(crate) op: u32,
    pub(crate) anti_alias: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ClipRoundedRectPayload {
    pub(crate) rrect: RoundedRectPayload,
    pub(crate) op: u32,
    pub(crate) anti_alias: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ClipPathPayload {
    pub(crate) slot: u32,
    pub(crate) op: u32,
    pub(crate) anti_alias: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct DrawColorPayload {
    pub(crate) color: u32,
    pub(crate) mode: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct LinePayload {
    pub(crate) p0: [f64; 2],
    pub(crate) p1: [f64; 2],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct RectPayload {
    pub(crate) rect: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct CirclePayload {
    pub(crate) center: [f64; 2],
    pub(crate) radius: f64,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct RoundedRectPayload {
    pub(crate) rect: [f64; 4],
    /// Top-left, top-right, bottom-right, bottom-left.
    pub(crate) radii: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct DoubleRoundedRectPayload {
    pub(crate) outer: RoundedRectPayload,
    pub(crate) inner: RoundedRectPayload,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ArcPayload {
    pub(crate) oval: [f64; 4],
    pub(crate) start_degrees: f64,
    pub(crate) sweep_degrees: f64,
    pub(crate) use_center: u32,
    pub(crate) _pad: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct PointsHeader {
    pub(crate) mode: u32,
    pub(crate) count: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct VerticesPayload {
    pub(crate) slot: u32,
    pub(crate) mode: u32,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ImagePayload {
    pub(crate) slot: u32,
    pub(crate) sampling: u32,
    pub(crate) with_attributes: u32,
    pub(crate) _pad: u32,
    pub(crate) point: [f64; 2],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ImageRectPayload {
    pub(crate) slot: u32,
    pub(crate) sampling: u32,
    pub(crate) with_attributes: u32,
    pub(crate) constraint: u32,
    pub(crate) src: [f64; 4],
    pub(crate) dst: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ImageNinePayload {
    pub(crate) slot: u32,
    pub(crate) filter: u32,
    pub(crate) with_attributes: u32,
    pub(crate) _pad: u32,
    pub(crate) center: [f64; 4],
    pub(crate) dst: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct AtlasHeader {
    pub(crate) slot: u32,
    pub(crate) count: u32,
    pub(crate) mode: u32,
    pub(crate) sampling: u32,
    pub(crate) flags: u32,
    pub(crate) _pad: u32,
}

impl AtlasHeader {
    /// Bytes of sprite data following the header.
    pub(crate) fn sprites_len(&self) -> usize {
        self.count as usize * sprite_len(self.flags & ATLAS_HAS_COLORS != 0)
    }
}

/// Bytes each sprite occupies after an atlas header.
pub(crate) const fn sprite_len(has_colors: bool) -> usize {
    let color = if has_colors { SPRITE_COLOR_LEN } else { 0 };
    SPRITE_TRANSFORM_LEN + SPRITE_RECT_LEN + color
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct AtlasCulledHeader {
    pub(crate) header: AtlasHeader,
    pub(crate) cull_rect: [f64; 4],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct TextBlobPayload {
    pub(crate) slot: u32,
    pub(crate) _pad: u32,
    pub(crate) origin: [f64; 2],
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct ShadowPayload {
    pub(crate) slot: u32,
    pub(crate) color: u32,
    pub(crate) transparent_occluder: u32,
    pub(crate) _pad: u32,
    pub(crate) elevation: f64,
    pub(crate) dpr: f64,
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub(crate) struct DisplayListPayload {
    pub(crate) slot: u32,
    pub(crate) _pad: u32,
    pub(crate) opacity: f64,
}

// -- conversion helpers ------------------------------------------------------

#[inline]
pub(crate) fn read<P: Pod>(bytes: &[u8]) -> P {
    bytemuck::pod_read_unaligned(&bytes[..size_of::<P>()])
}

#[inline]
pub(crate) const fn rect_to_array(r: Rect) -> [f64; 4] {
    [r.x0, r.y0, r.x1, r.y1]
}

#[inline]
pub(crate) const fn rect_from_array(a: [f64; 4]) -> Rect {
    Rect::new(a[0], a[1], a[2], a[3])
}

#[inline]
pub(crate) const fn point_to_array(p: Point) -> [f64; 2] {
    [p.x, p.y]
}

#[inline]
pub(crate) const fn point_from_array(a: [f64; 2]) -> Point {
    Point::new(a[0], a[1])
}

impl From<RoundedRect> for RoundedRectPayload {
    fn from(rr: RoundedRect) -> Self {
        let r = rr.radii();
        Self {
            rect: rect_to_array(rr.rect()),
            radii: [r.top_left, r.top_right, r.bottom_right, r.bottom_left],
        }
    }
}

impl From<RoundedRectPayload> for RoundedRect {
    fn from(p: RoundedRectPayload) -> Self {
        let [tl, tr, br, bl] = p.radii;
        Self::from_rect(rect_from_array(p.rect), RoundedRectRadii::new(tl, tr, br, bl))
    }
}

/// Decodes the block header of a save-family record.
///
/// # Panics
///
/// Panics if `record` is not a save-family record.
pub(crate) fn block_header(record: &RawRecord<'_>) -> BlockHeader {
    let payload = record.payload();
    match record.op_type() {
        OpType::Save => {
            let p: SavePayload = read(payload);
            BlockHeader {
                restore_offset: p.restore_offset,
                restore_index: p.restore_index,
                flags: p.flags,
            }
        }
        OpType::SaveLayer => {
            let p: SaveLayerPayload = read(payload);
            BlockHeader {
                restore_offset: p.restore_offset,
                restore_index: p.restore_index,
                flags: p.flags,
            }
        }
        OpType::SaveLayerBackdrop => {
            let p: SaveLayerBackdropPayload = read(payload);
            BlockHeader {
                restore_offset: p.restore_offset,
                restore_index: p.restore_index,
                flags: p.flags,
            }
        }
        other => panic!("{other:?} does not open a save block"),
    }
}

// ---------------------------------------------------------------------------
// PointsView
// ---------------------------------------------------------------------------

/// A borrowed, unaligned list of points inside a record.
#[derive(Clone, Copy)]
pub struct PointsView<'a> {
    bytes: &'a [u8],
}

impl<'a> PointsView<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len() % POINT_LEN, 0, "point bytes are not whole points");
        Self { bytes }
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / POINT_LEN
    }

    /// Whether there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the point at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Point> {
        let start = index.checked_mul(POINT_LEN)?;
        let chunk = self.bytes.get(start..start + POINT_LEN)?;
        Some(point_from_array(read(chunk)))
    }

    /// Iterates the points in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Point> + 'a {
        self.bytes
            .chunks_exact(POINT_LEN)
            .map(|chunk| point_from_array(read(chunk)))
    }
}

impl PartialEq for PointsView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl fmt::Debug for PointsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// AtlasSprites
// ---------------------------------------------------------------------------

/// The borrowed, unaligned sprite list of an atlas record.
#[derive(Clone, Copy)]
pub struct AtlasSprites<'a> {
    transforms: &'a [u8],
    texture_rects: &'a [u8],
    colors: Option<&'a [u8]>,
}

impl<'a> AtlasSprites<'a> {
    /// Splits the bytes after an atlas header.
    fn new(bytes: &'a [u8], count: usize, has_colors: bool) -> Self {
        let (transforms, rest) = bytes.split_at(count * SPRITE_TRANSFORM_LEN);
        let (texture_rects, rest) = rest.split_at(count * SPRITE_RECT_LEN);
        Self {
            transforms,
            texture_rects,
            colors: has_colors.then(|| &rest[..count * SPRITE_COLOR_LEN]),
        }
    }

    /// Number of sprites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len() / SPRITE_TRANSFORM_LEN
    }

    /// Whether there are no sprites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Placement of each sprite.
    pub fn transforms(&self) -> impl ExactSizeIterator<Item = RsTransform> + 'a {
        self.transforms.chunks_exact(SPRITE_TRANSFORM_LEN).map(|chunk| {
            let [scos, ssin, tx, ty]: [f64; 4] = read(chunk);
            RsTransform { scos, ssin, tx, ty }
        })
    }

    /// Source rect of each sprite within the atlas image.
    pub fn texture_rects(&self) -> impl ExactSizeIterator<Item = Rect> + 'a {
        self.texture_rects
            .chunks_exact(SPRITE_RECT_LEN)
            .map(|chunk| rect_from_array(read(chunk)))
    }

    /// Per-sprite colors, when the record carries them.
    pub fn colors(&self) -> Option<impl ExactSizeIterator<Item = Color> + 'a> {
        self.colors.map(|bytes| {
            bytes
                .chunks_exact(SPRITE_COLOR_LEN)
                .map(|chunk| Color(read(chunk)))
        })
    }
}

impl PartialEq for AtlasSprites<'_> {
    fn eq(&self, other: &Self) -> bool {
        let colors_eq = match (self.colors(), other.colors()) {
            (Some(a), Some(b)) => a.eq(b),
            (None, None) => true,
            _ => false,
        };
        self.len() == other.len()
            && self.transforms().eq(other.transforms())
            && self.texture_rects().eq(other.texture_rects())
            && colors_eq
    }
}

impl fmt::Debug for AtlasSprites<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        match self.colors() {
            Some(colors) => list.entries(self.transforms().zip(self.texture_rects()).zip(colors)),
            None => list.entries(self.transforms().zip(self.texture_rects())),
        };
        list.finish()
    }
}

// ---------------------------------------------------------------------------
// Op
// ---------------------------------------------------------------------------

/// A decoded operation record.
///
/// Resources are borrowed from the owning recording; variable-length data is
/// borrowed from its buffer. Equality compares resources by content, so two
/// independently built recordings with the same content decode to equal ops.
#[derive(Clone, Debug, PartialEq)]
#[expect(missing_docs, reason = "fields mirror the matching OpReceiver method")]
pub enum Op<'a> {
    SetAntiAlias(bool),
    SetDither(bool),
    SetInvertColors(bool),
    SetStrokeCap(Cap),
    SetStrokeJoin(Join),
    SetStyle(DrawStyle),
    SetStrokeWidth(f64),
    SetStrokeMiter(f64),
    SetColor(Color),
    SetBlendMode(BlendMode),
    SetMaskFilter(MaskFilter),
    ClearMaskFilter,
    SetColorFilter(&'a Arc<ColorFilter>),
    ClearColorFilter,
    SetImageFilter(&'a Arc<ImageFilter>),
    ClearImageFilter,
    SetColorSource(&'a Arc<ColorSource>),
    ClearColorSource,
    SetPathEffect(&'a Arc<PathEffect>),
    ClearPathEffect,

    Save,
    SaveLayer {
        bounds: Option<Rect>,
        options: SaveLayerOptions,
    },
    SaveLayerBackdrop {
        bounds: Option<Rect>,
        options: SaveLayerOptions,
        backdrop: &'a Arc<ImageFilter>,
    },
    Restore,

    Translate(Vec2),
    Scale {
        sx: f64,
        sy: f64,
    },
    Rotate {
        degrees: f64,
    },
    Skew {
        sx: f64,
        sy: f64,
    },
    Transform2DAffine(Affine),
    TransformFullPerspective(Transform3d),
    TransformReset,

    ClipRect {
        rect: Rect,
        op: ClipOp,
        anti_alias: bool,
    },
    ClipRoundedRect {
        rrect: RoundedRect,
        op: ClipOp,
        anti_alias: bool,
    },
    ClipPath {
        path: &'a Arc<BezPath>,
        op: ClipOp,
        anti_alias: bool,
    },

    DrawPaint,
    DrawColor {
        color: Color,
        mode: BlendMode,
    },
    DrawLine {
        p0: Point,
        p1: Point,
    },
    DrawRect(Rect),
    DrawOval(Rect),
    DrawCircle {
        center: Point,
        radius: f64,
    },
    DrawRoundedRect(RoundedRect),
    DrawDoubleRoundedRect {
        outer: RoundedRect,
        inner: RoundedRect,
    },
    DrawArc {
        oval: Rect,
        start_degrees: f64,
        sweep_degrees: f64,
        use_center: bool,
    },
    DrawPath(&'a Arc<BezPath>),
    DrawPoints {
        mode: PointMode,
        points: PointsView<'a>,
    },
    DrawVertices {
        vertices: &'a Arc<Vertices>,
        mode: BlendMode,
    },
    DrawImage {
        image: &'a Arc<Image>,
        point: Point,
        sampling: Sampling,
        with_attributes: bool,
    },
    DrawImageRect {
        image: &'a Arc<Image>,
        src: Rect,
        dst: Rect,
        sampling: Sampling,
        with_attributes: bool,
        constraint: SrcRectConstraint,
    },
    DrawImageNine {
        image: &'a Arc<Image>,
        center: Rect,
        dst: Rect,
        filter: Sampling,
        with_attributes: bool,
    },
    /// Decodes from [`OpType::DrawAtlasCulled`] when `cull_rect` is set.
    DrawAtlas {
        atlas: &'a Arc<Image>,
        sprites: AtlasSprites<'a>,
        mode: BlendMode,
        sampling: Sampling,
        cull_rect: Option<Rect>,
        with_attributes: bool,
    },
    DrawTextBlob {
        blob: &'a Arc<TextBlob>,
        origin: Point,
    },
    DrawShadow {
        path: &'a Arc<BezPath>,
        color: Color,
        elevation: f64,
        transparent_occluder: bool,
        dpr: f64,
    },

    DrawDisplayList {
        recording: &'a Arc<Recording>,
        opacity: f64,
    },
}

impl<'a> Op<'a> {
    /// Decodes one record, resolving resource slots against `storage`.
    ///
    /// # Panics
    ///
    /// Panics if a slot is released or holds a resource of the wrong kind;
    /// both mean the writer broke the record format.
    pub(crate) fn decode(record: &RawRecord<'a>, storage: &'a Storage) -> Self {
        let p = record.payload();
        match record.op_type() {
            OpType::SetAntiAlias => Self::SetAntiAlias(read::<BoolPayload>(p).value != 0),
            OpType::SetDither => Self::SetDither(read::<BoolPayload>(p).value != 0),
            OpType::SetInvertColors => Self::SetInvertColors(read::<BoolPayload>(p).value != 0),
            OpType::SetStrokeCap => Self::SetStrokeCap(cap_from_u32(read::<U32Payload>(p).value)),
            OpType::SetStrokeJoin => {
                Self::SetStrokeJoin(join_from_u32(read::<U32Payload>(p).value))
            }
            OpType::SetStyle => Self::SetStyle(DrawStyle::from_u32(read::<U32Payload>(p).value)),
            OpType::SetStrokeWidth => Self::SetStrokeWidth(read::<ScalarPayload>(p).value),
            OpType::SetStrokeMiter => Self::SetStrokeMiter(read::<ScalarPayload>(p).value),
            OpType::SetColor => Self::SetColor(Color(read::<U32Payload>(p).value)),
            OpType::SetBlendMode => {
                Self::SetBlendMode(BlendMode::from_u32(read::<U32Payload>(p).value))
            }
            OpType::SetMaskFilter => {
                let m: MaskFilterPayload = read(p);
                Self::SetMaskFilter(MaskFilter {
                    style: BlurStyle::from_u32(m.style),
                    sigma: m.sigma,
                })
            }
            OpType::ClearMaskFilter => Self::ClearMaskFilter,
            OpType::SetColorFilter => {
                Self::SetColorFilter(color_filter(storage, read::<SlotPayload>(p).slot))
            }
            OpType::ClearColorFilter => Self::ClearColorFilter,
            OpType::SetImageFilter => {
                Self::SetImageFilter(image_filter(storage, read::<SlotPayload>(p).slot))
            }
            OpType::ClearImageFilter => Self::ClearImageFilter,
            OpType::SetColorSource => {
                Self::SetColorSource(color_source(storage, read::<SlotPayload>(p).slot))
            }
            OpType::ClearColorSource => Self::ClearColorSource,
            OpType::SetPathEffect => {
                Self::SetPathEffect(path_effect(storage, read::<SlotPayload>(p).slot))
            }
            OpType::ClearPathEffect => Self::ClearPathEffect,

            OpType::Save => Self::Save,
            OpType::SaveLayer => {
                let s: SaveLayerPayload = read(p);
                Self::SaveLayer {
                    bounds: layer_bounds(s.flags, s.bounds),
                    options: SaveLayerOptions::from_bits(s.options),
                }
            }
            OpType::SaveLayerBackdrop => {
                let s: SaveLayerBackdropPayload = read(p);
                Self::SaveLayerBackdrop {
                    bounds: layer_bounds(s.flags, s.bounds),
                    options: SaveLayerOptions::from_bits(s.options),
                    backdrop: image_filter(storage, s.slot),
                }
            }
            OpType::Restore => Self::Restore,

            OpType::Translate => {
                let t: PairPayload = read(p);
                Self::Translate(Vec2::new(t.x, t.y))
            }
            OpType::Scale => {
                let t: PairPayload = read(p);
                Self::Scale { sx: t.x, sy: t.y }
            }
            OpType::Rotate => Self::Rotate {
                degrees: read::<ScalarPayload>(p).value,
            },
            OpType::Skew => {
                let t: PairPayload = read(p);
                Self::Skew { sx: t.x, sy: t.y }
            }
            OpType::Transform2DAffine => {
                Self::Transform2DAffine(Affine::new(read::<AffinePayload>(p).coeffs))
            }
            OpType::TransformFullPerspective => Self::TransformFullPerspective(
                Transform3d::from_cols_array_2d(read::<PerspectivePayload>(p).cols),
            ),
            OpType::TransformReset => Self::TransformReset,

            OpType::ClipRect => {
                let c: ClipRectPayload = read(p);
                Self::ClipRect {
                    rect: rect_from_array(c.rect),
                    op: ClipOp::from_u32(c.op),
                    anti_alias: c.anti_alias != 0,
                }
            }
            OpType::ClipRoundedRect => {
                let c: ClipRoundedRectPayload = read(p);
                Self::ClipRoundedRect {
                    rrect: c.rrect.into(),
                    op: ClipOp::from_u32(c.op),
                    anti_alias: c.anti_alias != 0,
                }
            }
            OpType::ClipPath => {
                let c: ClipPathPayload = read(p);
                Self::ClipPath {
                    path: path(storage, c.slot),
                    op: ClipOp::from_u32(c.op),
                    anti_alias: c.anti_alias != 0,
                }
            }

            OpType::DrawPaint => Self::DrawPaint,
            OpType::DrawColor => {
                let d: DrawColorPayload = read(p);
                Self::DrawColor {
                    color: Color(d.color),
                    mode: BlendMode::from_u32(d.mode),
                }
            }
            OpType::DrawLine => {
                let d: LinePayload = read(p);
                Self::DrawLine {
                    p0: point_from_array(d.p0),
                    p1: point_from_array(d.p1),
                }
            }
            OpType::DrawRect => Self::DrawRect(rect_from_array(read::<RectPayload>(p).rect)),
            OpType::DrawOval => Self::DrawOval(rect_from_array(read::<RectPayload>(p).rect)),
            OpType::DrawCircle => {
                let d: CirclePayload = read(p);
                Self::DrawCircle {
                    center: point_from_array(d.center),
                    radius: d.radius,
                }
            }
            OpType::DrawRoundedRect => {
                Self::DrawRoundedRect(read::<RoundedRectPayload>(p).into())
            }
            OpType::DrawDoubleRoundedRect => {
                let d: DoubleRoundedRectPayload = read(p);
                Self::DrawDoubleRoundedRect {
                    outer: d.outer.into(),
                    inner: d.inner.into(),
                }
            }
            OpType::DrawArc => {
                let d: ArcPayload = read(p);
                Self::DrawArc {
                    oval: rect_from_array(d.oval),
                    start_degrees: d.start_degrees,
                    sweep_degrees: d.sweep_degrees,
                    use_center: d.use_center != 0,
                }
            }
            OpType::DrawPath => Self::DrawPath(path(storage, read::<SlotPayload>(p).slot)),
            OpType::DrawPoints => {
                let header_len = size_of::<PointsHeader>();
                let h: PointsHeader = read(p);
                Self::DrawPoints {
                    mode: PointMode::from_u32(h.mode),
                    points: PointsView::new(&p[header_len..]),
                }
            }
            OpType::DrawVertices => {
                let d: VerticesPayload = read(p);
                Self::DrawVertices {
                    vertices: vertices(storage, d.slot),
                    mode: BlendMode::from_u32(d.mode),
                }
            }
            OpType::DrawImage => {
                let d: ImagePayload = read(p);
                Self::DrawImage {
                    image: image(storage, d.slot),
                    point: point_from_array(d.point),
                    sampling: Sampling::from_u32(d.sampling),
                    with_attributes: d.with_attributes != 0,
                }
            }
            OpType::DrawImageRect => {
                let d: ImageRectPayload = read(p);
                Self::DrawImageRect {
                    image: image(storage, d.slot),
                    src: rect_from_array(d.src),
                    dst: rect_from_array(d.dst),
                    sampling: Sampling::from_u32(d.sampling),
                    with_attributes: d.with_attributes != 0,
                    constraint: SrcRectConstraint::from_u32(d.constraint),
                }
            }
            OpType::DrawImageNine => {
                let d: ImageNinePayload = read(p);
                Self::DrawImageNine {
                    image: image(storage, d.slot),
                    center: rect_from_array(d.center),
                    dst: rect_from_array(d.dst),
                    filter: Sampling::from_u32(d.filter),
                    with_attributes: d.with_attributes != 0,
                }
            }
            OpType::DrawAtlas => {
                let h: AtlasHeader = read(p);
                Self::atlas(storage, h, None, &p[size_of::<AtlasHeader>()..])
            }
            OpType::DrawAtlasCulled => {
                let c: AtlasCulledHeader = read(p);
                let cull_rect = Some(rect_from_array(c.cull_rect));
                Self::atlas(storage, c.header, cull_rect, &p[size_of::<AtlasCulledHeader>()..])
            }
            OpType::DrawTextBlob => {
                let d: TextBlobPayload = read(p);
                Self::DrawTextBlob {
                    blob: text_blob(storage, d.slot),
                    origin: point_from_array(d.origin),
                }
            }
            OpType::DrawShadow => {
                let d: ShadowPayload = read(p);
                Self::DrawShadow {
                    path: path(storage, d.slot),
                    color: Color(d.color),
                    elevation: d.elevation,
                    transparent_occluder: d.transparent_occluder != 0,
                    dpr: d.dpr,
                }
            }

            OpType::DrawDisplayList => {
                let d: DisplayListPayload = read(p);
                Self::DrawDisplayList {
                    recording: recording(storage, d.slot),
                    opacity: d.opacity,
                }
            }
        }
    }

    fn atlas(
        storage: &'a Storage,
        h: AtlasHeader,
        cull_rect: Option<Rect>,
        rest: &'a [u8],
    ) -> Self {
        Self::DrawAtlas {
            atlas: image(storage, h.slot),
            sprites: AtlasSprites::new(rest, h.count as usize, h.flags & ATLAS_HAS_COLORS != 0),
            mode: BlendMode::from_u32(h.mode),
            sampling: Sampling::from_u32(h.sampling),
            cull_rect,
            with_attributes: h.flags & ATLAS_WITH_ATTRIBUTES != 0,
        }
    }

    /// The record kind this op decodes from.
    #[must_use]
    pub fn op_type(&self) -> OpType {
        match self {
            Self::SetAntiAlias(_) => OpType::SetAntiAlias,
            Self::SetDither(_) => OpType::SetDither,
            Self::SetInvertColors(_) => OpType::SetInvertColors,
            Self::SetStrokeCap(_) => OpType::SetStrokeCap,
            Self::SetStrokeJoin(_) => OpType::SetStrokeJoin,
            Self::SetStyle(_) => OpType::SetStyle,
            Self::SetStrokeWidth(_) => OpType::SetStrokeWidth,
            Self::SetStrokeMiter(_) => OpType::SetStrokeMiter,
            Self::SetColor(_) => OpType::SetColor,
            Self::SetBlendMode(_) => OpType::SetBlendMode,
            Self::SetMaskFilter(_) => OpType::SetMaskFilter,
            Self::ClearMaskFilter => OpType::ClearMaskFilter,
            Self::SetColorFilter(_) => OpType::SetColorFilter,
            Self::ClearColorFilter => OpType::ClearColorFilter,
            Self::SetImageFilter(_) => OpType::SetImageFilter,
            Self::ClearImageFilter => OpType::ClearImageFilter,
            Self::SetColorSource(_) => OpType::SetColorSource,
            Self::ClearColorSource => OpType::ClearColorSource,
            Self::SetPathEffect(_) => OpType::SetPathEffect,
            Self::ClearPathEffect => OpType::ClearPathEffect,
            Self::Save => OpType::Save,
            Self::SaveLayer { .. } => OpType::SaveLayer,
            Self::SaveLayerBackdrop { .. } => OpType::SaveLayerBackdrop,
            Self::Restore => OpType::Restore,
            Self::Translate(_) => OpType::Translate,
            Self::Scale { .. } => OpType::Scale,
            Self::Rotate { .. } => OpType::Rotate,
            Self::Skew { .. } => OpType::Skew,
            Self::Transform2DAffine(_) => OpType::Transform2DAffine,
            Self::TransformFullPerspective(_) => OpType::TransformFullPerspective,
            Self::TransformReset => OpType::TransformReset,
            Self::ClipRect { .. } => OpType::ClipRect,
            Self::ClipRoundedRect { .. } => OpType::ClipRoundedRect,
            Self::ClipPath { .. } => OpType::ClipPath,
            Self::DrawPaint => OpType::DrawPaint,
            Self::DrawColor { .. } => OpType::DrawColor,
            Self::DrawLine { .. } => OpType::DrawLine,
            Self::DrawRect(_) => OpType::DrawRect,
            Self::DrawOval(_) => OpType::DrawOval,
            Self::DrawCircle { .. } => OpType::DrawCircle,
            Self::DrawRoundedRect(_) => OpType::DrawRoundedRect,
            Self::DrawDoubleRoundedRect { .. } => OpType::DrawDoubleRoundedRect,
            Self::DrawArc { .. } => OpType::DrawArc,
            Self::DrawPath(_) => OpType::DrawPath,
            Self::DrawPoints { .. } => OpType::DrawPoints,
            Self::DrawVertices { .. } => OpType::DrawVertices,
            Self::DrawImage { .. } => OpType::DrawImage,
            Self::DrawImageRect { .. } => OpType::DrawImageRect,
            Self::DrawImageNine { .. } => OpType::DrawImageNine,
            Self::DrawAtlas { cull_rect: Some(_), .. } => OpType::DrawAtlasCulled,
            Self::DrawAtlas { .. } => OpType::DrawAtlas,
            Self::DrawTextBlob { .. } => OpType::DrawTextBlob,
            Self::DrawShadow { .. } => OpType::DrawShadow,
            Self::DrawDisplayList { .. } => OpType::DrawDisplayList,
        }
    }
}

fn layer_bounds(flags: u32, bounds: [f64; 4]) -> Option<Rect> {
    (flags & SAVE_HAS_BOUNDS != 0).then(|| rect_from_array(bounds))
}

// -- resource lookup ---------------------------------------------------------

fn mismatch(slot: u32, found: &Resource, expected: &str) -> ! {
    panic!(
        "resource slot {slot} holds a {}, expected a {expected}",
        found.kind()
    )
}

fn path(storage: &Storage, slot: u32) -> &Arc<BezPath> {
    match storage.resource(slot) {
        Resource::Path(p) => p,
        other => mismatch(slot, other, "path"),
    }
}

fn image(storage: &Storage, slot: u32) -> &Arc<Image> {
    match storage.resource(slot) {
        Resource::Image(i) => i,
        other => mismatch(slot, other, "image"),
    }
}

fn text_blob(storage: &Storage, slot: u32) -> &Arc<TextBlob> {
    match storage.resource(slot) {
        Resource::TextBlob(t) => t,
        other => mismatch(slot, other, "text blob"),
    }
}

fn color_filter(storage: &Storage, slot: u32) -> &Arc<ColorFilter> {
    match storage.resource(slot) {
        Resource::ColorFilter(f) => f,
        other => mismatch(slot, other, "color filter"),
    }
}

fn image_filter(storage: &Storage, slot: u32) -> &Arc<ImageFilter> {
    match storage.resource(slot) {
        Resource::ImageFilter(f) => f,
        other => mismatch(slot, other, "image filter"),
    }
}

fn color_source(storage: &Storage, slot: u32) -> &Arc<ColorSource> {
    match storage.resource(slot) {
        Resource::ColorSource(s) => s,
        other => mismatch(slot, other, "color source"),
    }
}

fn path_effect(storage: &Storage, slot: u32) -> &Arc<PathEffect> {
    match storage.resource(slot) {
        Resource::PathEffect(e) => e,
        other => mismatch(slot, other, "path effect"),
    }
}

fn vertices(storage: &Storage, slot: u32) -> &Arc<Vertices> {
    match storage.resource(slot) {
        Resource::Vertices(v) => v,
        other => mismatch(slot, other, "vertices"),
    }
}

fn recording(storage: &Storage, slot: u32) -> &Arc<Recording> {
    match storage.resource(slot) {
        Resource::Recording(r) => r,
        other => mismatch(slot, other, "recording"),
    }
}
