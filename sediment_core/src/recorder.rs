// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The writer that produces recordings.
//!
//! [`Recorder`] appends one record per call and tracks the state needed to
//! summarize what it wrote:
//!
//! - the current transform and a conservative device-space clip, so every
//!   draw gets device bounds for the spatial index and the overall bounds;
//! - the current attributes, so bounds account for stroking, mask blur and
//!   image filters, and so the opacity and transparency flags can be decided;
//! - a save stack, so each save record can be patched at its restore with the
//!   location of that restore and whether the block sets attributes.
//!
//! Setting an attribute to its current value writes nothing.
//!
//! ```text
//!   Recorder::new(cull) ──► draw_* / set_* / save* / restore ──► build()
//!                                                                  │
//!                                Arc<Recording> ◄── seal ◄─────────┘
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::size_of;

use bytemuck::Pod;
use kurbo::{Affine, BezPath, Cap, Join, Point, Rect, RoundedRect, Shape};

use crate::attributes::Attributes;
use crate::error::StorageError;
use crate::op::{
    ATLAS_HAS_COLORS, ATLAS_WITH_ATTRIBUTES, AffinePayload, ArcPayload, AtlasCulledHeader,
    AtlasHeader, BoolPayload, CirclePayload, ClipPathPayload, ClipRectPayload,
    ClipRoundedRectPayload, DisplayListPayload, DoubleRoundedRectPayload, DrawColorPayload,
    ImageNinePayload, ImagePayload, ImageRectPayload, LinePayload, MaskFilterPayload, OpType,
    POINT_LEN, PairPayload, PerspectivePayload, PointsHeader, RectPayload, RoundedRectPayload,
    SAVE_HAS_ATTRIBUTES, SAVE_HAS_BOUNDS, SPRITE_COLOR_LEN, SPRITE_RECT_LEN,
    SPRITE_TRANSFORM_LEN, SaveLayerBackdropPayload, SaveLayerPayload, SavePayload, ScalarPayload,
    ShadowPayload, SlotPayload, TextBlobPayload, U32Payload, VerticesPayload, point_to_array,
    rect_to_array, sprite_len,
};
use crate::options::SaveLayerOptions;
use crate::paint::{
    BlendMode, ClipOp, Color, DrawStyle, MaskFilter, PointMode, RsTransform, Sampling,
    SrcRectConstraint, cap_to_u32, join_to_u32,
};
use crate::recording::{IdCounter, Recording, Summary};
use crate::resource::{
    ColorFilter, ColorSource, Image, ImageFilter, PathEffect, Resource, TextBlob, Vertices,
};
use crate::rtree::SpatialIndex;
use crate::storage::Storage;
use crate::transform::Transform3d;

/// Device-space padding applied to hairline strokes.
const HAIRLINE_OUTSET: f64 = 1.0;

fn is_empty(r: &Rect) -> bool {
    !(r.x1 > r.x0 && r.y1 > r.y0)
}

fn overlaps(a: &Rect, b: &Rect) -> bool {
    !is_empty(&a.intersect(*b))
}

// ---------------------------------------------------------------------------
// Draw classification
// ---------------------------------------------------------------------------

/// How a draw consults the current attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PaintUse {
    /// The draw carries everything it needs; attributes are ignored.
    Ignored,
    /// Fill or stroke according to the current style.
    Styled,
    /// Always stroked, whatever the style.
    Stroked,
    /// Attributes apply but the geometry is never stroked.
    Unstroked,
}

impl PaintUse {
    fn uses_attributes(self) -> bool {
        self != Self::Ignored
    }
}

// ---------------------------------------------------------------------------
// Save stack
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct SaveFrame {
    offset: usize,
    index: u32,
    op_type: OpType,
    attribute_ops: u32,
    transform: Transform3d,
    clip: Rect,
    layer: Option<LayerFrame>,
}

#[derive(Clone, Debug)]
struct LayerFrame {
    options: SaveLayerOptions,
    bounds: Option<Rect>,
    backdrop: Option<Arc<ImageFilter>>,
    backdrop_slot: u32,
    /// Whether the layer, composited as one primitive, accepts distributed
    /// opacity in its parent.
    composite_compatible: bool,
    /// Image filter applied when compositing, if any.
    image_filter: Option<Arc<ImageFilter>>,
    /// Compositing can make transparent pixels visible anywhere in the layer.
    floods: bool,
    first_entry: usize,
}

/// Per-layer group-opacity accumulator. The root recording is layer zero.
#[derive(Clone, Copy, Debug)]
struct LayerAccum {
    bounds: Option<Rect>,
    opacity_compatible: bool,
}

impl LayerAccum {
    const fn new() -> Self {
        Self {
            bounds: None,
            opacity_compatible: true,
        }
    }

    fn add(&mut self, bounds: Rect, compatible: bool) {
        if !compatible || self.bounds.is_some_and(|acc| overlaps(&acc, &bounds)) {
            self.opacity_compatible = false;
        }
        self.bounds = Some(self.bounds.map_or(bounds, |acc| acc.union(bounds)));
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Builds a [`Recording`] one operation at a time.
///
/// Every method that writes a record returns a [`StorageError`] if the
/// record buffer cannot grow. State-tracking misuse, such as restoring
/// without a matching save, panics.
#[derive(Debug)]
pub struct Recorder {
    storage: Storage,
    cull_rect: Rect,
    use_rtree: bool,
    op_count: u32,
    attribute_ops: u32,
    nested_op_count: usize,
    nested_byte_count: usize,
    attrs: Attributes,
    transform: Transform3d,
    clip: Rect,
    saves: Vec<SaveFrame>,
    layers: Vec<LayerAccum>,
    entries: Vec<(Rect, u32)>,
    is_ui_thread_safe: bool,
    modifies_transparent_black: bool,
}

impl Recorder {
    /// Creates a recorder whose unbounded operations are limited to
    /// `cull_rect`.
    #[must_use]
    pub fn new(cull_rect: Rect) -> Self {
        Self {
            storage: Storage::new(),
            cull_rect: cull_rect.abs(),
            use_rtree: true,
            op_count: 0,
            attribute_ops: 0,
            nested_op_count: 0,
            nested_byte_count: 0,
            attrs: Attributes::default(),
            transform: Transform3d::IDENTITY,
            clip: cull_rect.abs(),
            saves: Vec::new(),
            layers: alloc::vec![LayerAccum::new()],
            entries: Vec::new(),
            is_ui_thread_safe: true,
            modifies_transparent_black: false,
        }
    }

    /// Sets whether [`build`](Self::build) produces a spatial index.
    ///
    /// Enabled by default.
    #[must_use]
    pub fn with_rtree(mut self, enabled: bool) -> Self {
        self.use_rtree = enabled;
        self
    }

    /// Records written so far.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.op_count as usize
    }

    /// Number of open saves plus one, matching the usual canvas convention.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.len() + 1
    }

    /// The current transform.
    #[must_use]
    pub fn transform(&self) -> Transform3d {
        self.transform
    }

    /// Conservative device-space bounds of the current clip.
    #[must_use]
    pub fn device_clip_bounds(&self) -> Rect {
        self.clip
    }

    /// Closes any open saves and seals the recording with ids from
    /// [`IdCounter::global`].
    pub fn build(self) -> Result<Arc<Recording>, StorageError> {
        self.build_with_ids(IdCounter::global())
    }

    /// Closes any open saves and seals the recording with ids from `ids`.
    pub fn build_with_ids(mut self, ids: &IdCounter) -> Result<Arc<Recording>, StorageError> {
        while !self.saves.is_empty() {
            self.restore()?;
        }
        let used = self.storage.used();
        self.storage.realloc(used)?;

        let bounds = self
            .entries
            .iter()
            .map(|(r, _)| *r)
            .reduce(|acc, r| acc.union(r))
            .unwrap_or(Rect::ZERO);
        let root = self.layers[0];
        let summary = Summary {
            op_count: self.op_count as usize,
            nested_op_count: self.nested_op_count,
            nested_byte_count: self.nested_byte_count,
            bounds,
            can_apply_group_opacity: root.opacity_compatible,
            is_ui_thread_safe: self.is_ui_thread_safe,
            modifies_transparent_black: self.modifies_transparent_black,
        };
        let rtree = self.use_rtree.then(|| SpatialIndex::new(&self.entries));
        Ok(Arc::new(Recording::seal(
            self.storage.take(),
            summary,
            rtree,
            ids,
        )))
    }

    // -- writing helpers ----------------------------------------------------

    /// Index the next record will take.
    ///
    /// Nothing is committed until the record is written; callers bump
    /// `op_count` only after the write succeeds.
    fn next_index(&self) -> Result<u32, StorageError> {
        if self.op_count == u32::MAX {
            return Err(StorageError::CapacityOverflow);
        }
        Ok(self.op_count)
    }

    /// Writes a record and returns its offset and op index.
    fn push<P: Pod>(&mut self, op_type: OpType, payload: &P) -> Result<(usize, u32), StorageError> {
        debug_assert_eq!(
            size_of::<P>(),
            op_type.payload_len(),
            "{op_type:?} payload size mismatch"
        );
        let index = self.next_index()?;
        let offset = self.storage.used();
        let bytes = self.storage.alloc(1 + size_of::<P>())?;
        bytes[0] = op_type as u8;
        bytes[1..].copy_from_slice(bytemuck::bytes_of(payload));
        self.op_count = index + 1;
        Ok((offset, index))
    }

    fn push_tag(&mut self, op_type: OpType) -> Result<(usize, u32), StorageError> {
        debug_assert_eq!(op_type.payload_len(), 0, "{op_type:?} has a payload");
        let index = self.next_index()?;
        let offset = self.storage.used();
        self.storage.alloc(1)?[0] = op_type as u8;
        self.op_count = index + 1;
        Ok((offset, index))
    }

    /// Attaches `resource` and writes the record built around its slot.
    ///
    /// If the record cannot be written the slot is released again, so a
    /// failed call leaves the store as it found it.
    fn push_owned<P: Pod>(
        &mut self,
        op_type: OpType,
        resource: Resource,
        payload: impl FnOnce(u32) -> P,
    ) -> Result<(usize, u32), StorageError> {
        let slot = self.storage.attach(resource)?;
        self.push(op_type, &payload(slot))
            .inspect_err(|_| self.storage.release_unwritten(slot))
    }

    fn push_attr_owned(&mut self, op_type: OpType, resource: Resource) -> Result<(), StorageError> {
        self.push_owned(op_type, resource, |slot| SlotPayload { slot })?;
        self.attribute_ops += 1;
        Ok(())
    }

    fn push_attr<P: Pod>(&mut self, op_type: OpType, payload: &P) -> Result<(), StorageError> {
        self.push(op_type, payload)?;
        self.attribute_ops += 1;
        Ok(())
    }

    fn push_attr_tag(&mut self, op_type: OpType) -> Result<(), StorageError> {
        self.push_tag(op_type)?;
        self.attribute_ops += 1;
        Ok(())
    }

    // -- attributes ---------------------------------------------------------

    /// Sets anti-aliasing.
    pub fn set_anti_alias(&mut self, aa: bool) -> Result<(), StorageError> {
        if self.attrs.anti_alias != aa {
            self.push_attr(OpType::SetAntiAlias, &BoolPayload { value: aa.into() })?;
            self.attrs.anti_alias = aa;
        }
        Ok(())
    }

    /// Sets dithering.
    pub fn set_dither(&mut self, dither: bool) -> Result<(), StorageError> {
        if self.attrs.dither != dither {
            self.push_attr(OpType::SetDither, &BoolPayload { value: dither.into() })?;
            self.attrs.dither = dither;
        }
        Ok(())
    }

    /// Sets color inversion.
    pub fn set_invert_colors(&mut self, invert: bool) -> Result<(), StorageError> {
        if self.attrs.invert_colors != invert {
            self.push_attr(OpType::SetInvertColors, &BoolPayload { value: invert.into() })?;
            self.attrs.invert_colors = invert;
        }
        Ok(())
    }

    /// Sets the stroke cap.
    pub fn set_stroke_cap(&mut self, cap: Cap) -> Result<(), StorageError> {
        if self.attrs.cap != cap {
            self.push_attr(OpType::SetStrokeCap, &U32Payload { value: cap_to_u32(cap) })?;
            self.attrs.cap = cap;
        }
        Ok(())
    }

    /// Sets the stroke join.
    pub fn set_stroke_join(&mut self, join: Join) -> Result<(), StorageError> {
        if self.attrs.join != join {
            self.push_attr(OpType::SetStrokeJoin, &U32Payload { value: join_to_u32(join) })?;
            self.attrs.join = join;
        }
        Ok(())
    }

    /// Sets fill or stroke style.
    pub fn set_style(&mut self, style: DrawStyle) -> Result<(), StorageError> {
        if self.attrs.style != style {
            self.push_attr(OpType::SetStyle, &U32Payload { value: style as u32 })?;
            self.attrs.style = style;
        }
        Ok(())
    }

    /// Sets the stroke width; zero strokes a hairline.
    pub fn set_stroke_width(&mut self, width: f64) -> Result<(), StorageError> {
        if self.attrs.stroke_width != width {
            self.push_attr(OpType::SetStrokeWidth, &ScalarPayload { value: width })?;
            self.attrs.stroke_width = width;
        }
        Ok(())
    }

    /// Sets the miter limit.
    pub fn set_stroke_miter(&mut self, limit: f64) -> Result<(), StorageError> {
        if self.attrs.stroke_miter != limit {
            self.push_attr(OpType::SetStrokeMiter, &ScalarPayload { value: limit })?;
            self.attrs.stroke_miter = limit;
        }
        Ok(())
    }

    /// Sets the flat color.
    pub fn set_color(&mut self, color: Color) -> Result<(), StorageError> {
        if self.attrs.color != color {
            self.push_attr(OpType::SetColor, &U32Payload { value: color.0 })?;
            self.attrs.color = color;
        }
        Ok(())
    }

    /// Sets the blend mode.
    pub fn set_blend_mode(&mut self, mode: BlendMode) -> Result<(), StorageError> {
        if self.attrs.blend_mode != mode {
            self.push_attr(OpType::SetBlendMode, &U32Payload { value: mode as u32 })?;
            self.attrs.blend_mode = mode;
        }
        Ok(())
    }

    /// Sets or clears the mask filter.
    pub fn set_mask_filter(&mut self, filter: Option<MaskFilter>) -> Result<(), StorageError> {
        if self.attrs.mask_filter == filter {
            return Ok(());
        }
        match filter {
            Some(m) => self.push_attr(
                OpType::SetMaskFilter,
                &MaskFilterPayload {
                    sigma: m.sigma,
                    style: m.style as u32,
                    _pad: 0,
                },
            )?,
            None => self.push_attr_tag(OpType::ClearMaskFilter)?,
        }
        self.attrs.mask_filter = filter;
        Ok(())
    }

    /// Sets or clears the color filter.
    pub fn set_color_filter(
        &mut self,
        filter: Option<Arc<ColorFilter>>,
    ) -> Result<(), StorageError> {
        if self.attrs.color_filter == filter {
            return Ok(());
        }
        match &filter {
            Some(f) => {
                self.push_attr_owned(OpType::SetColorFilter, Resource::ColorFilter(f.clone()))?;
            }
            None => self.push_attr_tag(OpType::ClearColorFilter)?,
        }
        self.attrs.color_filter = filter;
        Ok(())
    }

    /// Sets or clears the image filter.
    pub fn set_image_filter(
        &mut self,
        filter: Option<Arc<ImageFilter>>,
    ) -> Result<(), StorageError> {
        if self.attrs.image_filter == filter {
            return Ok(());
        }
        match &filter {
            Some(f) => {
                self.push_attr_owned(OpType::SetImageFilter, Resource::ImageFilter(f.clone()))?;
            }
            None => self.push_attr_tag(OpType::ClearImageFilter)?,
        }
        self.attrs.image_filter = filter;
        Ok(())
    }

    /// Sets or clears the color source.
    pub fn set_color_source(
        &mut self,
        source: Option<Arc<ColorSource>>,
    ) -> Result<(), StorageError> {
        if self.attrs.color_source == source {
            return Ok(());
        }
        match &source {
            Some(s) => {
                self.push_attr_owned(OpType::SetColorSource, Resource::ColorSource(s.clone()))?;
                if !s.is_ui_thread_safe() {
                    self.is_ui_thread_safe = false;
                }
            }
            None => self.push_attr_tag(OpType::ClearColorSource)?,
        }
        self.attrs.color_source = source;
        Ok(())
    }

    /// Sets or clears the path effect.
    pub fn set_path_effect(
        &mut self,
        effect: Option<Arc<PathEffect>>,
    ) -> Result<(), StorageError> {
        if self.attrs.path_effect == effect {
            return Ok(());
        }
        match &effect {
            Some(e) => {
                self.push_attr_owned(OpType::SetPathEffect, Resource::PathEffect(e.clone()))?;
            }
            None => self.push_attr_tag(OpType::ClearPathEffect)?,
        }
        self.attrs.path_effect = effect;
        Ok(())
    }

    // -- save / restore -----------------------------------------------------

    fn open_frame(
        &mut self,
        offset: usize,
        index: u32,
        op_type: OpType,
        layer: Option<LayerFrame>,
    ) {
        self.saves.push(SaveFrame {
            offset,
            index,
            op_type,
            attribute_ops: self.attribute_ops,
            transform: self.transform,
            clip: self.clip,
            layer,
        });
    }

    /// Pushes transform and clip state.
    pub fn save(&mut self) -> Result<(), StorageError> {
        let (offset, index) = self.push(
            OpType::Save,
            &SavePayload {
                restore_offset: 0,
                restore_index: 0,
                flags: 0,
            },
        )?;
        self.open_frame(offset, index, OpType::Save, None);
        Ok(())
    }

    /// Pushes state and opens an offscreen layer.
    ///
    /// Optimization hints in `options` are ignored; the recorder computes
    /// them itself.
    pub fn save_layer(
        &mut self,
        bounds: Option<Rect>,
        options: SaveLayerOptions,
    ) -> Result<(), StorageError> {
        self.open_layer(bounds, options, None)
    }

    /// Pushes state and opens an offscreen layer initialized from the
    /// backdrop filtered through `backdrop`.
    pub fn save_layer_with_backdrop(
        &mut self,
        bounds: Option<Rect>,
        options: SaveLayerOptions,
        backdrop: Arc<ImageFilter>,
    ) -> Result<(), StorageError> {
        self.open_layer(bounds, options, Some(backdrop))
    }

    fn open_layer(
        &mut self,
        bounds: Option<Rect>,
        options: SaveLayerOptions,
        backdrop: Option<Arc<ImageFilter>>,
    ) -> Result<(), StorageError> {
        let options = options.without_optimizations();
        let bounds = bounds.map(|b| b.abs());
        let flags = if bounds.is_some() { SAVE_HAS_BOUNDS } else { 0 };
        let bounds_array = rect_to_array(bounds.unwrap_or(Rect::ZERO));

        let (offset, index, backdrop_slot) = match &backdrop {
            Some(filter) => {
                let mut backdrop_slot = 0;
                let (offset, index) = self.push_owned(
                    OpType::SaveLayerBackdrop,
                    Resource::ImageFilter(filter.clone()),
                    |slot| {
                        backdrop_slot = slot;
                        SaveLayerBackdropPayload {
                            slot,
                            restore_offset: 0,
                            restore_index: 0,
                            flags,
                            options: options.bits(),
                            _pad: 0,
                            bounds: bounds_array,
                        }
                    },
                )?;
                (offset, index, backdrop_slot)
            }
            None => {
                let (offset, index) = self.push(
                    OpType::SaveLayer,
                    &SaveLayerPayload {
                        restore_offset: 0,
                        restore_index: 0,
                        flags,
                        options: options.bits(),
                        bounds: bounds_array,
                    },
                )?;
                (offset, index, 0)
            }
        };

        let with_attrs = options.renders_with_attributes();
        let layer = LayerFrame {
            options,
            bounds,
            composite_compatible: backdrop.is_none()
                && (!with_attrs || self.attrs.opacity_compatible()),
            image_filter: if with_attrs {
                self.attrs.image_filter.clone()
            } else {
                None
            },
            floods: with_attrs
                && self
                    .attrs
                    .color_filter
                    .as_ref()
                    .is_some_and(|f| f.modifies_transparent_black()),
            backdrop,
            backdrop_slot,
            first_entry: self.entries.len(),
        };

        if let Some(filter) = &layer.backdrop {
            let region = self.layer_region(bounds, self.transform, self.clip);
            if !is_empty(&region) {
                self.entries.push((region, index));
                if filter.modifies_transparent_black() {
                    self.modifies_transparent_black = true;
                }
            }
        }

        let op_type = layer_op_type(&layer);
        self.open_frame(offset, index, op_type, Some(layer));
        if let Some(b) = bounds {
            if let Some(device) = self.transform.map_rect_bbox(b) {
                self.clip = self.clip.intersect(device);
            }
        }
        self.layers.push(LayerAccum::new());
        Ok(())
    }

    fn layer_region(&self, bounds: Option<Rect>, transform: Transform3d, clip: Rect) -> Rect {
        match bounds.and_then(|b| transform.map_rect_bbox(b)) {
            Some(device) => device.intersect(clip),
            None => clip,
        }
    }

    /// Pops to the matching save.
    ///
    /// # Panics
    ///
    /// Panics if there is no open save.
    pub fn restore(&mut self) -> Result<(), StorageError> {
        assert!(!self.saves.is_empty(), "restore without a matching save");
        let restore_offset = self.storage.used();
        let (_, restore_index) = self.push_tag(OpType::Restore)?;
        let Some(frame) = self.saves.pop() else {
            unreachable!("checked above");
        };

        let mut flags = 0;
        if self.attribute_ops != frame.attribute_ops {
            flags |= SAVE_HAS_ATTRIBUTES;
        }
        let restore_offset = offset_u32(restore_offset)?;
        match (&frame.layer, frame.op_type) {
            (None, _) => {
                self.storage.patch(
                    frame.offset + 1,
                    bytemuck::bytes_of(&SavePayload {
                        restore_offset,
                        restore_index,
                        flags,
                    }),
                );
            }
            (Some(layer), op_type) => {
                let content = self.layers.pop().unwrap_or(LayerAccum::new());
                let mut options = layer.options;
                if content.opacity_compatible {
                    options = options.with_can_distribute_opacity();
                }
                if layer.bounds.is_some() {
                    flags |= SAVE_HAS_BOUNDS;
                }
                let bounds = rect_to_array(layer.bounds.unwrap_or(Rect::ZERO));
                if op_type == OpType::SaveLayerBackdrop {
                    self.storage.patch(
                        frame.offset + 1,
                        bytemuck::bytes_of(&SaveLayerBackdropPayload {
                            slot: layer.backdrop_slot,
                            restore_offset,
                            restore_index,
                            flags,
                            options: options.bits(),
                            _pad: 0,
                            bounds,
                        }),
                    );
                } else {
                    self.storage.patch(
                        frame.offset + 1,
                        bytemuck::bytes_of(&SaveLayerPayload {
                            restore_offset,
                            restore_index,
                            flags,
                            options: options.bits(),
                            bounds,
                        }),
                    );
                }
                self.close_layer(&frame, layer, content);
            }
        }

        self.transform = frame.transform;
        self.clip = frame.clip;
        Ok(())
    }

    /// Folds a closed layer into its parent as one primitive.
    fn close_layer(&mut self, frame: &SaveFrame, layer: &LayerFrame, content: LayerAccum) {
        let region = self.layer_region(layer.bounds, frame.transform, frame.clip);
        let filtered = layer.image_filter.is_some() || layer.floods;
        let device = if layer.floods || layer.backdrop.is_some() {
            Some(region)
        } else {
            content.bounds.map(|c| match &layer.image_filter {
                Some(filter) => filter_device_bounds(filter, c, frame.transform)
                    .map_or(region, |b| b.intersect(region)),
                None => c,
            })
        };
        let Some(device) = device.filter(|d| !is_empty(d)) else {
            return;
        };

        if filtered {
            // Anything drawn inside may now reach any pixel of the output.
            for entry in &mut self.entries[layer.first_entry..] {
                entry.0 = entry.0.union(device);
            }
            self.entries.push((device, frame.index));
        }
        if layer.floods {
            self.modifies_transparent_black = true;
        }
        self.accumulate(device, layer.composite_compatible);
    }

    // -- transforms ---------------------------------------------------------

    fn concat(&mut self, t: Transform3d) {
        self.transform = self.transform * t;
    }

    /// Concatenates a translation.
    pub fn translate(&mut self, tx: f64, ty: f64) -> Result<(), StorageError> {
        if tx == 0.0 && ty == 0.0 {
            return Ok(());
        }
        self.push(OpType::Translate, &PairPayload { x: tx, y: ty })?;
        self.concat(Affine::translate((tx, ty)).into());
        Ok(())
    }

    /// Concatenates a scale.
    pub fn scale(&mut self, sx: f64, sy: f64) -> Result<(), StorageError> {
        if sx == 1.0 && sy == 1.0 {
            return Ok(());
        }
        self.push(OpType::Scale, &PairPayload { x: sx, y: sy })?;
        self.concat(Affine::scale_non_uniform(sx, sy).into());
        Ok(())
    }

    /// Concatenates a rotation in degrees.
    pub fn rotate(&mut self, degrees: f64) -> Result<(), StorageError> {
        if degrees == 0.0 {
            return Ok(());
        }
        self.push(OpType::Rotate, &ScalarPayload { value: degrees })?;
        self.concat(Affine::rotate(degrees.to_radians()).into());
        Ok(())
    }

    /// Concatenates a skew.
    pub fn skew(&mut self, sx: f64, sy: f64) -> Result<(), StorageError> {
        if sx == 0.0 && sy == 0.0 {
            return Ok(());
        }
        self.push(OpType::Skew, &PairPayload { x: sx, y: sy })?;
        self.concat(Affine::skew(sx, sy).into());
        Ok(())
    }

    /// Concatenates a 2-D affine transform.
    pub fn transform_2d_affine(&mut self, transform: Affine) -> Result<(), StorageError> {
        if transform == Affine::IDENTITY {
            return Ok(());
        }
        self.push(
            OpType::Transform2DAffine,
            &AffinePayload {
                coeffs: transform.as_coeffs(),
            },
        )?;
        self.concat(transform.into());
        Ok(())
    }

    /// Concatenates a full 4×4 transform.
    pub fn transform_full_perspective(
        &mut self,
        transform: Transform3d,
    ) -> Result<(), StorageError> {
        if transform == Transform3d::IDENTITY {
            return Ok(());
        }
        self.push(
            OpType::TransformFullPerspective,
            &PerspectivePayload {
                cols: transform.to_cols_array_2d(),
            },
        )?;
        self.concat(transform);
        Ok(())
    }

    /// Replaces the current transform with the identity.
    pub fn transform_reset(&mut self) -> Result<(), StorageError> {
        self.push_tag(OpType::TransformReset)?;
        self.transform = Transform3d::IDENTITY;
        Ok(())
    }

    // -- clips --------------------------------------------------------------

    fn narrow_clip(&mut self, local: Rect, op: ClipOp) {
        if op == ClipOp::Difference {
            return;
        }
        if let Some(device) = self.transform.map_rect_bbox(local) {
            self.clip = self.clip.intersect(device);
        }
    }

    /// Clips to a rectangle.
    pub fn clip_rect(
        &mut self,
        rect: Rect,
        op: ClipOp,
        anti_alias: bool,
    ) -> Result<(), StorageError> {
        self.push(
            OpType::ClipRect,
            &ClipRectPayload {
                rect: rect_to_array(rect),
                op: op as u32,
                anti_alias: anti_alias.into(),
            },
        )?;
        self.narrow_clip(rect.abs(), op);
        Ok(())
    }

    /// Clips to a rounded rectangle.
    pub fn clip_rounded_rect(
        &mut self,
        rrect: RoundedRect,
        op: ClipOp,
        anti_alias: bool,
    ) -> Result<(), StorageError> {
        self.push(
            OpType::ClipRoundedRect,
            &ClipRoundedRectPayload {
                rrect: rrect.into(),
                op: op as u32,
                anti_alias: anti_alias.into(),
            },
        )?;
        self.narrow_clip(rrect.rect(), op);
        Ok(())
    }

    /// Clips to a path.
    pub fn clip_path(
        &mut self,
        path: Arc<BezPath>,
        op: ClipOp,
        anti_alias: bool,
    ) -> Result<(), StorageError> {
        let bounds = path.bounding_box();
        self.push_owned(OpType::ClipPath, Resource::Path(path), |slot| ClipPathPayload {
            slot,
            op: op as u32,
            anti_alias: anti_alias.into(),
        })?;
        self.narrow_clip(bounds, op);
        Ok(())
    }

    // -- bounds and flags ---------------------------------------------------

    /// Device bounds of a draw, or `None` if it is fully clipped.
    ///
    /// `local` is the geometry in local coordinates; `None` fills the clip.
    fn device_bounds(&self, local: Option<Rect>, paint: PaintUse) -> Option<Rect> {
        if is_empty(&self.clip) {
            return None;
        }
        let mut local = local.map(|r| r.abs());
        let mut hairline = false;
        if paint.uses_attributes() {
            if self.attrs.filters_modify_transparent_black() {
                local = None;
            }
            if let Some(effect) = &self.attrs.path_effect
                && matches!(paint, PaintUse::Styled | PaintUse::Stroked)
            {
                local = local.and_then(|r| effect.map_bounds(r));
            }
            if let Some(mut r) = local {
                let stroked = match paint {
                    PaintUse::Styled => self.attrs.style.strokes(),
                    PaintUse::Stroked => true,
                    PaintUse::Unstroked | PaintUse::Ignored => false,
                };
                if stroked {
                    match self.attrs.stroke_outset() {
                        Some(pad) => r = r.inflate(pad, pad),
                        None => hairline = true,
                    }
                }
                if let Some(mask) = &self.attrs.mask_filter {
                    r = r.inflate(mask.outset(), mask.outset());
                }
                local = match &self.attrs.image_filter {
                    Some(filter) => filter.map_bounds(r),
                    None => Some(r),
                };
            }
        }
        let mut device = local
            .and_then(|r| self.transform.map_rect_bbox(r))
            .unwrap_or(self.clip);
        if hairline {
            device = device.inflate(HAIRLINE_OUTSET, HAIRLINE_OUTSET);
        }
        let device = device.intersect(self.clip);
        (!is_empty(&device)).then_some(device)
    }

    fn accumulate(&mut self, device: Rect, compatible: bool) {
        if let Some(layer) = self.layers.last_mut() {
            layer.add(device, compatible);
        }
    }

    /// Summarizes one draw: spatial entry, opacity and transparency.
    fn finish_draw(&mut self, index: u32, device: Option<Rect>, compatible: bool, modifies: bool) {
        let Some(device) = device else {
            return;
        };
        self.entries.push((device, index));
        self.accumulate(device, compatible);
        if modifies {
            self.modifies_transparent_black = true;
        }
    }

    /// Whether a draw under the current attributes can touch transparent black.
    fn attrs_modify_transparent_black(&self) -> bool {
        let attrs = &self.attrs;
        if attrs.blend_mode.nops_on_transparent_dst() {
            return false;
        }
        if attrs.filters_modify_transparent_black() {
            return true;
        }
        !attrs.source_is_transparent()
    }

    /// Records a draw that renders with the current attributes.
    fn draw_with_attrs<P: Pod>(
        &mut self,
        op_type: OpType,
        payload: &P,
        local: Option<Rect>,
        paint: PaintUse,
    ) -> Result<(), StorageError> {
        let (_, index) = self.push(op_type, payload)?;
        self.finish_attr_draw(index, local, paint);
        Ok(())
    }

    fn finish_attr_draw(&mut self, index: u32, local: Option<Rect>, paint: PaintUse) {
        let device = self.device_bounds(local, paint);
        let compatible = self.attrs.opacity_compatible();
        let modifies = self.attrs_modify_transparent_black();
        self.finish_draw(index, device, compatible, modifies);
    }

    // -- draws --------------------------------------------------------------

    /// Fills the clip with the current attributes.
    pub fn draw_paint(&mut self) -> Result<(), StorageError> {
        let (_, index) = self.push_tag(OpType::DrawPaint)?;
        self.finish_attr_draw(index, None, PaintUse::Styled);
        Ok(())
    }

    /// Fills the clip with a color.
    pub fn draw_color(&mut self, color: Color, mode: BlendMode) -> Result<(), StorageError> {
        let (_, index) = self.push(
            OpType::DrawColor,
            &DrawColorPayload {
                color: color.0,
                mode: mode as u32,
            },
        )?;
        let device = self.device_bounds(None, PaintUse::Ignored);
        let modifies = !mode.nops_on_transparent_dst() && !color.is_transparent();
        self.finish_draw(index, device, mode == BlendMode::SrcOver, modifies);
        Ok(())
    }

    /// Draws a line segment.
    pub fn draw_line(&mut self, p0: Point, p1: Point) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawLine,
            &LinePayload {
                p0: point_to_array(p0),
                p1: point_to_array(p1),
            },
            Some(Rect::from_points(p0, p1)),
            PaintUse::Stroked,
        )
    }

    /// Draws a rectangle.
    pub fn draw_rect(&mut self, rect: Rect) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawRect,
            &RectPayload {
                rect: rect_to_array(rect),
            },
            Some(rect),
            PaintUse::Styled,
        )
    }

    /// Draws the oval inscribed in `bounds`.
    pub fn draw_oval(&mut self, bounds: Rect) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawOval,
            &RectPayload {
                rect: rect_to_array(bounds),
            },
            Some(bounds),
            PaintUse::Styled,
        )
    }

    /// Draws a circle.
    pub fn draw_circle(&mut self, center: Point, radius: f64) -> Result<(), StorageError> {
        let r = radius.abs();
        self.draw_with_attrs(
            OpType::DrawCircle,
            &CirclePayload {
                center: point_to_array(center),
                radius,
            },
            Some(Rect::new(center.x - r, center.y - r, center.x + r, center.y + r)),
            PaintUse::Styled,
        )
    }

    /// Draws a rounded rectangle.
    pub fn draw_rounded_rect(&mut self, rrect: RoundedRect) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawRoundedRect,
            &RoundedRectPayload::from(rrect),
            Some(rrect.rect()),
            PaintUse::Styled,
        )
    }

    /// Draws the area between two rounded rectangles.
    pub fn draw_double_rounded_rect(
        &mut self,
        outer: RoundedRect,
        inner: RoundedRect,
    ) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawDoubleRoundedRect,
            &DoubleRoundedRectPayload {
                outer: outer.into(),
                inner: inner.into(),
            },
            Some(outer.rect()),
            PaintUse::Styled,
        )
    }

    /// Draws an arc of the oval inscribed in `oval`.
    pub fn draw_arc(
        &mut self,
        oval: Rect,
        start_degrees: f64,
        sweep_degrees: f64,
        use_center: bool,
    ) -> Result<(), StorageError> {
        self.draw_with_attrs(
            OpType::DrawArc,
            &ArcPayload {
                oval: rect_to_array(oval),
                start_degrees,
                sweep_degrees,
                use_center: use_center.into(),
                _pad: 0,
            },
            Some(oval),
            PaintUse::Styled,
        )
    }

    /// Draws a path.
    pub fn draw_path(&mut self, path: Arc<BezPath>) -> Result<(), StorageError> {
        let bounds = path.bounding_box();
        let (_, index) =
            self.push_owned(OpType::DrawPath, Resource::Path(path), |slot| SlotPayload { slot })?;
        self.finish_attr_draw(index, Some(bounds), PaintUse::Styled);
        Ok(())
    }

    /// Draws a list of points.
    pub fn draw_points(&mut self, mode: PointMode, points: &[Point]) -> Result<(), StorageError> {
        let count = u32::try_from(points.len()).map_err(|_| StorageError::CapacityOverflow)?;
        let header_len = size_of::<PointsHeader>();
        let len = points
            .len()
            .checked_mul(POINT_LEN)
            .and_then(|n| n.checked_add(1 + header_len))
            .ok_or(StorageError::CapacityOverflow)?;
        let index = self.next_index()?;
        let bytes = self.storage.alloc(len)?;
        bytes[0] = OpType::DrawPoints as u8;
        bytes[1..1 + header_len].copy_from_slice(bytemuck::bytes_of(&PointsHeader {
            mode: mode as u32,
            count,
        }));
        for (chunk, p) in bytes[1 + header_len..]
            .chunks_exact_mut(POINT_LEN)
            .zip(points)
        {
            chunk.copy_from_slice(bytemuck::bytes_of(&point_to_array(*p)));
        }
        self.op_count = index + 1;

        let local = points
            .iter()
            .map(|p| Rect::from_points(*p, *p))
            .reduce(|acc, r| acc.union(r));
        if local.is_some() {
            self.finish_attr_draw(index, local, PaintUse::Stroked);
        }
        Ok(())
    }

    /// Draws a triangle mesh, blending its vertex colors with `mode`.
    ///
    /// Per-vertex colors replace the current color, so the draw never
    /// accepts distributed opacity.
    pub fn draw_vertices(
        &mut self,
        vertices: Arc<Vertices>,
        mode: BlendMode,
    ) -> Result<(), StorageError> {
        let local = vertices.bounds();
        let (_, index) = self.push_owned(
            OpType::DrawVertices,
            Resource::Vertices(vertices),
            |slot| VerticesPayload {
                slot,
                mode: mode as u32,
            },
        )?;
        if local.is_some() {
            let device = self.device_bounds(local, PaintUse::Unstroked);
            let modifies = self.attrs_modify_transparent_black();
            self.finish_draw(index, device, false, modifies);
        }
        Ok(())
    }

    fn note_image(&mut self, image: &Image) {
        if !image.thread_safe {
            self.is_ui_thread_safe = false;
        }
    }

    fn finish_image(&mut self, index: u32, dst: Rect, with_attributes: bool) {
        if with_attributes {
            self.finish_attr_draw(index, Some(dst), PaintUse::Unstroked);
        } else {
            let device = self.device_bounds(Some(dst), PaintUse::Ignored);
            self.finish_draw(index, device, true, true);
        }
    }

    /// Draws an image with its top-left corner at `point`.
    pub fn draw_image(
        &mut self,
        image: Arc<Image>,
        point: Point,
        sampling: Sampling,
        with_attributes: bool,
    ) -> Result<(), StorageError> {
        let dst = image.bounds() + point.to_vec2();
        let (_, index) = self.push_owned(OpType::DrawImage, Resource::Image(image.clone()), |slot| {
            ImagePayload {
                slot,
                sampling: sampling as u32,
                with_attributes: with_attributes.into(),
                _pad: 0,
                point: point_to_array(point),
            }
        })?;
        self.note_image(&image);
        self.finish_image(index, dst, with_attributes);
        Ok(())
    }

    /// Draws the `src` part of an image into `dst`.
    pub fn draw_image_rect(
        &mut self,
        image: Arc<Image>,
        src: Rect,
        dst: Rect,
        sampling: Sampling,
        with_attributes: bool,
        constraint: SrcRectConstraint,
    ) -> Result<(), StorageError> {
        let (_, index) =
            self.push_owned(OpType::DrawImageRect, Resource::Image(image.clone()), |slot| {
                ImageRectPayload {
                    slot,
                    sampling: sampling as u32,
                    with_attributes: with_attributes.into(),
                    constraint: constraint as u32,
                    src: rect_to_array(src),
                    dst: rect_to_array(dst),
                }
            })?;
        self.note_image(&image);
        self.finish_image(index, dst, with_attributes);
        Ok(())
    }

    /// Draws an image as a nine-patch stretched into `dst`.
    pub fn draw_image_nine(
        &mut self,
        image: Arc<Image>,
        center: Rect,
        dst: Rect,
        filter: Sampling,
        with_attributes: bool,
    ) -> Result<(), StorageError> {
        let (_, index) =
            self.push_owned(OpType::DrawImageNine, Resource::Image(image.clone()), |slot| {
                ImageNinePayload {
                    slot,
                    filter: filter as u32,
                    with_attributes: with_attributes.into(),
                    _pad: 0,
                    center: rect_to_array(center),
                    dst: rect_to_array(dst),
                }
            })?;
        self.note_image(&image);
        self.finish_image(index, dst, with_attributes);
        Ok(())
    }

    /// Draws one sprite from `atlas` per transform.
    ///
    /// Each sprite is the `texture_rects` entry at the same position, placed
    /// by its transform and, when `colors` is given, blended with its color
    /// using `mode`. A `cull_rect` promises that every sprite lies inside it
    /// and is used as the draw's bounds.
    ///
    /// # Panics
    ///
    /// Panics if `texture_rects` or `colors` does not have one entry per
    /// transform.
    pub fn draw_atlas(
        &mut self,
        atlas: Arc<Image>,
        transforms: &[RsTransform],
        texture_rects: &[Rect],
        colors: Option<&[Color]>,
        mode: BlendMode,
        sampling: Sampling,
        cull_rect: Option<Rect>,
        with_attributes: bool,
    ) -> Result<(), StorageError> {
        let n = transforms.len();
        assert_eq!(texture_rects.len(), n, "one texture rect per sprite");
        if let Some(colors) = colors {
            assert_eq!(colors.len(), n, "one color per sprite");
        }
        let count = u32::try_from(n).map_err(|_| StorageError::CapacityOverflow)?;
        let (op_type, header_len) = match cull_rect {
            Some(_) => (OpType::DrawAtlasCulled, size_of::<AtlasCulledHeader>()),
            None => (OpType::DrawAtlas, size_of::<AtlasHeader>()),
        };
        let len = n
            .checked_mul(sprite_len(colors.is_some()))
            .and_then(|sprites| sprites.checked_add(1 + header_len))
            .ok_or(StorageError::CapacityOverflow)?;
        let mut flags = 0;
        if with_attributes {
            flags |= ATLAS_WITH_ATTRIBUTES;
        }
        if colors.is_some() {
            flags |= ATLAS_HAS_COLORS;
        }

        let index = self.next_index()?;
        let slot = self.storage.attach(Resource::Image(atlas.clone()))?;
        let bytes = match self.storage.alloc(len) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.storage.release_unwritten(slot);
                return Err(e);
            }
        };
        let header = AtlasHeader {
            slot,
            count,
            mode: mode as u32,
            sampling: sampling as u32,
            flags,
            _pad: 0,
        };
        bytes[0] = op_type as u8;
        let (head, body) = bytes[1..].split_at_mut(header_len);
        match cull_rect {
            Some(cull) => head.copy_from_slice(bytemuck::bytes_of(&AtlasCulledHeader {
                header,
                cull_rect: rect_to_array(cull),
            })),
            None => head.copy_from_slice(bytemuck::bytes_of(&header)),
        }
        let (xform_bytes, rest) = body.split_at_mut(n * SPRITE_TRANSFORM_LEN);
        let (rect_bytes, color_bytes) = rest.split_at_mut(n * SPRITE_RECT_LEN);
        for (chunk, t) in xform_bytes.chunks_exact_mut(SPRITE_TRANSFORM_LEN).zip(transforms) {
            chunk.copy_from_slice(bytemuck::bytes_of(&[t.scos, t.ssin, t.tx, t.ty]));
        }
        for (chunk, r) in rect_bytes.chunks_exact_mut(SPRITE_RECT_LEN).zip(texture_rects) {
            chunk.copy_from_slice(bytemuck::bytes_of(&rect_to_array(*r)));
        }
        if let Some(colors) = colors {
            for (chunk, c) in color_bytes.chunks_exact_mut(SPRITE_COLOR_LEN).zip(colors) {
                chunk.copy_from_slice(bytemuck::bytes_of(&c.0));
            }
        }
        self.op_count = index + 1;
        self.note_image(&atlas);

        let local = cull_rect.or_else(|| {
            transforms
                .iter()
                .zip(texture_rects)
                .map(|(t, r)| t.sprite_bounds(r.width(), r.height()))
                .reduce(|acc, r| acc.union(r))
        });
        if local.is_some() {
            // Sprites may overlap one another, so opacity never distributes.
            let (device, modifies) = if with_attributes {
                let device = self.device_bounds(local, PaintUse::Unstroked);
                (device, self.attrs_modify_transparent_black())
            } else {
                (self.device_bounds(local, PaintUse::Ignored), true)
            };
            self.finish_draw(index, device, false, modifies);
        }
        Ok(())
    }

    /// Draws a text blob at `origin`.
    pub fn draw_text_blob(
        &mut self,
        blob: Arc<TextBlob>,
        origin: Point,
    ) -> Result<(), StorageError> {
        let local = blob.bounds + origin.to_vec2();
        let (_, index) = self.push_owned(OpType::DrawTextBlob, Resource::TextBlob(blob), |slot| {
            TextBlobPayload {
                slot,
                _pad: 0,
                origin: point_to_array(origin),
            }
        })?;
        self.finish_attr_draw(index, Some(local), PaintUse::Styled);
        Ok(())
    }

    /// Draws the shadow cast by `path`.
    ///
    /// Shadows can spread arbitrarily far with elevation, so their bounds
    /// are the current clip.
    pub fn draw_shadow(
        &mut self,
        path: Arc<BezPath>,
        color: Color,
        elevation: f64,
        transparent_occluder: bool,
        dpr: f64,
    ) -> Result<(), StorageError> {
        let (_, index) = self.push_owned(OpType::DrawShadow, Resource::Path(path), |slot| {
            ShadowPayload {
                slot,
                color: color.0,
                transparent_occluder: transparent_occluder.into(),
                _pad: 0,
                elevation,
                dpr,
            }
        })?;
        let device = self.device_bounds(None, PaintUse::Ignored);
        self.finish_draw(index, device, false, !color.is_transparent());
        Ok(())
    }

    /// Draws a nested recording at `opacity`.
    pub fn draw_display_list(
        &mut self,
        recording: Arc<Recording>,
        opacity: f64,
    ) -> Result<(), StorageError> {
        let local = recording.bounds();
        let compatible = recording.can_apply_group_opacity();
        let modifies = recording.modifies_transparent_black();
        let thread_safe = recording.is_ui_thread_safe();
        let nested_ops = recording.op_count(true);
        let nested_bytes = recording.bytes(true);

        let (_, index) = self.push_owned(
            OpType::DrawDisplayList,
            Resource::Recording(recording),
            |slot| DisplayListPayload {
                slot,
                _pad: 0,
                opacity,
            },
        )?;
        self.nested_op_count += nested_ops;
        self.nested_byte_count += nested_bytes;
        if !thread_safe {
            self.is_ui_thread_safe = false;
        }
        let device = if is_empty(&local) {
            None
        } else {
            self.device_bounds(Some(local), PaintUse::Ignored)
        };
        self.finish_draw(index, device, compatible, modifies);
        Ok(())
    }
}

fn layer_op_type(layer: &LayerFrame) -> OpType {
    if layer.backdrop.is_some() {
        OpType::SaveLayerBackdrop
    } else {
        OpType::SaveLayer
    }
}

fn offset_u32(offset: usize) -> Result<u32, StorageError> {
    u32::try_from(offset).map_err(|_| StorageError::CapacityOverflow)
}

/// Device bounds of filtered layer content, or `None` if unbounded.
fn filter_device_bounds(
    filter: &ImageFilter,
    content: Rect,
    transform: Transform3d,
) -> Option<Rect> {
    let affine = transform.to_affine().filter(|a| a.determinant() != 0.0)?;
    let local = affine.inverse().transform_rect_bbox(content);
    let filtered = filter.map_bounds(local)?;
    Some(affine.transform_rect_bbox(filtered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use crate::paint::BlurStyle;

    const CULL: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    fn ids() -> IdCounter {
        IdCounter::new(1)
    }

    fn ops(rec: &Recording) -> Vec<OpType> {
        rec.ops().map(|op| op.op_type()).collect()
    }

    #[test]
    fn empty_recording() {
        let rec = Recorder::new(CULL).build_with_ids(&ids()).unwrap();
        assert_eq!(rec.op_count(false), 0);
        assert_eq!(rec.bounds(), Rect::ZERO);
        assert!(rec.can_apply_group_opacity());
        assert!(rec.is_ui_thread_safe());
        assert!(!rec.modifies_transparent_black());
        assert!(rec.has_rtree());
        assert_eq!(rec.unique_id(), 1);
    }

    #[test]
    fn redundant_attributes_are_not_written() {
        let mut r = Recorder::new(CULL);
        r.set_color(Color::BLACK).unwrap();
        r.set_blend_mode(BlendMode::SrcOver).unwrap();
        r.set_color(Color::WHITE).unwrap();
        r.set_color(Color::WHITE).unwrap();
        r.set_mask_filter(None).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(ops(&rec), [OpType::SetColor]);
    }

    #[test]
    fn fill_bounds_follow_transform_and_clip() {
        let mut r = Recorder::new(CULL);
        r.translate(10.0, 20.0).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(85.0, 0.0, 200.0, 5.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), Rect::new(10.0, 20.0, 100.0, 30.0));
    }

    #[test]
    fn stroke_and_mask_outsets() {
        let mut r = Recorder::new(Rect::new(-100.0, -100.0, 100.0, 100.0));
        r.set_style(DrawStyle::Stroke).unwrap();
        r.set_stroke_width(4.0).unwrap();
        r.set_stroke_join(Join::Round).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        let stroked = r.build_with_ids(&ids()).unwrap();
        assert_eq!(stroked.bounds(), Rect::new(-2.0, -2.0, 12.0, 12.0));

        let mut r = Recorder::new(Rect::new(-100.0, -100.0, 100.0, 100.0));
        r.set_mask_filter(Some(MaskFilter {
            style: BlurStyle::Normal,
            sigma: 1.0,
        }))
        .unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        let blurred = r.build_with_ids(&ids()).unwrap();
        assert_eq!(blurred.bounds(), Rect::new(-3.0, -3.0, 13.0, 13.0));
    }

    #[test]
    fn hairlines_pad_in_device_space() {
        let mut r = Recorder::new(CULL);
        r.scale(10.0, 10.0).unwrap();
        r.draw_line(Point::new(1.0, 1.0), Point::new(5.0, 1.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), Rect::new(9.0, 9.0, 51.0, 11.0));
    }

    #[test]
    fn fully_clipped_draws_have_no_bounds() {
        let mut r = Recorder::new(CULL);
        r.clip_rect(Rect::new(0.0, 0.0, 10.0, 10.0), ClipOp::Intersect, false)
            .unwrap();
        r.draw_rect(Rect::new(50.0, 50.0, 60.0, 60.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.op_count(false), 2);
        assert_eq!(rec.bounds(), Rect::ZERO);
        assert!(!rec.modifies_transparent_black());
        assert!(rec.rtree().unwrap().is_empty());
    }

    #[test]
    fn difference_clip_does_not_shrink_bounds() {
        let mut r = Recorder::new(CULL);
        r.clip_rect(Rect::new(0.0, 0.0, 50.0, 50.0), ClipOp::Difference, false)
            .unwrap();
        r.draw_paint().unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), CULL);
    }

    #[test]
    fn restore_pops_transform_and_clip() {
        let mut r = Recorder::new(CULL);
        r.save().unwrap();
        r.translate(5.0, 5.0).unwrap();
        r.clip_rect(Rect::new(0.0, 0.0, 10.0, 10.0), ClipOp::Intersect, false)
            .unwrap();
        assert_eq!(r.save_count(), 2);
        assert_eq!(r.device_clip_bounds(), Rect::new(5.0, 5.0, 15.0, 15.0));
        r.restore().unwrap();
        assert_eq!(r.save_count(), 1);
        assert_eq!(r.transform(), Transform3d::IDENTITY);
        assert_eq!(r.device_clip_bounds(), CULL);
    }

    #[test]
    #[should_panic(expected = "restore without a matching save")]
    fn unbalanced_restore_panics() {
        let mut r = Recorder::new(CULL);
        let _ = r.restore();
    }

    #[test]
    fn build_closes_open_saves() {
        let mut r = Recorder::new(CULL);
        r.save().unwrap();
        r.save_layer(None, SaveLayerOptions::NO_ATTRIBUTES).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(
            ops(&rec),
            [
                OpType::Save,
                OpType::SaveLayer,
                OpType::DrawRect,
                OpType::Restore,
                OpType::Restore
            ]
        );
    }

    #[test]
    fn save_records_are_patched_with_their_restore() {
        let mut r = Recorder::new(CULL);
        r.save().unwrap();
        r.set_color(Color::WHITE).unwrap();
        r.restore().unwrap();
        r.save().unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        r.restore().unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        let headers: Vec<_> = rec
            .storage()
            .records()
            .filter(|rec| rec.op_type().is_save())
            .map(|rec| crate::op::block_header(&rec))
            .collect();
        assert_eq!(headers[0].restore_index, 2);
        assert_eq!(headers[0].flags & SAVE_HAS_ATTRIBUTES, SAVE_HAS_ATTRIBUTES);
        assert_eq!(headers[1].restore_index, 5);
        assert_eq!(headers[1].flags & SAVE_HAS_ATTRIBUTES, 0);
        let restore = rec
            .storage()
            .records_from(headers[1].restore_offset as usize)
            .next()
            .unwrap();
        assert_eq!(restore.op_type(), OpType::Restore);
    }

    #[test]
    fn disjoint_draws_allow_group_opacity() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(20.0, 0.0, 30.0, 10.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(rec.can_apply_group_opacity());
    }

    #[test]
    fn overlapping_draws_forbid_group_opacity() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(5.0, 5.0, 15.0, 15.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(!rec.can_apply_group_opacity());
    }

    #[test]
    fn touching_draws_still_allow_group_opacity() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(10.0, 0.0, 20.0, 10.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(rec.can_apply_group_opacity());
    }

    #[test]
    fn non_src_over_blend_forbids_group_opacity() {
        let mut r = Recorder::new(CULL);
        r.set_blend_mode(BlendMode::Src).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(!rec.can_apply_group_opacity());
    }

    #[test]
    fn layer_with_compatible_content_can_distribute_opacity() {
        let mut r = Recorder::new(CULL);
        r.save_layer(None, SaveLayerOptions::WITH_ATTRIBUTES).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(20.0, 0.0, 30.0, 10.0)).unwrap();
        r.restore().unwrap();
        r.save_layer(None, SaveLayerOptions::ALL).unwrap();
        r.draw_rect(Rect::new(40.0, 0.0, 50.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(45.0, 0.0, 55.0, 10.0)).unwrap();
        r.restore().unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        let layers: Vec<_> = rec
            .ops()
            .filter_map(|op| match op {
                Op::SaveLayer { options, .. } => Some(options),
                _ => None,
            })
            .collect();
        assert_eq!(layers[0], SaveLayerOptions::ALL);
        assert_eq!(
            layers[1],
            SaveLayerOptions::WITH_ATTRIBUTES,
            "caller hints are dropped and overlap is detected"
        );
        assert!(
            rec.can_apply_group_opacity(),
            "each layer composites as one disjoint primitive"
        );
    }

    #[test]
    fn layers_act_as_one_primitive() {
        let mut r = Recorder::new(CULL);
        r.save_layer(None, SaveLayerOptions::NO_ATTRIBUTES).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_rect(Rect::new(5.0, 5.0, 15.0, 15.0)).unwrap();
        r.restore().unwrap();
        r.draw_rect(Rect::new(50.0, 50.0, 60.0, 60.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(rec.can_apply_group_opacity());
    }

    #[test]
    fn transparent_black_tracking() {
        let mut r = Recorder::new(CULL);
        r.set_color(Color::TRANSPARENT).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.set_color(Color::BLACK).unwrap();
        r.set_blend_mode(BlendMode::DstIn).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        r.draw_color(Color::TRANSPARENT, BlendMode::Src).unwrap();
        let quiet = r.build_with_ids(&ids()).unwrap();
        assert!(!quiet.modifies_transparent_black());

        let mut r = Recorder::new(CULL);
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        let loud = r.build_with_ids(&ids()).unwrap();
        assert!(loud.modifies_transparent_black());
    }

    #[test]
    fn flooding_color_filter_is_unbounded_and_modifies() {
        let mut m = [0.0_f32; 20];
        m[19] = 1.0;
        let mut r = Recorder::new(CULL);
        r.set_color(Color::TRANSPARENT).unwrap();
        r.set_color_filter(Some(Arc::new(ColorFilter::Matrix(m)))).unwrap();
        r.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(rec.modifies_transparent_black());
        assert_eq!(rec.bounds(), CULL);
    }

    #[test]
    fn image_filter_layer_expands_child_entries() {
        let mut r = Recorder::new(CULL);
        r.set_image_filter(Some(Arc::new(ImageFilter::Blur {
            sigma_x: 2.0,
            sigma_y: 2.0,
        })))
        .unwrap();
        r.save_layer(None, SaveLayerOptions::WITH_ATTRIBUTES).unwrap();
        r.set_image_filter(None).unwrap();
        r.draw_rect(Rect::new(40.0, 40.0, 50.0, 50.0)).unwrap();
        r.restore().unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), Rect::new(34.0, 34.0, 56.0, 56.0));
        let hits = rec.rtree().unwrap().search(Rect::new(35.0, 35.0, 36.0, 36.0));
        assert!(hits.contains(&3), "draw is reachable through the blur: {hits:?}");
    }

    #[test]
    fn thread_affine_images_are_reported() {
        let mut r = Recorder::new(CULL);
        r.draw_image(
            Arc::new(Image::new(1, 4, 4)),
            Point::ZERO,
            Sampling::Linear,
            false,
        )
        .unwrap();
        let safe = r.build_with_ids(&ids()).unwrap();
        assert!(safe.is_ui_thread_safe());

        let mut r = Recorder::new(CULL);
        r.set_color_source(Some(Arc::new(ColorSource::Image {
            image: Arc::new(Image::thread_affine(2, 4, 4)),
            sampling: Sampling::Nearest,
        })))
        .unwrap();
        let via_source = r.build_with_ids(&ids()).unwrap();
        assert!(!via_source.is_ui_thread_safe());

        let mut outer = Recorder::new(CULL);
        outer.draw_display_list(via_source, 1.0).unwrap();
        assert!(!outer.build_with_ids(&ids()).unwrap().is_ui_thread_safe());
    }

    #[test]
    fn nested_accounting() {
        let mut inner = Recorder::new(CULL);
        inner.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        inner.draw_oval(Rect::new(20.0, 20.0, 30.0, 30.0)).unwrap();
        let inner = inner.build_with_ids(&ids()).unwrap();

        let mut outer = Recorder::new(CULL);
        outer.draw_rect(Rect::new(50.0, 50.0, 60.0, 60.0)).unwrap();
        outer.draw_display_list(inner.clone(), 1.0).unwrap();
        let outer = outer.build_with_ids(&ids()).unwrap();

        assert_eq!(outer.op_count(false), 2);
        assert_eq!(outer.op_count(true), 4);
        assert_eq!(outer.bytes(true), outer.bytes(false) + inner.bytes(true));
        assert_eq!(outer.bounds(), Rect::new(0.0, 0.0, 60.0, 60.0));
    }

    #[test]
    fn points_record_all_coordinates() {
        let pts = [Point::new(1.0, 2.0), Point::new(3.0, 4.0), Point::new(5.0, 6.0)];
        let mut r = Recorder::new(CULL);
        r.draw_points(PointMode::Polygon, &pts).unwrap();
        r.draw_points(PointMode::Points, &[]).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        let decoded: Vec<_> = rec.ops().collect();
        match &decoded[0] {
            Op::DrawPoints { mode, points } => {
                assert_eq!(*mode, PointMode::Polygon);
                assert_eq!(points.iter().collect::<Vec<_>>(), pts);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&decoded[1], Op::DrawPoints { points, .. } if points.is_empty()));
        assert_eq!(rec.bounds(), Rect::new(0.0, 1.0, 6.0, 7.0));
    }

    #[test]
    fn identity_transforms_are_skipped() {
        let mut r = Recorder::new(CULL);
        r.translate(0.0, 0.0).unwrap();
        r.scale(1.0, 1.0).unwrap();
        r.rotate(0.0).unwrap();
        r.skew(0.0, 0.0).unwrap();
        r.transform_2d_affine(Affine::IDENTITY).unwrap();
        r.transform_full_perspective(Transform3d::IDENTITY).unwrap();
        assert_eq!(r.op_count(), 0);
        r.transform_reset().unwrap();
        assert_eq!(r.op_count(), 1);
    }

    #[test]
    fn without_rtree() {
        let mut r = Recorder::new(CULL).with_rtree(false);
        r.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert!(!rec.has_rtree());
        assert_eq!(rec.bounds(), Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn path_effects_are_recorded_and_keep_bounds() {
        let dash = Arc::new(PathEffect::Dash {
            intervals: alloc::vec![4.0, 2.0],
            phase: 0.0,
        });
        let mut r = Recorder::new(CULL);
        r.set_path_effect(Some(dash.clone())).unwrap();
        r.set_path_effect(Some(Arc::new((*dash).clone()))).unwrap();
        r.draw_rect(Rect::new(10.0, 10.0, 20.0, 20.0)).unwrap();
        r.set_path_effect(None).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(
            ops(&rec),
            [OpType::SetPathEffect, OpType::DrawRect, OpType::ClearPathEffect],
            "an equal effect is redundant"
        );
        assert_eq!(rec.bounds(), Rect::new(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn vertices_cover_their_positions_and_forbid_group_opacity() {
        let mesh = Vertices::new(
            crate::paint::VertexMode::Triangles,
            alloc::vec![
                Point::new(10.0, 10.0),
                Point::new(30.0, 10.0),
                Point::new(20.0, 40.0),
            ],
        );
        let mut r = Recorder::new(CULL);
        r.draw_vertices(Arc::new(mesh.clone()), BlendMode::Modulate).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), Rect::new(10.0, 10.0, 30.0, 40.0));
        assert!(!rec.can_apply_group_opacity());
        match rec.ops().next() {
            Some(Op::DrawVertices { vertices, mode }) => {
                assert_eq!(**vertices, mesh);
                assert_eq!(mode, BlendMode::Modulate);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn atlas_bounds_come_from_sprites_or_cull_rect() {
        let atlas = Arc::new(Image::new(1, 64, 64));
        let transforms = [RsTransform::translate(10.0, 10.0), RsTransform::translate(50.0, 20.0)];
        let texture_rects = [Rect::new(0.0, 0.0, 8.0, 8.0), Rect::new(8.0, 0.0, 24.0, 4.0)];
        let colors = [Color::WHITE, Color::BLACK];

        let mut r = Recorder::new(CULL);
        r.draw_atlas(
            atlas.clone(),
            &transforms,
            &texture_rects,
            Some(&colors),
            BlendMode::Modulate,
            Sampling::Linear,
            None,
            false,
        )
        .unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.bounds(), Rect::new(10.0, 10.0, 66.0, 24.0));
        assert!(!rec.can_apply_group_opacity());
        match rec.ops().next() {
            Some(Op::DrawAtlas {
                sprites,
                mode,
                cull_rect,
                with_attributes,
                ..
            }) => {
                assert_eq!(sprites.transforms().collect::<Vec<_>>(), transforms);
                assert_eq!(sprites.texture_rects().collect::<Vec<_>>(), texture_rects);
                let decoded: Option<Vec<_>> = sprites.colors().map(Iterator::collect);
                assert_eq!(decoded.as_deref(), Some(&colors[..]));
                assert_eq!(mode, BlendMode::Modulate);
                assert_eq!(cull_rect, None);
                assert!(!with_attributes);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut r = Recorder::new(CULL);
        let promised = Rect::new(0.0, 0.0, 80.0, 30.0);
        r.draw_atlas(
            atlas,
            &transforms,
            &texture_rects,
            None,
            BlendMode::SrcOver,
            Sampling::Nearest,
            Some(promised),
            true,
        )
        .unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(ops(&rec), [OpType::DrawAtlasCulled]);
        assert_eq!(rec.bounds(), promised);
    }

    #[test]
    #[should_panic(expected = "one texture rect per sprite")]
    fn atlas_lengths_must_match() {
        let mut r = Recorder::new(CULL);
        let _ = r.draw_atlas(
            Arc::new(Image::new(1, 8, 8)),
            &[RsTransform::translate(0.0, 0.0)],
            &[],
            None,
            BlendMode::SrcOver,
            Sampling::Nearest,
            None,
            false,
        );
    }

    #[test]
    fn failed_writes_leave_no_trace() {
        let mut inner = Recorder::new(CULL);
        inner.draw_image(
            Arc::new(Image::thread_affine(1, 4, 4)),
            Point::ZERO,
            Sampling::Linear,
            false,
        )
        .unwrap();
        let inner = inner.build_with_ids(&ids()).unwrap();

        let mut r = Recorder::new(CULL);
        r.op_count = u32::MAX;
        let overflow = Err(StorageError::CapacityOverflow);
        assert_eq!(r.draw_display_list(inner, 1.0), overflow);
        assert_eq!(r.draw_path(Arc::new(BezPath::new())), overflow);
        let affine = Arc::new(Image::thread_affine(2, 4, 4));
        assert_eq!(
            r.draw_image(affine, Point::ZERO, Sampling::Linear, false),
            overflow
        );
        assert_eq!(
            r.set_color_filter(Some(Arc::new(ColorFilter::SrgbToLinear))),
            overflow
        );
        assert_eq!(r.draw_points(PointMode::Points, &[Point::ZERO]), overflow);

        assert_eq!(r.storage.used(), 0);
        assert_eq!(r.storage.resource_slots(), 0, "slots are released again");
        assert_eq!(r.op_count, u32::MAX);
        assert_eq!(r.nested_op_count, 0);
        assert_eq!(r.nested_byte_count, 0);
        assert_eq!(r.attribute_ops, 0);
        assert!(r.is_ui_thread_safe);
        assert!(r.attrs.color_filter.is_none());
    }

    #[test]
    fn build_shrinks_to_used() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let rec = r.build_with_ids(&ids()).unwrap();
        assert_eq!(rec.storage().allocated(), rec.storage().used());
        assert_eq!(rec.storage().used(), 1 + size_of::<RectPayload>());
    }
}
