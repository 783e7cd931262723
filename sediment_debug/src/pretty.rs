// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable dispatch output.
//!
//! [`PrettyPrintReceiver`] implements [`OpReceiver`] and writes one line per
//! op to a [`Write`](std::io::Write) destination (default: stderr), indented
//! by save depth. [`PrettyPrintSink`] implements [`DispatchSink`] and writes
//! one line per culling decision.

use std::io::Write;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Cap, Join, Point, Rect, RoundedRect, Shape, Vec2};

use sediment_core::op::{AtlasSprites, PointsView};
use sediment_core::options::SaveLayerOptions;
use sediment_core::paint::{
    BlendMode, ClipOp, Color, DrawStyle, MaskFilter, PointMode, Sampling, SrcRectConstraint,
};
use sediment_core::receiver::OpReceiver;
use sediment_core::recording::Recording;
use sediment_core::resource::{
    ColorFilter, ColorSource, Image, ImageFilter, PathEffect, TextBlob, Vertices,
};
use sediment_core::trace::{
    BlockCulledEvent, DispatchBeginEvent, DispatchSink, DispatchSummary, OpEvent,
};
use sediment_core::transform::Transform3d;

fn rect(r: Rect) -> String {
    format!("[{}, {}, {}, {}]", r.x0, r.y0, r.x1, r.y1)
}

fn point(p: Point) -> String {
    format!("({}, {})", p.x, p.y)
}

fn rrect(r: RoundedRect) -> String {
    let radii = r.radii();
    format!(
        "{} radii=[{}, {}, {}, {}]",
        rect(r.rect()),
        radii.top_left,
        radii.top_right,
        radii.bottom_right,
        radii.bottom_left
    )
}

/// Writes one indented line per dispatched op.
pub struct PrettyPrintReceiver<W: Write = Box<dyn Write>> {
    writer: W,
    depth: usize,
    expand_nested: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintReceiver<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintReceiver")
            .field("depth", &self.depth)
            .field("expand_nested", &self.expand_nested)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintReceiver {
    /// Creates a receiver that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    /// Creates a receiver that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self::with_writer(writer)
    }
}

impl<W: Write> PrettyPrintReceiver<W> {
    /// Creates a receiver that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            depth: 0,
            expand_nested: false,
        }
    }

    /// Prints nested recordings inline instead of as one line.
    #[must_use]
    pub fn expanding_nested(mut self, expand: bool) -> Self {
        self.expand_nested = expand;
        self
    }

    /// Consumes the receiver and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        let _ = writeln!(self.writer, "{:indent$}{text}", "", indent = self.depth * 2);
    }
}

impl<W: Write> OpReceiver for PrettyPrintReceiver<W> {
    fn expand_nested(&self) -> bool {
        self.expand_nested
    }

    fn set_anti_alias(&mut self, aa: bool) {
        self.line(format_args!("set_anti_alias {aa}"));
    }

    fn set_dither(&mut self, dither: bool) {
        self.line(format_args!("set_dither {dither}"));
    }

    fn set_invert_colors(&mut self, invert: bool) {
        self.line(format_args!("set_invert_colors {invert}"));
    }

    fn set_stroke_cap(&mut self, cap: Cap) {
        self.line(format_args!("set_stroke_cap {cap:?}"));
    }

    fn set_stroke_join(&mut self, join: Join) {
        self.line(format_args!("set_stroke_join {join:?}"));
    }

    fn set_style(&mut self, style: DrawStyle) {
        self.line(format_args!("set_style {style:?}"));
    }

    fn set_stroke_width(&mut self, width: f64) {
        self.line(format_args!("set_stroke_width {width}"));
    }

    fn set_stroke_miter(&mut self, limit: f64) {
        self.line(format_args!("set_stroke_miter {limit}"));
    }

    fn set_color(&mut self, color: Color) {
        self.line(format_args!("set_color #{:08X}", color.0));
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.line(format_args!("set_blend_mode {mode:?}"));
    }

    fn set_mask_filter(&mut self, filter: MaskFilter) {
        self.line(format_args!(
            "set_mask_filter {:?} sigma={}",
            filter.style, filter.sigma
        ));
    }

    fn clear_mask_filter(&mut self) {
        self.line(format_args!("clear_mask_filter"));
    }

    fn set_color_filter(&mut self, filter: &Arc<ColorFilter>) {
        self.line(format_args!("set_color_filter {filter:?}"));
    }

    fn clear_color_filter(&mut self) {
        self.line(format_args!("clear_color_filter"));
    }

    fn set_image_filter(&mut self, filter: &Arc<ImageFilter>) {
        self.line(format_args!("set_image_filter {filter:?}"));
    }

    fn clear_image_filter(&mut self) {
        self.line(format_args!("clear_image_filter"));
    }

    fn set_color_source(&mut self, source: &Arc<ColorSource>) {
        let kind = match **source {
            ColorSource::Image { .. } => "image",
            ColorSource::LinearGradient { .. } => "linear_gradient",
            ColorSource::RadialGradient { .. } => "radial_gradient",
            ColorSource::RuntimeEffect { .. } => "runtime_effect",
        };
        self.line(format_args!("set_color_source {kind}"));
    }

    fn clear_color_source(&mut self) {
        self.line(format_args!("clear_color_source"));
    }

    fn set_path_effect(&mut self, effect: &Arc<PathEffect>) {
        match &**effect {
            PathEffect::Dash { intervals, phase } => {
                self.line(format_args!("set_path_effect dash {intervals:?} phase={phase}"));
            }
        }
    }

    fn clear_path_effect(&mut self) {
        self.line(format_args!("clear_path_effect"));
    }

    fn save(&mut self) {
        self.line(format_args!("save"));
        self.depth += 1;
    }

    fn save_layer(
        &mut self,
        bounds: Option<Rect>,
        options: SaveLayerOptions,
        backdrop: Option<&Arc<ImageFilter>>,
    ) {
        let bounds = bounds.map_or_else(|| "none".to_owned(), rect);
        let backdrop = if backdrop.is_some() { " backdrop" } else { "" };
        self.line(format_args!(
            "save_layer bounds={bounds} attributes={} distribute_opacity={}{backdrop}",
            options.renders_with_attributes(),
            options.can_distribute_opacity(),
        ));
        self.depth += 1;
    }

    fn restore(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line(format_args!("restore"));
    }

    fn translate(&mut self, delta: Vec2) {
        self.line(format_args!("translate {} {}", delta.x, delta.y));
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.line(format_args!("scale {sx} {sy}"));
    }

    fn rotate(&mut self, degrees: f64) {
        self.line(format_args!("rotate {degrees}°"));
    }

    fn skew(&mut self, sx: f64, sy: f64) {
        self.line(format_args!("skew {sx} {sy}"));
    }

    fn transform_2d_affine(&mut self, transform: Affine) {
        self.line(format_args!("transform_2d_affine {:?}", transform.as_coeffs()));
    }

    fn transform_full_perspective(&mut self, transform: Transform3d) {
        self.line(format_args!(
            "transform_full_perspective {:?}",
            transform.to_cols_array_2d()
        ));
    }

    fn transform_reset(&mut self) {
        self.line(format_args!("transform_reset"));
    }

    fn clip_rect(&mut self, r: Rect, op: ClipOp, anti_alias: bool) {
        self.line(format_args!("clip_rect {} {op:?} aa={anti_alias}", rect(r)));
    }

    fn clip_rounded_rect(&mut self, r: RoundedRect, op: ClipOp, anti_alias: bool) {
        self.line(format_args!(
            "clip_rounded_rect {} {op:?} aa={anti_alias}",
            rrect(r)
        ));
    }

    fn clip_path(&mut self, path: &Arc<BezPath>, op: ClipOp, anti_alias: bool) {
        self.line(format_args!(
            "clip_path bbox={} {op:?} aa={anti_alias}",
            rect(path.bounding_box())
        ));
    }

    fn draw_paint(&mut self) {
        self.line(format_args!("draw_paint"));
    }

    fn draw_color(&mut self, color: Color, mode: BlendMode) {
        self.line(format_args!("draw_color #{:08X} {mode:?}", color.0));
    }

    fn draw_line(&mut self, p0: Point, p1: Point) {
        self.line(format_args!("draw_line {} {}", point(p0), point(p1)));
    }

    fn draw_rect(&mut self, r: Rect) {
        self.line(format_args!("draw_rect {}", rect(r)));
    }

    fn draw_oval(&mut self, bounds: Rect) {
        self.line(format_args!("draw_oval {}", rect(bounds)));
    }

    fn draw_circle(&mut self, center: Point, radius: f64) {
        self.line(format_args!("draw_circle {} r={radius}", point(center)));
    }

    fn draw_rounded_rect(&mut self, r: RoundedRect) {
        self.line(format_args!("draw_rounded_rect {}", rrect(r)));
    }

    fn draw_double_rounded_rect(&mut self, outer: RoundedRect, inner: RoundedRect) {
        self.line(format_args!(
            "draw_double_rounded_rect outer={} inner={}",
            rrect(outer),
            rrect(inner)
        ));
    }

    fn draw_arc(&mut self, oval: Rect, start_degrees: f64, sweep_degrees: f64, use_center: bool) {
        self.line(format_args!(
            "draw_arc {} start={start_degrees}° sweep={sweep_degrees}° center={use_center}",
            rect(oval)
        ));
    }

    fn draw_path(&mut self, path: &Arc<BezPath>) {
        self.line(format_args!(
            "draw_path bbox={} elements={}",
            rect(path.bounding_box()),
            path.elements().len()
        ));
    }

    fn draw_points(&mut self, mode: PointMode, points: PointsView<'_>) {
        self.line(format_args!("draw_points {mode:?} count={}", points.len()));
    }

    fn draw_vertices(&mut self, vertices: &Arc<Vertices>, mode: BlendMode) {
        self.line(format_args!(
            "draw_vertices {:?} count={} {mode:?}",
            vertices.mode,
            vertices.positions.len()
        ));
    }

    fn draw_image(
        &mut self,
        image: &Arc<Image>,
        p: Point,
        sampling: Sampling,
        with_attributes: bool,
    ) {
        self.line(format_args!(
            "draw_image id={} at {} {sampling:?} attributes={with_attributes}",
            image.id,
            point(p)
        ));
    }

    fn draw_image_rect(
        &mut self,
        image: &Arc<Image>,
        src: Rect,
        dst: Rect,
        sampling: Sampling,
        with_attributes: bool,
        constraint: SrcRectConstraint,
    ) {
        self.line(format_args!(
            "draw_image_rect id={} src={} dst={} {sampling:?} attributes={with_attributes} {constraint:?}",
            image.id,
            rect(src),
            rect(dst)
        ));
    }

    fn draw_image_nine(
        &mut self,
        image: &Arc<Image>,
        center: Rect,
        dst: Rect,
        filter: Sampling,
        with_attributes: bool,
    ) {
        self.line(format_args!(
            "draw_image_nine id={} center={} dst={} {filter:?} attributes={with_attributes}",
            image.id,
            rect(center),
            rect(dst)
        ));
    }

    fn draw_atlas(
        &mut self,
        atlas: &Arc<Image>,
        sprites: AtlasSprites<'_>,
        mode: BlendMode,
        sampling: Sampling,
        cull_rect: Option<Rect>,
        with_attributes: bool,
    ) {
        let cull = cull_rect.map_or_else(|| "none".to_owned(), rect);
        self.line(format_args!(
            "draw_atlas id={} sprites={} colors={} {mode:?} {sampling:?} cull={cull} attributes={with_attributes}",
            atlas.id,
            sprites.len(),
            sprites.colors().is_some()
        ));
    }

    fn draw_text_blob(&mut self, blob: &Arc<TextBlob>, origin: Point) {
        self.line(format_args!(
            "draw_text_blob id={} at {}",
            blob.id,
            point(origin)
        ));
    }

    fn draw_shadow(
        &mut self,
        path: &Arc<BezPath>,
        color: Color,
        elevation: f64,
        transparent_occluder: bool,
        dpr: f64,
    ) {
        self.line(format_args!(
            "draw_shadow bbox={} #{:08X} elevation={elevation} transparent={transparent_occluder} dpr={dpr}",
            rect(path.bounding_box()),
            color.0
        ));
    }

    fn draw_display_list(&mut self, recording: &Arc<Recording>, opacity: f64) {
        self.line(format_args!(
            "draw_display_list id={} ops={} opacity={opacity}",
            recording.unique_id(),
            recording.op_count(false)
        ));
    }
}

/// Writes one trace line per dispatch decision.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DispatchSink for PrettyPrintSink<W> {
    fn on_dispatch_begin(&mut self, e: &DispatchBeginEvent) {
        let cull = e.cull_rect.map_or_else(|| "none".to_owned(), rect);
        let _ = writeln!(
            self.writer,
            "[begin] list={} ops={} cull={cull} rtree={}",
            e.unique_id, e.op_count, e.has_rtree,
        );
    }

    fn on_op_visited(&mut self, e: &OpEvent) {
        let _ = writeln!(
            self.writer,
            "[visit] list={} #{} {:?}",
            e.unique_id, e.op_index, e.op_type,
        );
    }

    fn on_op_culled(&mut self, e: &OpEvent) {
        let _ = writeln!(
            self.writer,
            "[cull] list={} #{} {:?}",
            e.unique_id, e.op_index, e.op_type,
        );
    }

    fn on_block_culled(&mut self, e: &BlockCulledEvent) {
        let _ = writeln!(
            self.writer,
            "[cull:block] list={} #{}..=#{}",
            e.unique_id, e.save_index, e.restore_index,
        );
    }

    fn on_dispatch_end(&mut self, s: &DispatchSummary) {
        let _ = writeln!(
            self.writer,
            "[end] list={} visited={} culled={}",
            s.unique_id, s.visited, s.culled,
        );
    }
}
