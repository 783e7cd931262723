// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The visitor that dispatch drives.
//!
//! [`OpReceiver`] has one method per record kind. Every method defaults to a
//! no-op, so a receiver implements only what it consumes: a bounds counter
//! can implement just the draw methods, a renderer implements everything.

use alloc::sync::Arc;

use kurbo::{Affine, BezPath, Cap, Join, Point, Rect, RoundedRect, Vec2};

use crate::op::{AtlasSprites, PointsView};
use crate::options::SaveLayerOptions;
use crate::paint::{
    BlendMode, ClipOp, Color, DrawStyle, MaskFilter, PointMode, Sampling, SrcRectConstraint,
};
use crate::recording::Recording;
use crate::resource::{
    ColorFilter, ColorSource, Image, ImageFilter, PathEffect, TextBlob, Vertices,
};
use crate::transform::Transform3d;

/// Receives decoded operations from [`Recording::dispatch`] in record order.
///
/// Dispatch borrows the recording for the duration of each call. Receivers
/// that keep a resource past the call clone its [`Arc`].
#[expect(unused_variables, reason = "default bodies ignore their arguments")]
pub trait OpReceiver {
    /// Whether nested recordings should be replayed inline.
    ///
    /// When `true`, a nested recording drawn at full opacity arrives as
    /// `save()`, its own operations, then `restore()`. Otherwise it arrives
    /// as one [`draw_display_list`](Self::draw_display_list) call.
    fn expand_nested(&self) -> bool {
        false
    }

    // -- attributes ---------------------------------------------------------

    /// Sets anti-aliasing.
    fn set_anti_alias(&mut self, aa: bool) {}
    /// Sets dithering.
    fn set_dither(&mut self, dither: bool) {}
    /// Sets color inversion.
    fn set_invert_colors(&mut self, invert: bool) {}
    /// Sets the stroke cap.
    fn set_stroke_cap(&mut self, cap: Cap) {}
    /// Sets the stroke join.
    fn set_stroke_join(&mut self, join: Join) {}
    /// Sets fill or stroke style.
    fn set_style(&mut self, style: DrawStyle) {}
    /// Sets the stroke width; zero means hairline.
    fn set_stroke_width(&mut self, width: f64) {}
    /// Sets the miter limit.
    fn set_stroke_miter(&mut self, limit: f64) {}
    /// Sets the flat color.
    fn set_color(&mut self, color: Color) {}
    /// Sets the blend mode.
    fn set_blend_mode(&mut self, mode: BlendMode) {}
    /// Sets the mask filter.
    fn set_mask_filter(&mut self, filter: MaskFilter) {}
    /// Clears the mask filter.
    fn clear_mask_filter(&mut self) {}
    /// Sets the color filter.
    fn set_color_filter(&mut self, filter: &Arc<ColorFilter>) {}
    /// Clears the color filter.
    fn clear_color_filter(&mut self) {}
    /// Sets the image filter.
    fn set_image_filter(&mut self, filter: &Arc<ImageFilter>) {}
    /// Clears the image filter.
    fn clear_image_filter(&mut self) {}
    /// Sets the color source.
    fn set_color_source(&mut self, source: &Arc<ColorSource>) {}
    /// Clears the color source.
    fn clear_color_source(&mut self) {}
    /// Sets the path effect.
    fn set_path_effect(&mut self, effect: &Arc<PathEffect>) {}
    /// Clears the path effect.
    fn clear_path_effect(&mut self) {}

    // -- save / restore -----------------------------------------------------

    /// Pushes transform and clip state.
    fn save(&mut self) {}

    /// Pushes state and opens an offscreen layer.
    ///
    /// `backdrop` is set for layers recorded with a backdrop filter.
    fn save_layer(
        &mut self,
        bounds: Option<Rect>,
        options: SaveLayerOptions,
        backdrop: Option<&Arc<ImageFilter>>,
    ) {
    }

    /// Pops to the matching save, compositing a layer if one was opened.
    fn restore(&mut self) {}

    // -- transforms ---------------------------------------------------------

    /// Concatenates a translation.
    fn translate(&mut self, delta: Vec2) {}
    /// Concatenates a scale.
    fn scale(&mut self, sx: f64, sy: f64) {}
    /// Concatenates a rotation in degrees.
    fn rotate(&mut self, degrees: f64) {}
    /// Concatenates a skew.
    fn skew(&mut self, sx: f64, sy: f64) {}
    /// Concatenates a 2-D affine transform.
    fn transform_2d_affine(&mut self, transform: Affine) {}
    /// Concatenates a full 4×4 transform.
    fn transform_full_perspective(&mut self, transform: Transform3d) {}
    /// Replaces the current transform with the identity.
    fn transform_reset(&mut self) {}

    // -- clips --------------------------------------------------------------

    /// Clips to a rectangle.
    fn clip_rect(&mut self, rect: Rect, op: ClipOp, anti_alias: bool) {}
    /// Clips to a rounded rectangle.
    fn clip_rounded_rect(&mut self, rrect: RoundedRect, op: ClipOp, anti_alias: bool) {}
    /// Clips to a path.
    fn clip_path(&mut self, path: &Arc<BezPath>, op: ClipOp, anti_alias: bool) {}

    // -- draws --------------------------------------------------------------

    /// Fills the clip with the current attributes.
    fn draw_paint(&mut self) {}
    /// Fills the clip with a color.
    fn draw_color(&mut self, color: Color, mode: BlendMode) {}
    /// Draws a line segment.
    fn draw_line(&mut self, p0: Point, p1: Point) {}
    /// Draws a rectangle.
    fn draw_rect(&mut self, rect: Rect) {}
    /// Draws the oval inscribed in a rectangle.
    fn draw_oval(&mut self, bounds: Rect) {}
    /// Draws a circle.
    fn draw_circle(&mut self, center: Point, radius: f64) {}
    /// Draws a rounded rectangle.
    fn draw_rounded_rect(&mut self, rrect: RoundedRect) {}
    /// Draws the area between two rounded rectangles.
    fn draw_double_rounded_rect(&mut self, outer: RoundedRect, inner: RoundedRect) {}
    /// Draws an arc of the oval inscribed in `oval`.
    fn draw_arc(&mut self, oval: Rect, start_degrees: f64, sweep_degrees: f64, use_center: bool) {
    }
    /// Draws a path.
    fn draw_path(&mut self, path: &Arc<BezPath>) {}
    /// Draws a list of points.
    fn draw_points(&mut self, mode: PointMode, points: PointsView<'_>) {}
    /// Draws a triangle mesh, blending vertex colors with `mode`.
    fn draw_vertices(&mut self, vertices: &Arc<Vertices>, mode: BlendMode) {}
    /// Draws an image with its top-left corner at `point`.
    fn draw_image(
        &mut self,
        image: &Arc<Image>,
        point: Point,
        sampling: Sampling,
        with_attributes: bool,
    ) {
    }
    /// Draws part of an image into a rectangle.
    fn draw_image_rect(
        &mut self,
        image: &Arc<Image>,
        src: Rect,
        dst: Rect,
        sampling: Sampling,
        with_attributes: bool,
        constraint: SrcRectConstraint,
    ) {
    }
    /// Draws an image stretched as a nine-patch around `center`.
    fn draw_image_nine(
        &mut self,
        image: &Arc<Image>,
        center: Rect,
        dst: Rect,
        filter: Sampling,
        with_attributes: bool,
    ) {
    }
    /// Draws sprites from an atlas image.
    ///
    /// `cull_rect` is the caller's promise that every sprite lies inside it.
    fn draw_atlas(
        &mut self,
        atlas: &Arc<Image>,
        sprites: AtlasSprites<'_>,
        mode: BlendMode,
        sampling: Sampling,
        cull_rect: Option<Rect>,
        with_attributes: bool,
    ) {
    }
    /// Draws a text blob at `origin`.
    fn draw_text_blob(&mut self, blob: &Arc<TextBlob>, origin: Point) {}
    /// Draws the shadow cast by a path.
    fn draw_shadow(
        &mut self,
        path: &Arc<BezPath>,
        color: Color,
        elevation: f64,
        transparent_occluder: bool,
        dpr: f64,
    ) {
    }

    // -- composite ----------------------------------------------------------

    /// Draws a nested recording at `opacity`.
    fn draw_display_list(&mut self, recording: &Arc<Recording>, opacity: f64) {}
}
