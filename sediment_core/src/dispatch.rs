// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replaying a recording into an [`OpReceiver`].
//!
//! Dispatch walks the record buffer front to back and forwards each decoded
//! op to the receiver. Culled dispatch consults a [`Culler`] built from the
//! recording's spatial index:
//!
//! - attribute, transform and clip records are always delivered;
//! - draw and composite records are skipped when not visible;
//! - a save block is skipped whole, restore included, when nothing inside it
//!   is visible and it sets no attributes.
//!
//! Attribute state is not scoped by save and restore, so a block that sets
//! attributes must be walked even when none of its draws are visible.
//!
//! A receiver that expands nested recordings gets each one inline between a
//! save and a restore. The nested ops start from default attributes, and the
//! parent's attributes are delivered again before the restore, so expansion
//! leaves attribute state unchanged and culling may still skip it.

use crate::attributes::Attributes;
use crate::culler::{Culler, IRect};
use crate::op::{Op, SAVE_HAS_ATTRIBUTES, block_header};
use crate::receiver::OpReceiver;
use crate::recording::Recording;
use crate::trace::{BlockCulledEvent, DispatchBeginEvent, DispatchSummary, OpEvent, Tracer};

use kurbo::Rect;

impl Recording {
    /// Delivers every record to `receiver` in record order.
    pub fn dispatch(&self, receiver: &mut dyn OpReceiver) {
        self.walk(receiver, &Culler::visit_all(), &mut Tracer::none());
    }

    /// Delivers the records that may affect pixels inside `cull_rect`.
    ///
    /// The delivered set is a superset of the draws whose recorded bounds
    /// intersect `cull_rect`, always includes every state change those draws
    /// depend on, and preserves record order.
    pub fn dispatch_culled(&self, receiver: &mut dyn OpReceiver, cull_rect: Rect) {
        let culler = Culler::new(self.rtree().map(|index| &**index), cull_rect);
        self.walk(receiver, &culler, &mut Tracer::none());
    }

    /// Integer-rectangle form of [`dispatch_culled`](Self::dispatch_culled).
    pub fn dispatch_culled_irect(&self, receiver: &mut dyn OpReceiver, cull_rect: IRect) {
        self.dispatch_culled(receiver, cull_rect.to_rect());
    }

    /// Dispatches like [`dispatch`](Self::dispatch) or
    /// [`dispatch_culled`](Self::dispatch_culled), reporting each decision to
    /// `tracer`.
    pub fn dispatch_traced(
        &self,
        receiver: &mut dyn OpReceiver,
        cull_rect: Option<Rect>,
        tracer: &mut Tracer<'_>,
    ) {
        let culler = match cull_rect {
            Some(rect) => Culler::new(self.rtree().map(|index| &**index), rect),
            None => Culler::visit_all(),
        };
        tracer.dispatch_begin(&DispatchBeginEvent {
            unique_id: self.unique_id(),
            op_count: self.op_count(false),
            cull_rect,
            has_rtree: self.has_rtree(),
        });
        self.walk(receiver, &culler, tracer);
    }

    fn walk(&self, receiver: &mut dyn OpReceiver, culler: &Culler, tracer: &mut Tracer<'_>) {
        // Recordings assume default attributes at their start.
        let mut state = receiver.expand_nested().then(Attributes::default);
        self.walk_with(receiver, culler, tracer, state.as_mut());
    }

    /// Replays this recording inline for a receiver currently holding
    /// `parent` attributes.
    fn expand_into(&self, receiver: &mut dyn OpReceiver, parent: &Attributes) {
        let mut nested = Attributes::default();
        receiver.save();
        parent.transition_to(&nested, receiver);
        self.walk_with(
            receiver,
            &Culler::visit_all(),
            &mut Tracer::none(),
            Some(&mut nested),
        );
        nested.transition_to(parent, receiver);
        receiver.restore();
    }

    /// Walks the records. `state` tracks the receiver's attributes when
    /// nested recordings are expanded.
    fn walk_with(
        &self,
        receiver: &mut dyn OpReceiver,
        culler: &Culler,
        tracer: &mut Tracer<'_>,
        mut state: Option<&mut Attributes>,
    ) {
        let storage = self.storage();
        let unique_id = self.unique_id();
        let mut summary = DispatchSummary {
            unique_id,
            ..DispatchSummary::default()
        };
        let mut records = storage.records();
        let mut index: u32 = 0;

        while let Some(record) = records.next() {
            let op_type = record.op_type();
            let event = OpEvent {
                unique_id,
                op_index: index,
                op_type,
            };

            if culler.is_culling() {
                if op_type.is_save() {
                    let header = block_header(&record);
                    debug_assert!(
                        header.restore_offset as usize > record.offset(),
                        "save at offset {} was never patched",
                        record.offset()
                    );
                    if header.flags & SAVE_HAS_ATTRIBUTES == 0
                        && !culler.any_visible(index..=header.restore_index)
                    {
                        tracer.block_culled(&BlockCulledEvent {
                            unique_id,
                            save_index: index,
                            restore_index: header.restore_index,
                        });
                        summary.culled += (header.restore_index - index) as usize + 1;
                        // Restore records carry no payload.
                        records.seek(header.restore_offset as usize + 1);
                        index = header.restore_index + 1;
                        continue;
                    }
                } else if op_type.is_cullable() && !culler.is_visible(index) {
                    tracer.op_culled(&event);
                    summary.culled += 1;
                    index += 1;
                    continue;
                }
            }

            tracer.op_visited(&event);
            summary.visited += 1;
            match (Op::decode(&record, storage), state.as_deref_mut()) {
                (Op::DrawDisplayList { recording, opacity }, Some(attrs)) if opacity >= 1.0 => {
                    recording.expand_into(receiver, attrs);
                }
                (op, attrs) => {
                    if let Some(attrs) = attrs {
                        attrs.apply(&op);
                    }
                    forward(op, receiver);
                }
            }
            index += 1;
        }

        tracer.dispatch_end(&summary);
    }
}

/// Calls the receiver method matching `op`.
fn forward(op: Op<'_>, receiver: &mut dyn OpReceiver) {
    match op {
        Op::SetAntiAlias(aa) => receiver.set_anti_alias(aa),
        Op::SetDither(dither) => receiver.set_dither(dither),
        Op::SetInvertColors(invert) => receiver.set_invert_colors(invert),
        Op::SetStrokeCap(cap) => receiver.set_stroke_cap(cap),
        Op::SetStrokeJoin(join) => receiver.set_stroke_join(join),
        Op::SetStyle(style) => receiver.set_style(style),
        Op::SetStrokeWidth(width) => receiver.set_stroke_width(width),
        Op::SetStrokeMiter(limit) => receiver.set_stroke_miter(limit),
        Op::SetColor(color) => receiver.set_color(color),
        Op::SetBlendMode(mode) => receiver.set_blend_mode(mode),
        Op::SetMaskFilter(filter) => receiver.set_mask_filter(filter),
        Op::ClearMaskFilter => receiver.clear_mask_filter(),
        Op::SetColorFilter(filter) => receiver.set_color_filter(filter),
        Op::ClearColorFilter => receiver.clear_color_filter(),
        Op::SetImageFilter(filter) => receiver.set_image_filter(filter),
        Op::ClearImageFilter => receiver.clear_image_filter(),
        Op::SetColorSource(source) => receiver.set_color_source(source),
        Op::ClearColorSource => receiver.clear_color_source(),
        Op::SetPathEffect(effect) => receiver.set_path_effect(effect),
        Op::ClearPathEffect => receiver.clear_path_effect(),

        Op::Save => receiver.save(),
        Op::SaveLayer { bounds, options } => receiver.save_layer(bounds, options, None),
        Op::SaveLayerBackdrop {
            bounds,
            options,
            backdrop,
        } => receiver.save_layer(bounds, options, Some(backdrop)),
        Op::Restore => receiver.restore(),

        Op::Translate(delta) => receiver.translate(delta),
        Op::Scale { sx, sy } => receiver.scale(sx, sy),
        Op::Rotate { degrees } => receiver.rotate(degrees),
        Op::Skew { sx, sy } => receiver.skew(sx, sy),
        Op::Transform2DAffine(t) => receiver.transform_2d_affine(t),
        Op::TransformFullPerspective(t) => receiver.transform_full_perspective(t),
        Op::TransformReset => receiver.transform_reset(),

        Op::ClipRect {
            rect,
            op,
            anti_alias,
        } => receiver.clip_rect(rect, op, anti_alias),
        Op::ClipRoundedRect {
            rrect,
            op,
            anti_alias,
        } => receiver.clip_rounded_rect(rrect, op, anti_alias),
        Op::ClipPath {
            path,
            op,
            anti_alias,
        } => receiver.clip_path(path, op, anti_alias),

        Op::DrawPaint => receiver.draw_paint(),
        Op::DrawColor { color, mode } => receiver.draw_color(color, mode),
        Op::DrawLine { p0, p1 } => receiver.draw_line(p0, p1),
        Op::DrawRect(rect) => receiver.draw_rect(rect),
        Op::DrawOval(bounds) => receiver.draw_oval(bounds),
        Op::DrawCircle { center, radius } => receiver.draw_circle(center, radius),
        Op::DrawRoundedRect(rrect) => receiver.draw_rounded_rect(rrect),
        Op::DrawDoubleRoundedRect { outer, inner } => {
            receiver.draw_double_rounded_rect(outer, inner);
        }
        Op::DrawArc {
            oval,
            start_degrees,
            sweep_degrees,
            use_center,
        } => receiver.draw_arc(oval, start_degrees, sweep_degrees, use_center),
        Op::DrawPath(path) => receiver.draw_path(path),
        Op::DrawPoints { mode, points } => receiver.draw_points(mode, points),
        Op::DrawVertices { vertices, mode } => receiver.draw_vertices(vertices, mode),
        Op::DrawImage {
            image,
            point,
            sampling,
            with_attributes,
        } => receiver.draw_image(image, point, sampling, with_attributes),
        Op::DrawImageRect {
            image,
            src,
            dst,
            sampling,
            with_attributes,
            constraint,
        } => receiver.draw_image_rect(image, src, dst, sampling, with_attributes, constraint),
        Op::DrawImageNine {
            image,
            center,
            dst,
            filter,
            with_attributes,
        } => receiver.draw_image_nine(image, center, dst, filter, with_attributes),
        Op::DrawAtlas {
            atlas,
            sprites,
            mode,
            sampling,
            cull_rect,
            with_attributes,
        } => receiver.draw_atlas(atlas, sprites, mode, sampling, cull_rect, with_attributes),
        Op::DrawTextBlob { blob, origin } => receiver.draw_text_blob(blob, origin),
        Op::DrawShadow {
            path,
            color,
            elevation,
            transparent_occluder,
            dpr,
        } => receiver.draw_shadow(path, color, elevation, transparent_occluder, dpr),

        Op::DrawDisplayList { recording, opacity } => {
            receiver.draw_display_list(recording, opacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use alloc::format;

    use kurbo::{Point, Rect, Vec2};

    use crate::op::OpType;
    use crate::paint::{ClipOp, Color};
    use crate::recorder::Recorder;
    use crate::recording::{IdCounter, Recording};
    use crate::receiver::OpReceiver;
    use crate::trace::{DispatchSink, DispatchSummary, OpEvent, Tracer};

    const CULL: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    /// Logs one short line per call.
    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        expand: bool,
    }

    impl OpReceiver for Log {
        fn expand_nested(&self) -> bool {
            self.expand
        }
        fn set_color(&mut self, color: Color) {
            self.calls.push(format!("color {:08x}", color.0));
        }
        fn save(&mut self) {
            self.calls.push("save".into());
        }
        fn restore(&mut self) {
            self.calls.push("restore".into());
        }
        fn translate(&mut self, delta: Vec2) {
            self.calls.push(format!("translate {} {}", delta.x, delta.y));
        }
        fn clip_rect(&mut self, rect: Rect, _op: ClipOp, _anti_alias: bool) {
            self.calls.push(format!("clip {}", rect.x0));
        }
        fn draw_rect(&mut self, rect: Rect) {
            self.calls.push(format!("rect {}", rect.x0));
        }
        fn draw_oval(&mut self, bounds: Rect) {
            self.calls.push(format!("oval {}", bounds.x0));
        }
        fn draw_display_list(&mut self, recording: &Arc<Recording>, opacity: f64) {
            self.calls
                .push(format!("list {} {opacity}", recording.op_count(false)));
        }
    }

    fn rect(x: f64) -> Rect {
        Rect::new(x, x, x + 10.0, x + 10.0)
    }

    fn build(r: Recorder) -> Arc<Recording> {
        r.build_with_ids(&IdCounter::new(1)).unwrap()
    }

    fn calls(rec: &Recording, cull: Option<Rect>) -> Vec<String> {
        let mut log = Log::default();
        match cull {
            Some(c) => rec.dispatch_culled(&mut log, c),
            None => rec.dispatch(&mut log),
        }
        log.calls
    }

    #[test]
    fn dispatch_preserves_record_order() {
        let mut r = Recorder::new(CULL);
        r.set_color(Color::WHITE).unwrap();
        r.save().unwrap();
        r.translate(1.0, 2.0).unwrap();
        r.draw_rect(rect(0.0)).unwrap();
        r.restore().unwrap();
        r.draw_oval(rect(50.0)).unwrap();
        let rec = build(r);
        let expected = [
            "color ffffffff",
            "save",
            "translate 1 2",
            "rect 0",
            "restore",
            "oval 50",
        ];
        assert_eq!(calls(&rec, None), expected);
        assert_eq!(calls(&rec, None), expected, "replay is repeatable");
    }

    #[test]
    fn culled_dispatch_skips_invisible_draws_only() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(rect(0.0)).unwrap();
        r.set_color(Color::WHITE).unwrap();
        r.clip_rect(Rect::new(0.0, 0.0, 90.0, 90.0), ClipOp::Intersect, false)
            .unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        let rec = build(r);
        assert_eq!(
            calls(&rec, Some(Rect::new(45.0, 45.0, 70.0, 70.0))),
            ["color ffffffff", "clip 0", "rect 50"]
        );
        assert_eq!(
            calls(&rec, Some(Rect::new(0.0, 0.0, 5.0, 5.0))),
            ["rect 0", "color ffffffff", "clip 0"]
        );
    }

    #[test]
    fn covering_cull_matches_full_dispatch() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(rect(0.0)).unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        let rec = build(r);
        assert_eq!(calls(&rec, Some(CULL)), calls(&rec, None));
    }

    #[test]
    fn without_index_culled_dispatch_visits_everything() {
        let mut r = Recorder::new(CULL).with_rtree(false);
        r.draw_rect(rect(0.0)).unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        let rec = build(r);
        assert_eq!(calls(&rec, Some(rect(0.0))), calls(&rec, None));
    }

    #[test]
    fn invisible_blocks_are_skipped_whole() {
        let mut r = Recorder::new(CULL);
        r.save().unwrap();
        r.translate(50.0, 50.0).unwrap();
        r.draw_rect(rect(0.0)).unwrap();
        r.restore().unwrap();
        r.draw_oval(rect(0.0)).unwrap();
        let rec = build(r);
        assert_eq!(calls(&rec, Some(rect(0.0))), ["oval 0"]);
    }

    #[test]
    fn blocks_that_set_attributes_are_walked() {
        let mut r = Recorder::new(CULL);
        r.save().unwrap();
        r.set_color(Color::WHITE).unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        r.restore().unwrap();
        r.draw_oval(rect(0.0)).unwrap();
        let rec = build(r);
        assert_eq!(
            calls(&rec, Some(rect(0.0))),
            ["save", "color ffffffff", "restore", "oval 0"]
        );
    }

    #[test]
    fn integer_cull_rect() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(rect(0.0)).unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        let rec = build(r);
        let mut log = Log::default();
        rec.dispatch_culled_irect(&mut log, crate::culler::IRect::from_xywh(55, 55, 2, 2));
        assert_eq!(log.calls, ["rect 50"]);
    }

    #[test]
    fn nested_recordings_forward_or_expand() {
        let mut inner = Recorder::new(CULL);
        inner.draw_rect(rect(0.0)).unwrap();
        inner.draw_oval(rect(20.0)).unwrap();
        let inner = build(inner);

        let mut outer = Recorder::new(CULL);
        outer.draw_display_list(inner.clone(), 1.0).unwrap();
        outer.draw_display_list(inner, 0.5).unwrap();
        let outer = build(outer);

        assert_eq!(calls(&outer, None), ["list 2 1", "list 2 0.5"]);

        let mut log = Log {
            expand: true,
            ..Log::default()
        };
        outer.dispatch(&mut log);
        assert_eq!(
            log.calls,
            ["save", "rect 0", "oval 20", "restore", "list 2 0.5"],
            "only full-opacity lists are inlined"
        );
    }

    fn expanding() -> Log {
        Log {
            expand: true,
            ..Log::default()
        }
    }

    fn white_rect_at_50() -> Arc<Recording> {
        let mut inner = Recorder::new(CULL);
        inner.set_color(Color::WHITE).unwrap();
        inner.draw_rect(rect(50.0)).unwrap();
        build(inner)
    }

    #[test]
    fn expanded_lists_do_not_leak_attributes() {
        let mut outer = Recorder::new(CULL);
        outer.draw_display_list(white_rect_at_50(), 1.0).unwrap();
        outer.draw_rect(rect(0.0)).unwrap();
        let outer = build(outer);

        let mut log = expanding();
        outer.dispatch(&mut log);
        assert_eq!(
            log.calls,
            [
                "save",
                "color ffffffff",
                "rect 50",
                "color ff000000",
                "restore",
                "rect 0"
            ],
            "the outer rect is still drawn in black"
        );
    }

    #[test]
    fn expanded_lists_start_from_default_attributes() {
        let mut inner = Recorder::new(CULL);
        inner.draw_oval(rect(20.0)).unwrap();
        let inner = build(inner);

        let mut outer = Recorder::new(CULL);
        outer.set_color(Color::WHITE).unwrap();
        outer.draw_display_list(inner, 1.0).unwrap();
        outer.draw_rect(rect(0.0)).unwrap();
        let outer = build(outer);

        let mut log = expanding();
        outer.dispatch(&mut log);
        assert_eq!(
            log.calls,
            [
                "color ffffffff",
                "save",
                "color ff000000",
                "oval 20",
                "color ffffffff",
                "restore",
                "rect 0"
            ]
        );
    }

    #[test]
    fn culling_an_expanded_list_keeps_attributes_intact() {
        let mut outer = Recorder::new(CULL);
        outer.draw_display_list(white_rect_at_50(), 1.0).unwrap();
        outer.draw_rect(rect(0.0)).unwrap();
        let outer = build(outer);

        let mut culled = expanding();
        outer.dispatch_culled(&mut culled, rect(0.0));
        assert_eq!(culled.calls, ["rect 0"]);

        let mut covering = expanding();
        outer.dispatch_culled(&mut covering, CULL);
        let mut full = expanding();
        outer.dispatch(&mut full);
        assert_eq!(covering.calls, full.calls);
    }

    #[test]
    fn culled_dispatch_forwards_visible_lists() {
        let mut outer = Recorder::new(CULL);
        outer.draw_display_list(white_rect_at_50(), 1.0).unwrap();
        outer.save().unwrap();
        outer.draw_display_list(white_rect_at_50(), 0.5).unwrap();
        outer.restore().unwrap();
        outer.draw_rect(rect(0.0)).unwrap();
        let outer = build(outer);

        assert_eq!(
            calls(&outer, Some(rect(50.0))),
            ["list 2 1", "save", "list 2 0.5", "restore"]
        );
        assert_eq!(
            calls(&outer, Some(rect(0.0))),
            ["rect 0"],
            "the block holding only an invisible list is skipped whole"
        );
    }

    #[test]
    fn default_receiver_accepts_everything() {
        struct Nothing;
        impl OpReceiver for Nothing {}

        let mut r = Recorder::new(CULL);
        r.draw_points(crate::paint::PointMode::Lines, &[Point::ZERO, Point::new(1.0, 1.0)])
            .unwrap();
        r.draw_rect(rect(0.0)).unwrap();
        build(r).dispatch(&mut Nothing);
    }

    #[derive(Default)]
    struct Counts {
        visited: Vec<(u32, OpType)>,
        culled: Vec<u32>,
        blocks: Vec<(u32, u32)>,
        summary: Option<DispatchSummary>,
    }

    impl DispatchSink for Counts {
        fn on_op_visited(&mut self, e: &OpEvent) {
            self.visited.push((e.op_index, e.op_type));
        }
        fn on_op_culled(&mut self, e: &OpEvent) {
            self.culled.push(e.op_index);
        }
        fn on_block_culled(&mut self, e: &crate::trace::BlockCulledEvent) {
            self.blocks.push((e.save_index, e.restore_index));
        }
        fn on_dispatch_end(&mut self, s: &DispatchSummary) {
            self.summary = Some(*s);
        }
    }

    #[test]
    fn traced_dispatch_delivers_the_same_ops() {
        let mut r = Recorder::new(CULL);
        r.draw_rect(rect(0.0)).unwrap();
        r.save().unwrap();
        r.draw_rect(rect(50.0)).unwrap();
        r.restore().unwrap();
        r.draw_rect(rect(60.0)).unwrap();
        let rec = build(r);

        let query = rect(0.0);
        let mut sink = Counts::default();
        let mut log = Log::default();
        let mut tracer = Tracer::new(&mut sink);
        rec.dispatch_traced(&mut log, Some(query), &mut tracer);
        drop(tracer);
        assert_eq!(log.calls, calls(&rec, Some(query)));

        #[cfg(feature = "trace")]
        {
            assert_eq!(sink.visited, [(0, OpType::DrawRect)]);
            assert_eq!(sink.culled, [4]);
            assert_eq!(sink.blocks, [(1, 3)]);
            let summary = sink.summary.unwrap();
            assert_eq!(summary.visited, 1);
            assert_eq!(summary.culled, 4);
            assert_eq!(summary.visited + summary.culled, rec.op_count(false));
        }
        #[cfg(not(feature = "trace"))]
        {
            assert!(sink.visited.is_empty());
            assert!(sink.culled.is_empty());
            assert!(sink.blocks.is_empty());
            assert!(sink.summary.is_none());
        }
    }
}
