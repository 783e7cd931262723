// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rendering attribute state.
//!
//! Attributes are not scoped by save and restore: a setter stays in effect
//! until the next setter of the same attribute. The recorder tracks them to
//! compute bounds and summary flags; dispatch tracks them so an inlined
//! nested recording starts from defaults and leaves its parent's state as it
//! found it.

use alloc::sync::Arc;
use core::f64::consts::SQRT_2;

use kurbo::{Cap, Join};

use crate::op::Op;
use crate::paint::{BlendMode, Color, DrawStyle, MaskFilter};
use crate::receiver::OpReceiver;
use crate::resource::{ColorFilter, ColorSource, ImageFilter, PathEffect};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Attributes {
    pub(crate) anti_alias: bool,
    pub(crate) dither: bool,
    pub(crate) invert_colors: bool,
    pub(crate) cap: Cap,
    pub(crate) join: Join,
    pub(crate) style: DrawStyle,
    pub(crate) stroke_width: f64,
    pub(crate) stroke_miter: f64,
    pub(crate) color: Color,
    pub(crate) blend_mode: BlendMode,
    pub(crate) mask_filter: Option<MaskFilter>,
    pub(crate) color_filter: Option<Arc<ColorFilter>>,
    pub(crate) image_filter: Option<Arc<ImageFilter>>,
    pub(crate) color_source: Option<Arc<ColorSource>>,
    pub(crate) path_effect: Option<Arc<PathEffect>>,
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            anti_alias: false,
            dither: false,
            invert_colors: false,
            cap: Cap::Butt,
            join: Join::Miter,
            style: DrawStyle::Fill,
            stroke_width: 0.0,
            stroke_miter: 4.0,
            color: Color::BLACK,
            blend_mode: BlendMode::SrcOver,
            mask_filter: None,
            color_filter: None,
            image_filter: None,
            color_source: None,
            path_effect: None,
        }
    }
}

impl Attributes {
    /// Whether scaling alpha commutes with rendering under these attributes.
    pub(crate) fn opacity_compatible(&self) -> bool {
        self.blend_mode == BlendMode::SrcOver
            && self.image_filter.is_none()
            && self
                .color_filter
                .as_ref()
                .is_none_or(|f| f.can_commute_with_opacity())
    }

    pub(crate) fn source_is_transparent(&self) -> bool {
        self.color.is_transparent()
            || self
                .color_source
                .as_ref()
                .is_some_and(|s| s.is_transparent())
    }

    pub(crate) fn filters_modify_transparent_black(&self) -> bool {
        self.color_filter
            .as_ref()
            .is_some_and(|f| f.modifies_transparent_black())
            || self
                .image_filter
                .as_ref()
                .is_some_and(|f| f.modifies_transparent_black())
    }

    /// Local-space stroke padding, or `None` for a hairline.
    pub(crate) fn stroke_outset(&self) -> Option<f64> {
        if self.stroke_width <= 0.0 {
            return None;
        }
        let half = self.stroke_width / 2.0;
        let mut pad = half;
        if self.join == Join::Miter {
            pad = half * self.stroke_miter.max(1.0);
        }
        if self.cap == Cap::Square {
            pad = pad.max(half * SQRT_2);
        }
        Some(pad)
    }

    /// Folds an attribute op into the state. Other ops are ignored.
    pub(crate) fn apply(&mut self, op: &Op<'_>) {
        match op {
            Op::SetAntiAlias(aa) => self.anti_alias = *aa,
            Op::SetDither(dither) => self.dither = *dither,
            Op::SetInvertColors(invert) => self.invert_colors = *invert,
            Op::SetStrokeCap(cap) => self.cap = *cap,
            Op::SetStrokeJoin(join) => self.join = *join,
            Op::SetStyle(style) => self.style = *style,
            Op::SetStrokeWidth(width) => self.stroke_width = *width,
            Op::SetStrokeMiter(limit) => self.stroke_miter = *limit,
            Op::SetColor(color) => self.color = *color,
            Op::SetBlendMode(mode) => self.blend_mode = *mode,
            Op::SetMaskFilter(filter) => self.mask_filter = Some(*filter),
            Op::ClearMaskFilter => self.mask_filter = None,
            Op::SetColorFilter(filter) => self.color_filter = Some(Arc::clone(filter)),
            Op::ClearColorFilter => self.color_filter = None,
            Op::SetImageFilter(filter) => self.image_filter = Some(Arc::clone(filter)),
            Op::ClearImageFilter => self.image_filter = None,
            Op::SetColorSource(source) => self.color_source = Some(Arc::clone(source)),
            Op::ClearColorSource => self.color_source = None,
            Op::SetPathEffect(effect) => self.path_effect = Some(Arc::clone(effect)),
            Op::ClearPathEffect => self.path_effect = None,
            _ => {}
        }
    }

    /// Delivers the setters that take a receiver holding `self` to `target`.
    pub(crate) fn transition_to(&self, target: &Self, receiver: &mut dyn OpReceiver) {
        if self.anti_alias != target.anti_alias {
            receiver.set_anti_alias(target.anti_alias);
        }
        if self.dither != target.dither {
            receiver.set_dither(target.dither);
        }
        if self.invert_colors != target.invert_colors {
            receiver.set_invert_colors(target.invert_colors);
        }
        if self.cap != target.cap {
            receiver.set_stroke_cap(target.cap);
        }
        if self.join != target.join {
            receiver.set_stroke_join(target.join);
        }
        if self.style != target.style {
            receiver.set_style(target.style);
        }
        if self.stroke_width != target.stroke_width {
            receiver.set_stroke_width(target.stroke_width);
        }
        if self.stroke_miter != target.stroke_miter {
            receiver.set_stroke_miter(target.stroke_miter);
        }
        if self.color != target.color {
            receiver.set_color(target.color);
        }
        if self.blend_mode != target.blend_mode {
            receiver.set_blend_mode(target.blend_mode);
        }
        if self.mask_filter != target.mask_filter {
            match target.mask_filter {
                Some(filter) => receiver.set_mask_filter(filter),
                None => receiver.clear_mask_filter(),
            }
        }
        if self.color_filter != target.color_filter {
            match &target.color_filter {
                Some(filter) => receiver.set_color_filter(filter),
                None => receiver.clear_color_filter(),
            }
        }
        if self.image_filter != target.image_filter {
            match &target.image_filter {
                Some(filter) => receiver.set_image_filter(filter),
                None => receiver.clear_image_filter(),
            }
        }
        if self.color_source != target.color_source {
            match &target.color_source {
                Some(source) => receiver.set_color_source(source),
                None => receiver.clear_color_source(),
            }
        }
        if self.path_effect != target.path_effect {
            match &target.path_effect {
                Some(effect) => receiver.set_path_effect(effect),
                None => receiver.clear_path_effect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec::Vec;
    use alloc::{format, vec};

    use super::*;

    #[derive(Default)]
    struct Setters(Vec<String>);

    impl OpReceiver for Setters {
        fn set_color(&mut self, color: Color) {
            self.0.push(format!("color {:08x}", color.0));
        }
        fn set_stroke_width(&mut self, width: f64) {
            self.0.push(format!("width {width}"));
        }
        fn set_path_effect(&mut self, _effect: &Arc<PathEffect>) {
            self.0.push("effect".into());
        }
        fn clear_path_effect(&mut self) {
            self.0.push("clear effect".into());
        }
    }

    #[test]
    fn apply_tracks_setters_and_clears() {
        let dash = Arc::new(PathEffect::Dash {
            intervals: vec![1.0, 1.0],
            phase: 0.0,
        });
        let mut attrs = Attributes::default();
        attrs.apply(&Op::SetColor(Color::WHITE));
        attrs.apply(&Op::SetPathEffect(&dash));
        attrs.apply(&Op::DrawPaint);
        assert_eq!(attrs.color, Color::WHITE);
        assert_eq!(attrs.path_effect.as_deref(), Some(&*dash));
        attrs.apply(&Op::ClearPathEffect);
        assert!(attrs.path_effect.is_none());
    }

    #[test]
    fn transition_emits_only_differences() {
        let from = Attributes {
            color: Color::WHITE,
            path_effect: Some(Arc::new(PathEffect::Dash {
                intervals: vec![2.0, 1.0],
                phase: 0.0,
            })),
            ..Attributes::default()
        };
        let to = Attributes {
            stroke_width: 3.0,
            ..Attributes::default()
        };

        let mut setters = Setters::default();
        from.transition_to(&to, &mut setters);
        assert_eq!(setters.0, ["width 3", "color ff000000", "clear effect"]);

        let mut none = Setters::default();
        to.transition_to(&to.clone(), &mut none);
        assert!(none.0.is_empty());
    }
}
