// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON exporter for recordings.
//!
//! [`export`] writes one JSON object describing a recording: its metadata
//! summary and an `ops` array with one entry per record. Nested recordings
//! are exported recursively under their `DrawDisplayList` entry.

use std::io::{self, Write};

use kurbo::{Point, Rect};
use serde_json::{Value, json};

use sediment_core::op::Op;
use sediment_core::resource::PathEffect;
use sediment_core::recording::Recording;

/// Exports a recording as a pretty-printed JSON document.
pub fn export(recording: &Recording, writer: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer_pretty(writer, &to_value(recording))?;
    Ok(())
}

/// Builds the JSON value [`export`] writes.
#[must_use]
pub fn to_value(recording: &Recording) -> Value {
    let ops: Vec<Value> = recording
        .ops()
        .enumerate()
        .map(|(index, op)| op_value(index, &op))
        .collect();
    json!({
        "unique_id": recording.unique_id(),
        "op_count": recording.op_count(false),
        "op_count_nested": recording.op_count(true),
        "bytes": recording.bytes(false),
        "bytes_nested": recording.bytes(true),
        "bounds": rect(recording.bounds()),
        "has_rtree": recording.has_rtree(),
        "can_apply_group_opacity": recording.can_apply_group_opacity(),
        "is_ui_thread_safe": recording.is_ui_thread_safe(),
        "modifies_transparent_black": recording.modifies_transparent_black(),
        "ops": ops,
    })
}

fn rect(r: Rect) -> Value {
    json!([r.x0, r.y0, r.x1, r.y1])
}

fn point(p: Point) -> Value {
    json!([p.x, p.y])
}

fn op_value(index: usize, op: &Op<'_>) -> Value {
    let op_type = op.op_type();
    let args = match op {
        Op::SetColor(color) => json!({ "color": format!("#{:08X}", color.0) }),
        Op::SetStrokeWidth(width) => json!({ "width": width }),
        Op::SetBlendMode(mode) => json!({ "mode": format!("{mode:?}") }),
        Op::SaveLayer { bounds, options } | Op::SaveLayerBackdrop { bounds, options, .. } => {
            json!({
                "bounds": bounds.map(rect),
                "renders_with_attributes": options.renders_with_attributes(),
                "can_distribute_opacity": options.can_distribute_opacity(),
            })
        }
        Op::SetPathEffect(effect) => match &***effect {
            PathEffect::Dash { intervals, phase } => json!({
                "dash": intervals,
                "phase": phase,
            }),
        },
        Op::Translate(delta) => json!({ "dx": delta.x, "dy": delta.y }),
        Op::Scale { sx, sy } => json!({ "sx": sx, "sy": sy }),
        Op::Rotate { degrees } => json!({ "degrees": degrees }),
        Op::ClipRect {
            rect: r,
            op,
            anti_alias,
        } => json!({
            "rect": rect(*r),
            "op": format!("{op:?}"),
            "anti_alias": anti_alias,
        }),
        Op::DrawColor { color, mode } => json!({
            "color": format!("#{:08X}", color.0),
            "mode": format!("{mode:?}"),
        }),
        Op::DrawLine { p0, p1 } => json!({ "p0": point(*p0), "p1": point(*p1) }),
        Op::DrawRect(r) | Op::DrawOval(r) => json!({ "rect": rect(*r) }),
        Op::DrawCircle { center, radius } => json!({
            "center": point(*center),
            "radius": radius,
        }),
        Op::DrawPoints { mode, points } => json!({
            "mode": format!("{mode:?}"),
            "points": points.iter().map(point).collect::<Vec<_>>(),
        }),
        Op::DrawVertices { vertices, mode } => json!({
            "vertex_mode": format!("{:?}", vertices.mode),
            "positions": vertices.positions.iter().copied().map(point).collect::<Vec<_>>(),
            "indexed": vertices.indices.is_some(),
            "mode": format!("{mode:?}"),
        }),
        Op::DrawImage { image, point: p, .. } => json!({
            "image": image.id,
            "point": point(*p),
        }),
        Op::DrawImageRect { image, dst, .. } | Op::DrawImageNine { image, dst, .. } => json!({
            "image": image.id,
            "dst": rect(*dst),
        }),
        Op::DrawAtlas {
            atlas,
            sprites,
            mode,
            cull_rect,
            ..
        } => json!({
            "atlas": atlas.id,
            "texture_rects": sprites.texture_rects().map(rect).collect::<Vec<_>>(),
            "colors": sprites
                .colors()
                .map(|colors| colors.map(|c| format!("#{:08X}", c.0)).collect::<Vec<_>>()),
            "mode": format!("{mode:?}"),
            "cull_rect": cull_rect.map(rect),
        }),
        Op::DrawTextBlob { blob, origin } => json!({
            "blob": blob.id,
            "origin": point(*origin),
        }),
        Op::DrawDisplayList { recording, opacity } => json!({
            "opacity": opacity,
            "recording": to_value(recording),
        }),
        other => json!(format!("{other:?}")),
    };
    json!({
        "index": index,
        "type": format!("{op_type:?}"),
        "category": format!("{:?}", op_type.category()),
        "args": args,
    })
}
