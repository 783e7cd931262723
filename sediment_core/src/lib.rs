// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replayable, cullable display lists for 2D rendering.
//!
//! `sediment_core` records 2D drawing commands into a compact binary buffer,
//! seals them into an immutable [`Recording`](recording::Recording), and
//! replays them into any [`OpReceiver`](receiver::OpReceiver), optionally
//! skipping everything outside a cull rectangle. It is `no_std` compatible
//! (with `alloc`). Recordings are `Send + Sync` and are shared as
//! `Arc<Recording>`.
//!
//! # Architecture
//!
//! ```text
//!   Recorder ──► Storage (records + resource table)
//!       │              │
//!       │ build()      │ take()
//!       ▼              ▼
//!   SpatialIndex ──► Recording ──► dispatch / dispatch_culled
//!                                        │
//!                         Culler ◄───────┤
//!                                        ▼
//!                                   OpReceiver
//! ```
//!
//! **[`storage`]** — Page-rounded growable byte buffer holding the records,
//! plus the side table that owns their reference-counted resources.
//!
//! **[`op`]** — The record catalog: [`OpType`](op::OpType) discriminants,
//! fixed payload layouts and the decoded [`Op`](op::Op) view.
//!
//! **[`recorder`]** — Writes records while tracking transform, clip, save
//! stack and attributes, so each draw gets conservative device bounds.
//!
//! **[`recording`]** — The sealed result: metadata summary, content
//! equality and unique ids from an injectable [`IdCounter`](recording::IdCounter).
//!
//! **[`rtree`]** and **[`culler`]** — A packed R-tree over draw bounds, with
//! hit and non-overlapping drawn-area queries, and the visible-set query that
//! culled dispatch consults.
//!
//! **[`receiver`]** — The visitor trait, one no-op-by-default method per
//! record kind.
//!
//! **[`trace`]** — [`DispatchSink`](trace::DispatchSink) trait and event
//! types for dispatch instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Example
//!
//! ```
//! use kurbo::Rect;
//! use sediment_core::paint::Color;
//! use sediment_core::receiver::OpReceiver;
//! use sediment_core::recorder::Recorder;
//!
//! #[derive(Default)]
//! struct CountRects(usize);
//!
//! impl OpReceiver for CountRects {
//!     fn draw_rect(&mut self, _rect: Rect) {
//!         self.0 += 1;
//!     }
//! }
//!
//! let mut recorder = Recorder::new(Rect::new(0.0, 0.0, 100.0, 100.0));
//! recorder.set_color(Color::WHITE)?;
//! recorder.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0))?;
//! recorder.draw_rect(Rect::new(80.0, 80.0, 90.0, 90.0))?;
//! let recording = recorder.build()?;
//!
//! let mut counter = CountRects::default();
//! recording.dispatch_culled(&mut counter, Rect::new(0.0, 0.0, 20.0, 20.0));
//! assert_eq!(counter.0, 1);
//! # Ok::<(), sediment_core::error::StorageError>(())
//! ```
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

mod attributes;
pub mod culler;
mod dispatch;
pub mod error;
pub mod op;
pub mod options;
pub mod paint;
pub mod receiver;
pub mod recorder;
pub mod recording;
pub mod resource;
pub mod rtree;
pub mod storage;
pub mod trace;
pub mod transform;
