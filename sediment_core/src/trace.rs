// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for dispatch.
//!
//! This module provides a [`DispatchSink`] trait with per-event methods that
//! [`Recording::dispatch_traced`](crate::recording::Recording::dispatch_traced)
//! calls as it walks a recording. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn DispatchSink`. When the `trace`
//! feature is **off**, every `Tracer` method compiles to nothing (zero
//! overhead). When **on**, each method performs a single `Option` branch
//! before dispatching.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies (one branch per call).

use kurbo::Rect;

use crate::op::OpType;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted once before the first record is visited.
#[derive(Clone, Copy, Debug)]
pub struct DispatchBeginEvent {
    /// Id of the recording being dispatched.
    pub unique_id: u32,
    /// Records in the recording, nested ones excluded.
    pub op_count: usize,
    /// Query rectangle, if dispatch is culled.
    pub cull_rect: Option<Rect>,
    /// Whether a spatial index is available to the culler.
    pub has_rtree: bool,
}

/// Identifies one record within one recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpEvent {
    /// Id of the recording that holds the record.
    pub unique_id: u32,
    /// Index of the record.
    pub op_index: u32,
    /// Kind of the record.
    pub op_type: OpType,
}

/// Emitted when a whole save block is skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockCulledEvent {
    /// Id of the recording that holds the block.
    pub unique_id: u32,
    /// Index of the save record that opens the block.
    pub save_index: u32,
    /// Index of the matching restore record.
    pub restore_index: u32,
}

/// Counts produced at the end of a dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Id of the recording.
    pub unique_id: u32,
    /// Records delivered to the receiver.
    pub visited: usize,
    /// Records skipped, individually or inside culled blocks.
    pub culled: usize,
}

// ---------------------------------------------------------------------------
// DispatchSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from dispatch.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait DispatchSink {
    /// Called before the first record.
    fn on_dispatch_begin(&mut self, e: &DispatchBeginEvent) {
        _ = e;
    }

    /// Called for each record delivered to the receiver.
    fn on_op_visited(&mut self, e: &OpEvent) {
        _ = e;
    }

    /// Called for each draw record skipped by the culler.
    fn on_op_culled(&mut self, e: &OpEvent) {
        _ = e;
    }

    /// Called when a save block is skipped as a whole.
    fn on_block_culled(&mut self, e: &BlockCulledEvent) {
        _ = e;
    }

    /// Called after the last record with the dispatch totals.
    fn on_dispatch_end(&mut self, s: &DispatchSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`DispatchSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl DispatchSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`DispatchSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn DispatchSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn DispatchSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn DispatchSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`DispatchBeginEvent`].
    #[inline]
    pub fn dispatch_begin(&mut self, e: &DispatchBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_dispatch_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a visited [`OpEvent`].
    #[inline]
    pub fn op_visited(&mut self, e: &OpEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_op_visited(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a culled [`OpEvent`].
    #[inline]
    pub fn op_culled(&mut self, e: &OpEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_op_culled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BlockCulledEvent`].
    #[inline]
    pub fn block_culled(&mut self, e: &BlockCulledEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_block_culled(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DispatchSummary`].
    #[inline]
    pub fn dispatch_end(&mut self, s: &DispatchSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_dispatch_end(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> OpEvent {
        OpEvent {
            unique_id: 3,
            op_index: 12,
            op_type: OpType::DrawRect,
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_dispatch_begin(&DispatchBeginEvent {
            unique_id: 3,
            op_count: 20,
            cull_rect: None,
            has_rtree: false,
        });
        sink.on_op_visited(&sample_op());
        sink.on_dispatch_end(&DispatchSummary::default());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.op_visited(&sample_op());
        tracer.op_culled(&sample_op());
        tracer.dispatch_end(&DispatchSummary::default());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        use alloc::vec::Vec;

        struct CollectingSink {
            culled: Vec<u32>,
            blocks: Vec<(u32, u32)>,
        }
        impl DispatchSink for CollectingSink {
            fn on_op_culled(&mut self, e: &OpEvent) {
                self.culled.push(e.op_index);
            }
            fn on_block_culled(&mut self, e: &BlockCulledEvent) {
                self.blocks.push((e.save_index, e.restore_index));
            }
        }

        let mut sink = CollectingSink {
            culled: Vec::new(),
            blocks: Vec::new(),
        };
        let mut tracer = Tracer::new(&mut sink);
        tracer.op_culled(&sample_op());
        tracer.op_visited(&sample_op());
        tracer.block_culled(&BlockCulledEvent {
            unique_id: 3,
            save_index: 4,
            restore_index: 9,
        });
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.culled, &[12]);
        assert_eq!(sink.blocks, &[(4, 9)]);
    }
}
