// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sealed, shareable recordings.

use alloc::sync::Arc;
use core::fmt;
use core::mem::size_of;
use core::sync::atomic::{AtomicU32, Ordering};

use kurbo::Rect;

use crate::op::{Op, read};
use crate::rtree::SpatialIndex;
use crate::storage::{RawRecord, Storage};

/// Source of [`Recording::unique_id`] values.
///
/// Ids increase by one per sealed recording and wrap at `u32::MAX`. Tests
/// inject their own counter through
/// [`Recorder::build_with_ids`](crate::recorder::Recorder::build_with_ids) to
/// get deterministic ids.
#[derive(Debug)]
pub struct IdCounter {
    next: AtomicU32,
}

static GLOBAL_IDS: IdCounter = IdCounter::new(1);

impl IdCounter {
    /// Creates a counter whose first id is `start`.
    #[must_use]
    pub const fn new(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// The process-wide counter used by [`Recorder::build`](crate::recorder::Recorder::build).
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_IDS
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the id the next call to [`next_id`](Self::next_id) will yield.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Metadata the recorder accumulates and hands over at seal time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Summary {
    pub(crate) op_count: usize,
    pub(crate) nested_op_count: usize,
    pub(crate) nested_byte_count: usize,
    pub(crate) bounds: Rect,
    pub(crate) can_apply_group_opacity: bool,
    pub(crate) is_ui_thread_safe: bool,
    pub(crate) modifies_transparent_black: bool,
}

/// An immutable, replayable sequence of drawing operations.
///
/// Produced by [`Recorder::build`](crate::recorder::Recorder::build) and
/// shared as `Arc<Recording>`. All metadata is an exact summary of the
/// records at seal time. Dropping the last reference releases every resource
/// the records own.
///
/// Equality is by content: two recordings are equal when their records are
/// identical byte for byte, apart from resource slots, and the resources
/// those records own compare equal. Ids, capacities and resource identities
/// do not matter. Inline arguments compare by bit pattern, so a recording
/// with a NaN argument equals itself and any identically built copy.
pub struct Recording {
    storage: Storage,
    summary: Summary,
    unique_id: u32,
    rtree: Option<Arc<SpatialIndex>>,
}

impl Recording {
    /// Seals storage and its summary into a recording.
    pub(crate) fn seal(
        storage: Storage,
        summary: Summary,
        rtree: Option<SpatialIndex>,
        ids: &IdCounter,
    ) -> Self {
        debug_assert!(!storage.is_disabled(), "sealing a disabled store");
        Self {
            storage,
            summary,
            unique_id: ids.next_id(),
            rtree: rtree.map(Arc::new),
        }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Identity assigned at seal time. Not part of equality.
    #[must_use]
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Approximate memory footprint in bytes.
    ///
    /// Counts this struct, the record buffer's capacity and the resource
    /// table. With `include_nested`, adds the footprint of every nested
    /// recording, recursively.
    #[must_use]
    pub fn bytes(&self, include_nested: bool) -> usize {
        let own =
            size_of::<Self>() + self.storage.allocated() + self.storage.resource_table_bytes();
        if include_nested {
            own + self.summary.nested_byte_count
        } else {
            own
        }
    }

    /// Number of records. With `include_nested`, adds the op counts of every
    /// nested recording, recursively.
    #[must_use]
    pub fn op_count(&self, include_nested: bool) -> usize {
        if include_nested {
            self.summary.op_count + self.summary.nested_op_count
        } else {
            self.summary.op_count
        }
    }

    /// Conservative device-space bounds of everything drawn.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.summary.bounds
    }

    /// Whether a spatial index was built.
    #[must_use]
    pub fn has_rtree(&self) -> bool {
        self.rtree.is_some()
    }

    /// The spatial index, if one was built.
    #[must_use]
    pub fn rtree(&self) -> Option<&Arc<SpatialIndex>> {
        self.rtree.as_ref()
    }

    /// Whether a group opacity can be applied to each op individually with
    /// the same result as compositing the whole recording through a layer.
    #[must_use]
    pub fn can_apply_group_opacity(&self) -> bool {
        self.summary.can_apply_group_opacity
    }

    /// Whether the recording can be dispatched from any thread.
    #[must_use]
    pub fn is_ui_thread_safe(&self) -> bool {
        self.summary.is_ui_thread_safe
    }

    /// Whether rendering onto transparent black can leave a visible pixel.
    #[must_use]
    pub fn modifies_transparent_black(&self) -> bool {
        self.summary.modifies_transparent_black
    }

    /// Decodes every record in order, for inspection.
    pub fn ops(&self) -> impl Iterator<Item = Op<'_>> + '_ {
        self.storage
            .records()
            .map(|record| Op::decode(&record, &self.storage))
    }
}

impl Recording {
    fn record_eq(&self, a: &RawRecord<'_>, other: &Self, b: &RawRecord<'_>) -> bool {
        if a.op_type() != b.op_type() {
            return false;
        }
        let (pa, pb) = (a.payload(), b.payload());
        if !a.op_type().owns_resource() {
            return pa == pb;
        }
        // Owning payloads lead with their slot.
        let slot_len = size_of::<u32>();
        pa[slot_len..] == pb[slot_len..]
            && self
                .storage
                .resource(read(pa))
                .same_content(other.storage.resource(read(pb)))
    }
}

impl PartialEq for Recording {
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        self.summary.op_count == other.summary.op_count
            && self.storage.used() == other.storage.used()
            && self
                .storage
                .records()
                .zip(other.storage.records())
                .all(|(a, b)| self.record_eq(&a, other, &b))
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("unique_id", &self.unique_id)
            .field("op_count", &self.summary.op_count)
            .field("nested_op_count", &self.summary.nested_op_count)
            .field("bounds", &self.summary.bounds)
            .field("has_rtree", &self.rtree.is_some())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
