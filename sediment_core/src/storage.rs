// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Growable byte store for packed records.
//!
//! [`Storage`] holds every record of one recording in a single contiguous
//! buffer, plus a side table of the shared resources those records own.
//! Records refer to resources by slot index, never by address, so growing
//! the buffer moves bytes without invalidating anything.
//!
//! Capacity grows geometrically and is rounded up to [`PAGE_SIZE`], which
//! keeps the total bytes copied across `N` appends within a constant factor
//! of `N`.

use alloc::vec::Vec;
use core::fmt;
use core::mem::{self, size_of};

use crate::error::StorageError;
use crate::op::{OpType, read};
use crate::resource::Resource;

/// Growth granularity of a [`Storage`] buffer, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// A growable buffer of packed records with an owned resource table.
///
/// Invariants:
/// - `used() <= allocated()`.
/// - Growth preserves the committed prefix byte for byte.
/// - Every resource slot is released exactly once, either by
///   [`truncate`](Self::truncate) or when the store is dropped.
///
/// After [`take`](Self::take) the source is *disabled*: it holds nothing,
/// further writes panic, and dropping it does nothing.
pub struct Storage {
    /// Committed bytes; `buf.len()` is the used count.
    buf: Vec<u8>,
    allocated: usize,
    resources: Vec<Option<Resource>>,
    disabled: bool,
    relocated: usize,
}

impl Storage {
    /// Creates an empty, enabled store with nothing allocated.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            allocated: 0,
            resources: Vec::new(),
            disabled: false,
            relocated: 0,
        }
    }

    /// Bytes committed to records.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    /// Bytes of buffer capacity currently held.
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Whether this store has been emptied by [`take`](Self::take).
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Total bytes copied by growth so far.
    #[must_use]
    pub fn relocated_bytes(&self) -> usize {
        self.relocated
    }

    /// Number of resource slots, released ones included.
    #[must_use]
    pub fn resource_slots(&self) -> usize {
        self.resources.len()
    }

    /// Heap footprint of the resource table.
    #[must_use]
    pub fn resource_table_bytes(&self) -> usize {
        self.resources.capacity() * size_of::<Option<Resource>>()
    }

    /// Reserves `n` bytes at the end of the committed region.
    ///
    /// The returned slice is zeroed and counts as used immediately.
    ///
    /// # Panics
    ///
    /// Panics if the store is disabled.
    pub fn alloc(&mut self, n: usize) -> Result<&mut [u8], StorageError> {
        assert!(!self.disabled, "alloc on a disabled Storage");
        let used = self.buf.len();
        let needed = used.checked_add(n).ok_or(StorageError::CapacityOverflow)?;
        if needed > self.allocated {
            let doubled = self
                .allocated
                .checked_mul(2)
                .ok_or(StorageError::CapacityOverflow)?;
            let target = round_to_page(needed.max(doubled))?;
            self.resize_capacity(target)?;
        }
        self.buf.resize(needed, 0);
        Ok(&mut self.buf[used..])
    }

    /// Resizes capacity to exactly `n` bytes without writing.
    ///
    /// # Panics
    ///
    /// Panics if the store is disabled or if `n` is below [`used`](Self::used).
    pub fn realloc(&mut self, n: usize) -> Result<(), StorageError> {
        assert!(!self.disabled, "realloc on a disabled Storage");
        assert!(
            n >= self.buf.len(),
            "realloc to {n} bytes would drop {} committed bytes",
            self.buf.len() - n
        );
        if n != self.allocated {
            self.resize_capacity(n)?;
        }
        Ok(())
    }

    /// Moves the contents into a new store and disables this one.
    ///
    /// # Panics
    ///
    /// Panics if the store is already disabled.
    #[must_use]
    pub fn take(&mut self) -> Self {
        assert!(!self.disabled, "take on a disabled Storage");
        let out = Self {
            buf: mem::take(&mut self.buf),
            allocated: self.allocated,
            resources: mem::take(&mut self.resources),
            disabled: false,
            relocated: self.relocated,
        };
        self.allocated = 0;
        self.disabled = true;
        out
    }

    /// Releases the resources of every record at or after `used` and
    /// shortens the committed region to `used` bytes.
    ///
    /// `used` must be a record boundary. Capacity is kept.
    ///
    /// # Panics
    ///
    /// Panics if `used` is past the committed region.
    pub fn truncate(&mut self, used: usize) {
        assert!(
            used <= self.buf.len(),
            "truncate to {used} bytes past {} committed bytes",
            self.buf.len()
        );
        self.release_from(used);
        self.buf.truncate(used);
        while matches!(self.resources.last(), Some(None)) {
            self.resources.pop();
        }
    }

    /// Stores an owned resource and returns its slot index.
    pub(crate) fn attach(&mut self, resource: Resource) -> Result<u32, StorageError> {
        assert!(!self.disabled, "attach on a disabled Storage");
        let slot = u32::try_from(self.resources.len()).map_err(|_| StorageError::CapacityOverflow)?;
        let entry = size_of::<Option<Resource>>();
        self.resources
            .try_reserve(1)
            .map_err(|_| StorageError::AllocationFailed {
                requested: (self.resources.len() + 1) * entry,
                allocated: self.resources.capacity() * entry,
            })?;
        self.resources.push(Some(resource));
        Ok(slot)
    }

    /// Drops the newest slot before any record refers to it.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not the most recently attached slot.
    pub(crate) fn release_unwritten(&mut self, slot: u32) {
        assert_eq!(
            slot as usize + 1,
            self.resources.len(),
            "only the newest resource slot can be released unwritten"
        );
        self.resources.pop();
    }

    /// Returns the resource in `slot`.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not exist or has been released.
    pub(crate) fn resource(&self, slot: u32) -> &Resource {
        match self.resources.get(slot as usize) {
            Some(Some(r)) => r,
            Some(None) => panic!("resource slot {slot} has been released"),
            None => panic!("resource slot {slot} out of range"),
        }
    }

    /// Overwrites committed bytes starting at `offset`.
    pub(crate) fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Iterates committed records from the start.
    pub(crate) fn records(&self) -> Records<'_> {
        self.records_from(0)
    }

    /// Iterates committed records starting at byte `offset`.
    pub(crate) fn records_from(&self, offset: usize) -> Records<'_> {
        Records::new(&self.buf, offset)
    }

    fn resize_capacity(&mut self, target: usize) -> Result<(), StorageError> {
        let len = self.buf.len();
        if target > self.buf.capacity() {
            self.buf
                .try_reserve_exact(target - len)
                .map_err(|_| StorageError::AllocationFailed {
                    requested: target,
                    allocated: self.allocated,
                })?;
        } else {
            self.buf.shrink_to(target);
        }
        if self.allocated != 0 {
            self.relocated += len;
        }
        self.allocated = target;
        Ok(())
    }

    fn release_from(&mut self, offset: usize) {
        if self.resources.is_empty() {
            return;
        }
        let Self { buf, resources, .. } = self;
        for record in Records::new(buf.as_slice(), offset) {
            if let Some(slot) = record.resource_slot() {
                let released = resources[slot].take();
                debug_assert!(released.is_some(), "resource slot {slot} released twice");
            }
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.disabled {
            return;
        }
        self.release_from(0);
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("used", &self.buf.len())
            .field("allocated", &self.allocated)
            .field("resource_slots", &self.resources.len())
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

fn round_to_page(n: usize) -> Result<usize, StorageError> {
    n.checked_next_multiple_of(PAGE_SIZE)
        .ok_or(StorageError::CapacityOverflow)
}

// ---------------------------------------------------------------------------
// Record iteration
// ---------------------------------------------------------------------------

/// One undecoded record: its discriminant, offset and bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawRecord<'a> {
    offset: usize,
    op_type: OpType,
    /// The whole record, tag included.
    bytes: &'a [u8],
}

impl<'a> RawRecord<'a> {
    #[inline]
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub(crate) fn op_type(&self) -> OpType {
        self.op_type
    }

    #[inline]
    pub(crate) fn payload(&self) -> &'a [u8] {
        &self.bytes[1..]
    }

    /// Slot of the resource this record owns, if any.
    pub(crate) fn resource_slot(&self) -> Option<usize> {
        self.op_type
            .owns_resource()
            .then(|| read::<u32>(self.payload()) as usize)
    }
}

/// Front-to-back walk over packed records.
///
/// Panics on an unknown discriminant or a record that runs past the end;
/// both mean the buffer was not written by the recorder.
#[derive(Clone, Debug)]
pub(crate) struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Moves the cursor to byte `offset`, which must be a record boundary.
    pub(crate) fn seek(&mut self, offset: usize) {
        debug_assert!(offset >= self.pos, "records only seek forward");
        self.pos = offset;
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = RawRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buf.get(self.pos..).filter(|r| !r.is_empty())?;
        let tag = rest[0];
        let op_type = OpType::from_u8(tag)
            .unwrap_or_else(|| panic!("unknown op discriminant {tag} at offset {}", self.pos));
        let len = op_type.record_len(rest);
        assert!(
            len <= rest.len(),
            "{op_type:?} record at offset {} overruns the buffer",
            self.pos
        );
        let record = RawRecord {
            offset: self.pos,
            op_type,
            bytes: &rest[..len],
        };
        self.pos += len;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use kurbo::BezPath;

    use crate::op::SlotPayload;

    fn push_path(store: &mut Storage, path: &Arc<BezPath>) {
        let slot = store.attach(Resource::Path(path.clone())).unwrap();
        let bytes = store.alloc(1 + size_of::<SlotPayload>()).unwrap();
        bytes[0] = OpType::DrawPath as u8;
        bytes[1..].copy_from_slice(bytemuck::bytes_of(&SlotPayload { slot }));
    }

    fn push_paint(store: &mut Storage) {
        store.alloc(1).unwrap()[0] = OpType::DrawPaint as u8;
    }

    #[test]
    fn new_store_is_empty() {
        let store = Storage::new();
        assert_eq!(store.used(), 0);
        assert_eq!(store.allocated(), 0);
        assert!(!store.is_disabled());
        assert_eq!(store.records().count(), 0);
    }

    #[test]
    fn growth_is_page_granular() {
        let mut store = Storage::new();
        store.alloc(10).unwrap();
        assert_eq!(store.used(), 10);
        assert_eq!(store.allocated(), PAGE_SIZE);
        store.alloc(PAGE_SIZE).unwrap();
        assert_eq!(store.allocated(), 2 * PAGE_SIZE);
        store.alloc(5 * PAGE_SIZE).unwrap();
        assert_eq!(store.allocated(), 6 * PAGE_SIZE + PAGE_SIZE);
        assert!(store.used() <= store.allocated());
    }

    #[test]
    fn growth_preserves_committed_bytes() {
        let mut store = Storage::new();
        store.alloc(3).unwrap().copy_from_slice(&[1, 2, 3]);
        store.alloc(3 * PAGE_SIZE).unwrap();
        assert_eq!(&store.buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn growth_is_amortized_linear() {
        let mut store = Storage::new();
        let total = 1 << 20;
        let mut written = 0;
        while written < total {
            store.alloc(24).unwrap();
            written += 24;
        }
        assert!(
            store.relocated_bytes() <= 2 * written + PAGE_SIZE,
            "copied {} bytes for {written} appended",
            store.relocated_bytes()
        );
    }

    #[test]
    fn realloc_is_exact() {
        let mut store = Storage::new();
        store.alloc(100).unwrap();
        store.realloc(100).unwrap();
        assert_eq!(store.allocated(), 100);
        store.realloc(5000).unwrap();
        assert_eq!(store.allocated(), 5000);
        assert_eq!(store.used(), 100);
    }

    #[test]
    #[should_panic(expected = "would drop")]
    fn realloc_below_used_panics() {
        let mut store = Storage::new();
        store.alloc(100).unwrap();
        let _ = store.realloc(50);
    }

    #[test]
    fn failed_growth_keeps_the_store_intact() {
        let mut store = Storage::new();
        store.alloc(3).unwrap().copy_from_slice(&[1, 2, 3]);
        let too_big = isize::MAX as usize - PAGE_SIZE;
        assert!(matches!(
            store.alloc(too_big),
            Err(StorageError::AllocationFailed { allocated, .. }) if allocated == PAGE_SIZE
        ));
        assert_eq!(store.alloc(usize::MAX), Err(StorageError::CapacityOverflow));
        assert_eq!(store.used(), 3);
        assert_eq!(store.allocated(), PAGE_SIZE);
        assert_eq!(&store.buf[..], &[1, 2, 3]);
        store.alloc(1).unwrap()[0] = 4;
        assert_eq!(&store.buf[..], &[1, 2, 3, 4], "the store stays usable");
    }

    #[test]
    fn unwritten_slots_are_released() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        push_path(&mut store, &path);
        let slot = store.attach(Resource::Path(path.clone())).unwrap();
        assert_eq!(Arc::strong_count(&path), 3);
        store.release_unwritten(slot);
        assert_eq!(Arc::strong_count(&path), 2);
        assert_eq!(store.resource_slots(), 1);
        drop(store);
        assert_eq!(Arc::strong_count(&path), 1);
    }

    #[test]
    #[should_panic(expected = "only the newest resource slot")]
    fn only_the_newest_slot_is_released_unwritten() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        push_path(&mut store, &path);
        push_path(&mut store, &path);
        store.release_unwritten(0);
    }

    #[test]
    fn take_disables_source() {
        let mut store = Storage::new();
        push_paint(&mut store);
        let moved = store.take();
        assert!(store.is_disabled());
        assert_eq!(store.used(), 0);
        assert_eq!(store.allocated(), 0);
        assert_eq!(moved.used(), 1);
        assert_eq!(moved.allocated(), PAGE_SIZE);
        assert!(!moved.is_disabled());
    }

    #[test]
    #[should_panic(expected = "alloc on a disabled Storage")]
    fn alloc_after_take_panics() {
        let mut store = Storage::new();
        let _moved = store.take();
        let _ = store.alloc(1);
    }

    #[test]
    #[should_panic(expected = "realloc on a disabled Storage")]
    fn realloc_after_take_panics() {
        let mut store = Storage::new();
        let _moved = store.take();
        let _ = store.realloc(0);
    }

    #[test]
    fn drop_releases_every_resource_once() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        for _ in 0..5 {
            push_path(&mut store, &path);
            push_paint(&mut store);
        }
        assert_eq!(Arc::strong_count(&path), 6);
        drop(store);
        assert_eq!(Arc::strong_count(&path), 1);
    }

    #[test]
    fn taken_store_owns_resources() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        push_path(&mut store, &path);
        let moved = store.take();
        drop(store);
        assert_eq!(Arc::strong_count(&path), 2, "disabled drop is a no-op");
        drop(moved);
        assert_eq!(Arc::strong_count(&path), 1);
    }

    #[test]
    fn truncate_releases_tail_records() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        push_path(&mut store, &path);
        let mark = store.used();
        push_paint(&mut store);
        push_path(&mut store, &path);
        push_path(&mut store, &path);
        assert_eq!(Arc::strong_count(&path), 4);

        store.truncate(mark);
        assert_eq!(Arc::strong_count(&path), 2);
        assert_eq!(store.used(), mark);
        assert_eq!(store.resource_slots(), 1);
        assert_eq!(store.records().count(), 1);

        drop(store);
        assert_eq!(Arc::strong_count(&path), 1);
    }

    #[test]
    fn records_walk_in_order() {
        let path = Arc::new(BezPath::new());
        let mut store = Storage::new();
        push_paint(&mut store);
        push_path(&mut store, &path);
        push_paint(&mut store);
        let kinds: Vec<_> = store.records().map(|r| r.op_type()).collect();
        assert_eq!(kinds, [OpType::DrawPaint, OpType::DrawPath, OpType::DrawPaint]);
        let offsets: Vec<_> = store.records().map(|r| r.offset()).collect();
        assert_eq!(offsets, [0, 1, 1 + 1 + size_of::<SlotPayload>()]);
        let mut from = store.records_from(1);
        assert_eq!(from.next().map(|r| r.resource_slot()), Some(Some(0)));
    }

    #[test]
    #[should_panic(expected = "unknown op discriminant 200")]
    fn unknown_discriminant_panics() {
        let mut store = Storage::new();
        store.alloc(1).unwrap()[0] = 200;
        let _ = store.records().count();
    }
}
