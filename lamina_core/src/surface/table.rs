// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The flat, pre-ordered surface table.
//!
//! Records are stored in depth-first pre-order: a parent always precedes its
//! children, and every record following index `i` up to the next record with
//! `level <= level[i]` is a descendant of `i`. Array position therefore
//! encodes both nesting and z-order (later records are in front).
//!
//! There are no child pointers. Every relationship is resolved by scanning,
//! using `level` to bound forward scans and `parent` to walk backward.

use core::sync::atomic::{AtomicUsize, Ordering};

use super::id::{BitmapId, SurfaceId};
use super::record::SurfaceRecord;

/// A bounded, pre-ordered array of [`SurfaceRecord`]s.
#[derive(Debug)]
pub struct SurfaceTable {
    records: Vec<SurfaceRecord>,
    capacity: usize,
    /// Index of the most recently found record.
    recent: AtomicUsize,
}

impl Clone for SurfaceTable {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            capacity: self.capacity,
            recent: AtomicUsize::new(self.recent.load(Ordering::Relaxed)),
        }
    }
}

impl SurfaceTable {
    /// Creates an empty table that holds up to `capacity` records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            recent: AtomicUsize::new(0),
        }
    }

    /// Creates a copy of this table with a larger capacity.
    ///
    /// Record order, and therefore every index, is preserved.
    #[must_use]
    pub fn grown(&self, capacity: usize) -> Self {
        let mut records = Vec::with_capacity(capacity);
        records.extend_from_slice(&self.records);
        Self {
            records,
            capacity: capacity.max(self.capacity),
            recent: AtomicUsize::new(self.recent.load(Ordering::Relaxed)),
        }
    }

    /// Number of tracked records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no surface is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records before the table must grow.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if another insert requires growth.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// All records in pre-order.
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[SurfaceRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut Vec<SurfaceRecord> {
        &mut self.records
    }

    /// Returns the record at `idx`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&SurfaceRecord> {
        self.records.get(idx)
    }

    /// Returns the record at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[inline]
    #[must_use]
    pub fn record_at(&self, idx: usize) -> &SurfaceRecord {
        assert!(
            idx < self.records.len(),
            "record index {idx} out of range ({} records)",
            self.records.len()
        );
        &self.records[idx]
    }

    /// Returns a copy of every record.
    ///
    /// The redraw and expose engines work on snapshots so that the table
    /// lock is only held while copying.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SurfaceRecord> {
        self.records.clone()
    }

    /// Looks up the index of `id`.
    ///
    /// The most recent hit is cached; the cached slot and its successor are
    /// checked before falling back to a linear scan, which makes repeated
    /// lookups during one redraw pass cheap.
    #[must_use]
    pub fn find_index(&self, id: SurfaceId) -> Option<usize> {
        let recent = self.recent.load(Ordering::Relaxed);
        for idx in [recent, recent + 1] {
            if self.records.get(idx).is_some_and(|r| r.id == id) {
                self.recent.store(idx, Ordering::Relaxed);
                return Some(idx);
            }
        }
        let idx = find_index(&self.records, id)?;
        self.recent.store(idx, Ordering::Relaxed);
        Some(idx)
    }

    /// Returns `true` if `id` is tracked.
    #[must_use]
    pub fn contains(&self, id: SurfaceId) -> bool {
        self.find_index(id).is_some()
    }

    /// One past the last descendant of `idx`.
    #[must_use]
    pub fn span_end(&self, idx: usize) -> usize {
        span_end(&self.records, idx)
    }

    /// Index of the parent of the record at `idx`.
    #[must_use]
    pub fn parent_index(&self, idx: usize) -> Option<usize> {
        parent_index(&self.records, idx)
    }

    /// Index of the surface owning the bitmap used by `idx`.
    #[must_use]
    pub fn bitmap_owner(&self, idx: usize) -> usize {
        bitmap_owner(&self.records, idx)
    }

    pub(crate) fn forget_recent(&self) {
        self.recent.store(0, Ordering::Relaxed);
    }
}

// -- Slice helpers --------------------------------------------------------
//
// The engines operate on snapshots, so every scan is also available on a
// plain slice.

/// Linear search for `id`.
#[must_use]
pub fn find_index(records: &[SurfaceRecord], id: SurfaceId) -> Option<usize> {
    records.iter().position(|r| r.id == id)
}

/// One past the last descendant of `idx`.
#[must_use]
pub fn span_end(records: &[SurfaceRecord], idx: usize) -> usize {
    let level = records[idx].level;
    let mut end = idx + 1;
    while end < records.len() && records[end].level > level {
        end += 1;
    }
    end
}

/// Scans backward from `idx` for its parent.
#[must_use]
pub fn parent_index(records: &[SurfaceRecord], idx: usize) -> Option<usize> {
    let parent = records[idx].parent?;
    (0..idx).rev().find(|&i| records[i].id == parent)
}

/// Walks up the parent chain while the bitmap matches, returning the index
/// of the topmost surface sharing `idx`'s bitmap.
#[must_use]
pub fn bitmap_owner(records: &[SurfaceRecord], idx: usize) -> usize {
    let bitmap: BitmapId = records[idx].bitmap;
    let mut owner = idx;
    let mut i = idx;
    while let Some(parent) = records[i].parent {
        let Some(p) = (0..i).rev().find(|&j| records[j].id == parent) else {
            break;
        };
        if records[p].bitmap != bitmap {
            break;
        }
        owner = p;
        i = p;
    }
    owner
}

/// Index of the top-level record whose span contains `idx`.
#[must_use]
pub fn display_root(records: &[SurfaceRecord], idx: usize) -> usize {
    let mut i = idx;
    while i > 0 && records[i].parent.is_some() {
        i -= 1;
    }
    i
}
