// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree mutations that keep the table in pre-order.
//!
//! - [`SurfaceTable::insert`] places a record after its parent's existing
//!   children, honouring `STICK_TO_FRONT`.
//! - [`SurfaceTable::remove`] deletes a record together with its whole
//!   descendant span.
//! - [`SurfaceTable::update`] and [`relayout`] recompute absolute boxes
//!   top-down in one forward pass.
//! - [`SurfaceTable::sync_fields`] publishes selected fields of a local copy.
//! - [`SurfaceTable::raise`] and [`SurfaceTable::lower`] restack a span
//!   among its siblings.

use tracing::trace;

use crate::error::TableError;

use super::flags::{SurfaceFlags, SyncFields};
use super::id::SurfaceId;
use super::record::SurfaceRecord;
use super::table::{SurfaceTable, find_index, span_end};

/// Result of removing a surface span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    /// Index the span started at.
    pub index: usize,
    /// Number of records removed (the surface plus its descendants).
    pub count: usize,
}

impl SurfaceTable {
    /// Inserts `record` at its pre-order position and returns the index.
    ///
    /// Top-level records are appended. Children are placed after the
    /// parent's existing descendants, but before any sibling flagged
    /// `STICK_TO_FRONT`; a `STICK_TO_FRONT` record is placed before the
    /// first cursor in the span, so the pointer stays last.
    ///
    /// `level` and the absolute box are derived from the parent.
    ///
    /// # Errors
    ///
    /// - [`TableError::ArrayFull`] if the table has no free slot.
    /// - [`TableError::DuplicateSurface`] if the id is already tracked.
    /// - [`TableError::ParentNotFound`] if the parent is not tracked.
    pub fn insert(&mut self, mut record: SurfaceRecord) -> Result<usize, TableError> {
        if self.is_full() {
            return Err(TableError::ArrayFull {
                capacity: self.capacity(),
            });
        }
        if self.contains(record.id) {
            return Err(TableError::DuplicateSurface(record.id));
        }

        let idx = match record.parent {
            None => {
                record.level = 1;
                record.place_at(0, 0);
                self.len()
            }
            Some(parent) => {
                let p = self
                    .find_index(parent)
                    .ok_or(TableError::ParentNotFound(parent))?;
                let parent_rec = *self.record_at(p);
                record.level = parent_rec.level + 1;
                record.place_at(parent_rec.left, parent_rec.top);
                insertion_point(
                    self.records(),
                    p,
                    record.level,
                    record.flags.contains(SurfaceFlags::STICK_TO_FRONT),
                )
            }
        };

        trace!(surface = ?record.id, index = idx, level = record.level, "insert");
        self.records_mut().insert(idx, record);
        self.forget_recent();
        Ok(idx)
    }

    /// Removes `id` and its entire descendant span.
    ///
    /// The span is marked hidden before it is cut out, so a snapshot taken
    /// by a concurrent reader never shows half-removed children as visible.
    /// Descendants do not survive the removal of their ancestor.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn remove(&mut self, id: SurfaceId) -> Result<Removal, TableError> {
        let idx = self.find_index(id).ok_or(TableError::NotFound(id))?;
        let end = self.span_end(idx);
        let records = self.records_mut();
        for r in &mut records[idx..end] {
            r.flags.remove(SurfaceFlags::VISIBLE);
        }
        records.drain(idx..end);
        self.forget_recent();
        trace!(surface = ?id, index = idx, count = end - idx, "remove");
        Ok(Removal {
            index: idx,
            count: end - idx,
        })
    }

    /// Copies `source`'s relative geometry into the tracked record and
    /// recomputes absolute boxes for it and its descendants.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `source.id` is not tracked.
    pub fn update(&mut self, source: &SurfaceRecord) -> Result<usize, TableError> {
        let idx = self
            .find_index(source.id)
            .ok_or(TableError::NotFound(source.id))?;
        self.records_mut()[idx].geometry = source.geometry;
        relayout(self.records_mut(), idx);
        Ok(idx)
    }

    /// Copies the `fields` selected from `source` into the tracked record.
    ///
    /// Geometry changes trigger a relayout of the descendant span.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `source.id` is not tracked.
    pub fn sync_fields(
        &mut self,
        source: &SurfaceRecord,
        fields: SyncFields,
    ) -> Result<usize, TableError> {
        let idx = self
            .find_index(source.id)
            .ok_or(TableError::NotFound(source.id))?;
        let dst = &mut self.records_mut()[idx];
        if fields.contains(SyncFields::FLAGS) {
            dst.flags = source.flags;
        }
        if fields.contains(SyncFields::OPACITY) {
            dst.opacity = source.opacity;
        }
        if fields.contains(SyncFields::BITMAP) {
            dst.bitmap = source.bitmap;
            dst.bits_per_pixel = source.bits_per_pixel;
            dst.bytes_per_pixel = source.bytes_per_pixel;
            dst.line_width = source.line_width;
            dst.data = source.data;
        }
        if fields.contains(SyncFields::CURSOR) {
            dst.cursor = source.cursor;
        }
        if fields.contains(SyncFields::POP_OVER) {
            dst.pop_over = source.pop_over;
        }
        if fields.contains(SyncFields::ROOT) {
            dst.root = source.root;
        }
        if fields.contains(SyncFields::GEOMETRY) {
            dst.geometry = source.geometry;
            relayout(self.records_mut(), idx);
        }
        Ok(idx)
    }

    /// Moves `id`'s span in front of its siblings.
    ///
    /// Front-sticking siblings stay in front. Returns the new index.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn raise(&mut self, id: SurfaceId) -> Result<usize, TableError> {
        self.restack(id, true)
    }

    /// Moves `id`'s span behind its siblings. Returns the new index.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn lower(&mut self, id: SurfaceId) -> Result<usize, TableError> {
        self.restack(id, false)
    }

    fn restack(&mut self, id: SurfaceId, to_front: bool) -> Result<usize, TableError> {
        let idx = self.find_index(id).ok_or(TableError::NotFound(id))?;
        let end = self.span_end(idx);
        let parent = self.records()[idx].parent;
        let level = self.records()[idx].level;
        let sticky = self.records()[idx].flags.contains(SurfaceFlags::STICK_TO_FRONT);

        let span: Vec<SurfaceRecord> = self.records_mut().drain(idx..end).collect();
        let records = self.records();
        let parent_idx = parent.and_then(|p| find_index(records, p));

        let at = match (parent_idx, to_front) {
            (Some(p), true) => insertion_point(records, p, level, sticky),
            (Some(p), false) => p + 1,
            (None, true) => records.len(),
            (None, false) => 0,
        };
        self.records_mut().splice(at..at, span);
        self.forget_recent();
        trace!(surface = ?id, from = idx, to = at, "restack");
        Ok(at)
    }
}

/// Finds where a new child of `parent` at `level` belongs.
fn insertion_point(records: &[SurfaceRecord], parent: usize, level: u16, sticky: bool) -> usize {
    let stop = if sticky {
        SurfaceFlags::CURSOR
    } else {
        SurfaceFlags::STICK_TO_FRONT
    };
    let mut i = parent + 1;
    while i < records.len() && records[i].level >= level {
        let r = &records[i];
        // Only siblings mark the insertion point; stopping inside a
        // sibling's span would split it.
        if r.level == level && r.flags.contains(stop) {
            break;
        }
        i += 1;
    }
    i
}

/// Recomputes absolute boxes for `idx` and its descendants.
///
/// `idx`'s own box is derived from its parent. Each descendant then finds
/// its parent by scanning backward; pre-order guarantees the parent was
/// already updated in this pass. Works on the shared table and on local
/// snapshots alike.
pub fn relayout(records: &mut [SurfaceRecord], idx: usize) {
    let end = span_end(records, idx);
    for i in idx..end {
        let (ox, oy) = match records[i].parent {
            Some(parent) => match (0..i).rev().find(|&j| records[j].id == parent) {
                Some(p) => (records[p].left, records[p].top),
                None => (0, 0),
            },
            None => (0, 0),
        };
        records[i].place_at(ox, oy);
    }
}
