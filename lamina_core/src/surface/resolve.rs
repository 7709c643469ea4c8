// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Visibility, clipping and volatility queries.
//!
//! Every query walks the `parent` chain backward from a record. Levels are
//! only used to bound forward scans over descendants; the parent ids are the
//! authoritative chain.

use crate::rect::ClipRect;

use super::flags::SurfaceFlags;
use super::id::SurfaceId;
use super::record::SurfaceRecord;
use super::table::{find_index, span_end};

/// Outcome of [`restrict_to_parent_bounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restricted {
    /// The clipped rectangle, with every ancestor visible.
    Visible(ClipRect),
    /// The clipped rectangle, but the record or an ancestor is hidden.
    Hidden(ClipRect),
    /// Clipping collapsed the rectangle to nothing.
    Collapsed,
}

impl Restricted {
    /// The clipped rectangle, unless it collapsed.
    #[must_use]
    pub const fn rect(&self) -> Option<ClipRect> {
        match self {
            Self::Visible(r) | Self::Hidden(r) => Some(*r),
            Self::Collapsed => None,
        }
    }

    /// The clipped rectangle if it is non-empty and fully visible.
    #[must_use]
    pub const fn visible(&self) -> Option<ClipRect> {
        match self {
            Self::Visible(r) => Some(*r),
            _ => None,
        }
    }
}

/// Calls `f` for `idx` and then each ancestor, stopping early when `f`
/// returns `false`.
fn walk_ancestors(records: &[SurfaceRecord], idx: usize, mut f: impl FnMut(usize) -> bool) {
    let mut want = Some(records[idx].id);
    let mut j = idx;
    while let Some(id) = want {
        if records[j].id == id {
            if !f(j) {
                return;
            }
            want = records[j].parent;
        }
        if j == 0 {
            return;
        }
        j -= 1;
    }
}

/// Returns `true` if `idx` and every ancestor are flagged `VISIBLE`.
#[must_use]
pub fn is_visible(records: &[SurfaceRecord], idx: usize) -> bool {
    let mut visible = true;
    walk_ancestors(records, idx, |j| {
        visible = records[j].is_shown();
        visible
    });
    visible
}

/// Clips `rect` to the absolute box of `idx` and each ancestor.
///
/// With `match_bitmap`, only records sharing `idx`'s bitmap clip; this is
/// the clip that matters inside one pixel buffer. The whole chain is always
/// checked for visibility.
#[must_use]
pub fn restrict_to_parent_bounds(
    records: &[SurfaceRecord],
    idx: usize,
    rect: ClipRect,
    match_bitmap: bool,
) -> Restricted {
    let bitmap = records[idx].bitmap;
    let mut clip = rect;
    let mut visible = true;
    walk_ancestors(records, idx, |j| {
        let r = &records[j];
        if !r.is_shown() {
            visible = false;
        }
        if !match_bitmap || r.bitmap == bitmap {
            clip = clip.intersect(&r.bounds());
        }
        true
    });

    if clip.is_empty() {
        Restricted::Collapsed
    } else if visible {
        Restricted::Visible(clip)
    } else {
        Restricted::Hidden(clip)
    }
}

/// Clips `rect` to the ancestors that share `idx`'s bitmap, stopping at
/// the first ancestor with a different bitmap.
///
/// This is the clip applied before drawing into a buffer; unlike
/// [`restrict_to_parent_bounds`] it does not look past the buffer owner.
#[must_use]
pub fn clip_to_bitmap_owner(records: &[SurfaceRecord], idx: usize, rect: ClipRect) -> ClipRect {
    let bitmap = records[idx].bitmap;
    let mut clip = rect;
    walk_ancestors(records, idx, |j| {
        if records[j].bitmap != bitmap {
            return false;
        }
        clip = clip.intersect(&records[j].bounds());
        true
    });
    clip
}

/// Returns `true` if redrawing behind `idx` forces `idx` to redraw.
///
/// A record is volatile if it is flagged `VOLATILE`, if a visible
/// descendant sharing its bitmap is volatile, or if a volatile descendant
/// names a custom render root outside `idx`'s span.
#[must_use]
pub fn is_volatile(records: &[SurfaceRecord], idx: usize) -> bool {
    let me = &records[idx];
    if me.has(SurfaceFlags::VOLATILE) {
        return true;
    }

    let mut i = idx + 1;
    while i < records.len() && records[i].level > me.level {
        let r = &records[i];
        if !r.is_shown() {
            i = span_end(records, i);
            continue;
        }
        if r.has(SurfaceFlags::VOLATILE) {
            if r.bitmap == me.bitmap {
                return true;
            }
            if r.root != r.id && !records[idx + 1..i].iter().any(|x| x.id == r.root) {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Absolute area of `idx` left after clipping by every ancestor.
///
/// Returns `None` if the surface or an ancestor is hidden, or if nothing
/// remains.
#[must_use]
pub fn visible_area(records: &[SurfaceRecord], idx: usize) -> Option<ClipRect> {
    restrict_to_parent_bounds(records, idx, records[idx].bounds(), false).visible()
}

/// Returns `true` if `ancestor` appears on `id`'s parent chain.
#[must_use]
pub fn is_child(records: &[SurfaceRecord], id: SurfaceId, ancestor: SurfaceId) -> bool {
    let Some(idx) = find_index(records, id) else {
        return false;
    };
    let mut found = false;
    walk_ancestors(records, idx, |j| {
        if j != idx && records[j].id == ancestor {
            found = true;
        }
        !found
    });
    found
}

/// Scans backward from a region or transparent record to the nearest solid
/// ancestor. Returns `idx` itself if it is solid.
#[must_use]
pub fn solid_ancestor(records: &[SurfaceRecord], idx: usize) -> usize {
    let mut found = idx;
    walk_ancestors(records, idx, |j| {
        found = j;
        records[j].is_non_solid()
    });
    found
}
