// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-surface record stored by value in the shared table.

use crate::rect::ClipRect;

use super::flags::SurfaceFlags;
use super::id::{BitmapId, DisplayId, MemoryId, SurfaceId, TaskId};

/// Position and size of a surface relative to its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Geometry {
    /// Horizontal offset from the parent's left edge.
    pub x: i32,
    /// Vertical offset from the parent's top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Geometry {
    /// Creates a geometry from position and size.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One surface as seen by every process sharing the table.
///
/// `left/top/right/bottom` are absolute and derived: they always equal the
/// parent's absolute origin plus `x/y` (and `+ width/height`). Only the
/// tree operations on [`SurfaceTable`](super::SurfaceTable) write them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceRecord {
    /// Identity.
    pub id: SurfaceId,
    /// Direct parent, `None` for top-level surfaces.
    pub parent: Option<SurfaceId>,
    /// Custom render root; equals `id` unless one was set.
    pub root: SurfaceId,
    /// Stacking hint: keep this surface in front of the named one.
    pub pop_over: Option<SurfaceId>,
    /// Pixel buffer holding this surface's graphics.
    pub bitmap: BitmapId,
    /// Display the surface is shown on.
    pub display: DisplayId,
    /// Owning process.
    pub task: TaskId,
    /// Pointer shape hint.
    pub cursor: u16,
    /// Relative position and size.
    pub geometry: Geometry,
    /// Absolute left edge.
    pub left: i32,
    /// Absolute top edge.
    pub top: i32,
    /// Absolute right edge (exclusive).
    pub right: i32,
    /// Absolute bottom edge (exclusive).
    pub bottom: i32,
    /// Tree depth, 1 for top-level surfaces.
    pub level: u16,
    /// State flags.
    pub flags: SurfaceFlags,
    /// Bits per pixel of the bitmap.
    pub bits_per_pixel: u8,
    /// Bytes per pixel of the bitmap.
    pub bytes_per_pixel: u8,
    /// Bytes per scanline of the bitmap.
    pub line_width: i32,
    /// Shared memory holding the raw pixel data.
    pub data: Option<MemoryId>,
    /// Opacity, 255 is fully opaque.
    pub opacity: u8,
}

impl SurfaceRecord {
    /// Creates a visible, opaque, top-level record with its own bitmap.
    ///
    /// Absolute coordinates are filled in when the record is tracked.
    #[must_use]
    pub fn new(id: SurfaceId, bitmap: BitmapId, geometry: Geometry) -> Self {
        Self {
            id,
            parent: None,
            root: id,
            pop_over: None,
            bitmap,
            display: DisplayId(1),
            task: TaskId(1),
            cursor: 0,
            geometry,
            left: geometry.x,
            top: geometry.y,
            right: geometry.x.saturating_add(geometry.width),
            bottom: geometry.y.saturating_add(geometry.height),
            level: 1,
            flags: SurfaceFlags::VISIBLE,
            bits_per_pixel: 32,
            bytes_per_pixel: 4,
            line_width: geometry.width.saturating_mul(4),
            data: None,
            opacity: 255,
        }
    }

    /// Sets the parent.
    #[must_use]
    pub fn with_parent(mut self, parent: SurfaceId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Replaces the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: SurfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the owning task.
    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = task;
        self
    }

    /// Sets the display.
    #[must_use]
    pub fn with_display(mut self, display: DisplayId) -> Self {
        self.display = display;
        self
    }

    /// Sets a custom render root.
    #[must_use]
    pub fn with_root(mut self, root: SurfaceId) -> Self {
        self.root = root;
        self
    }

    /// Sets the opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    /// Absolute bounding box.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> ClipRect {
        ClipRect::new(self.left, self.top, self.right, self.bottom)
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.geometry.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.geometry.height
    }

    /// Returns `true` if the record's own `VISIBLE` flag is set.
    ///
    /// Ancestors are not consulted; see
    /// [`is_visible`](super::resolve::is_visible).
    #[inline]
    #[must_use]
    pub const fn is_shown(&self) -> bool {
        self.flags.contains(SurfaceFlags::VISIBLE)
    }

    /// Returns `true` for region or transparent records.
    #[inline]
    #[must_use]
    pub const fn is_non_solid(&self) -> bool {
        self.flags.intersects(SurfaceFlags::NON_SOLID)
    }

    /// Returns `true` if the record has every flag in `flags`.
    #[inline]
    #[must_use]
    pub const fn has(&self, flags: SurfaceFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Recomputes the absolute box from an absolute parent origin.
    pub(crate) fn place_at(&mut self, origin_x: i32, origin_y: i32) {
        self.left = origin_x.saturating_add(self.geometry.x);
        self.top = origin_y.saturating_add(self.geometry.y);
        self.right = self.left.saturating_add(self.geometry.width);
        self.bottom = self.top.saturating_add(self.geometry.height);
    }
}
