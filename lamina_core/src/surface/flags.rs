// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface state flags.

use bitflags::bitflags;

bitflags! {
    /// Per-surface state stored in the shared table.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        /// The surface is shown. Hidden surfaces hide their whole subtree.
        const VISIBLE        = 1 << 0;
        /// Layout-only grouping with no pixels of its own.
        const REGION         = 1 << 1;
        /// See-through: never occludes, but may contain solid children.
        const TRANSPARENT    = 1 << 2;
        /// Appearance depends on what lies behind; redraw when it changes.
        const VOLATILE       = 1 << 3;
        /// Blended onto its background through a scratch buffer.
        const COMPOSITE      = 1 << 4;
        /// The movable pointer overlay.
        const CURSOR         = 1 << 5;
        /// Always ordered last within its sibling span.
        const STICK_TO_FRONT = 1 << 6;
        /// Copy background graphics in before drawing.
        const PRECOPY        = 1 << 7;
        /// Blend background graphics over the content after drawing.
        const AFTER_COPY     = 1 << 8;
        /// Every redraw covers the full surface regardless of damage.
        const TOTAL_REDRAW   = 1 << 9;
        /// After-copy ignores children so translucency covers them too.
        const PERVASIVE_COPY = 1 << 10;
    }
}

impl SurfaceFlags {
    /// Flags marking a surface with no pixel identity of its own.
    pub const NON_SOLID: Self = Self::REGION.union(Self::TRANSPARENT);

    /// Flags whose surfaces need attention when their background changes.
    pub const BACKGROUND_SENSITIVE: Self = Self::VOLATILE
        .union(Self::COMPOSITE)
        .union(Self::CURSOR);
}

bitflags! {
    /// Selects the fields copied by
    /// [`SurfaceTable::sync_fields`](super::SurfaceTable::sync_fields).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SyncFields: u16 {
        /// [`SurfaceRecord::flags`](super::SurfaceRecord::flags).
        const FLAGS    = 1 << 0;
        /// [`SurfaceRecord::opacity`](super::SurfaceRecord::opacity).
        const OPACITY  = 1 << 1;
        /// Bitmap id and pixel format fields.
        const BITMAP   = 1 << 2;
        /// Pointer shape hint.
        const CURSOR   = 1 << 3;
        /// Stacking hint.
        const POP_OVER = 1 << 4;
        /// Custom render root.
        const ROOT     = 1 << 5;
        /// Relative position and size; triggers a relayout.
        const GEOMETRY = 1 << 6;
    }
}
