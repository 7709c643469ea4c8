// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Options for redraw and expose calls.

use bitflags::bitflags;

bitflags! {
    /// Options for [`Compositor::redraw_surface`](crate::Compositor::redraw_surface).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RedrawFlags: u32 {
        /// Draw even if hidden, and skip the occlusion scan.
        const FORCE_DRAW         = 1 << 0;
        /// Do not redraw descendants.
        const IGNORE_CHILDREN    = 1 << 1;
        /// Redraw only volatile descendants.
        const IGNORE_NV_CHILDREN = 1 << 2;
        /// Redraw only descendants sharing the target's bitmap.
        const SINGLE_BITMAP      = 1 << 3;
        /// The area is relative to the target's top-left corner.
        const RELATIVE           = 1 << 4;
    }
}

bitflags! {
    /// Options for [`Compositor::expose_surface`](crate::Compositor::expose_surface).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ExposeFlags: u32 {
        /// Include the target's descendants.
        const CHILDREN                = 1 << 0;
        /// The area is in absolute coordinates.
        const ABSOLUTE                = 1 << 1;
        /// Already split around the cursor; do not split again.
        const CURSOR_SPLIT            = 1 << 2;
        /// Redraw and expose volatile surfaces over the area afterwards.
        const REDRAW_VOLATILE         = 1 << 3;
        /// Like `REDRAW_VOLATILE`, skipping the target's own subtree.
        const REDRAW_VOLATILE_OVERLAP = 1 << 4;
    }
}
