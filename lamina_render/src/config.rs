// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor tuning.

use std::time::Duration;

/// Configuration for a [`Compositor`](crate::Compositor).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositorConfig {
    /// An occluding child with `width + height` at or below this is drawn
    /// over instead of split around, when the children are redrawn anyway.
    pub split_threshold: i32,
    /// How long to wait for a pixel buffer lock.
    pub bitmap_timeout: Duration,
    /// A moving region redraws its parent in two parts once the union of
    /// its old and new boxes exceeds this many times its own area.
    pub region_union_factor: i64,
    /// Merge pending requests for the same surface and kind.
    pub coalesce_messages: bool,
}

impl CompositorConfig {
    /// Settings used by a desktop session.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            split_threshold: 200,
            bitmap_timeout: Duration::from_secs(2),
            region_union_factor: 3,
            coalesce_messages: true,
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self::standard()
    }
}
