// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable fixtures, coverage tracking and grading for lamina compositor
//! checks.
//!
//! - [`TableFixture`] builds surface trees on an in-memory display and logs
//!   every draw the redraw engine hands out.
//! - [`CoverageTracker`] checks a set of presents against the table: every
//!   visible pixel should reach the display exactly once, from the buffer
//!   of the topmost surface covering it.
//! - [`buffer_hash`] fingerprints a pixel buffer, for idempotence checks.

mod coverage;
mod fixture;

#[cfg(test)]
mod scenarios;

use std::hash::{DefaultHasher, Hash, Hasher};

use lamina_render::soft::SoftBitmap;

pub use coverage::{CoverageGrade, CoverageReport, CoverageTracker};
pub use fixture::{DISPLAY, DrawLog, SoftCompositor, SurfaceBuilder, TASK, TableFixture, palette};

/// Fingerprint of a bitmap's size, depth and pixels.
///
/// Stable within one process only.
#[must_use]
pub fn buffer_hash(bitmap: &SoftBitmap) -> u64 {
    let mut hasher = DefaultHasher::new();
    bitmap.width().hash(&mut hasher);
    bitmap.height().hash(&mut hasher);
    bitmap.bits_per_pixel().hash(&mut hasher);
    bitmap.pixels().hash(&mut hasher);
    hasher.finish()
}
