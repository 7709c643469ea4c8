// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors raised by the surface table.

use std::time::Duration;

use thiserror::Error;

use crate::shared::AccessMode;
use crate::surface::{MemoryId, SurfaceId};

/// Failures of table access and tree mutation.
///
/// Lock failures never leave the table partially mutated: every mutation
/// happens inside one acquire/release span.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// The segment mutex could not be taken in time.
    #[error("timed out after {timeout:?} waiting for {mode:?} access to the surface table")]
    LockTimeout {
        /// Requested access intent.
        mode: AccessMode,
        /// How long the caller waited.
        timeout: Duration,
    },
    /// The shared block backing the table is not mapped by this thread.
    #[error("surface table block {0:?} is not mapped")]
    AccessMemory(MemoryId),
    /// No free record slot and the table cannot grow further.
    #[error("surface table is full ({capacity} records)")]
    ArrayFull {
        /// Capacity at the time of the failure.
        capacity: usize,
    },
    /// Growth was requested while this thread holds nested access.
    #[error("surface table cannot grow while access is nested")]
    GrowReentrant,
    /// The surface is not tracked.
    #[error("surface {0:?} is not in the table")]
    NotFound(SurfaceId),
    /// The parent named by a new record is not tracked.
    #[error("parent surface {0:?} is not in the table")]
    ParentNotFound(SurfaceId),
    /// The surface is already tracked.
    #[error("surface {0:?} is already tracked")]
    DuplicateSurface(SurfaceId),
}

impl TableError {
    /// Returns `true` for errors that mean "the surface went away".
    ///
    /// Redraw and expose treat these as success.
    #[must_use]
    pub const fn is_missing_surface(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ParentNotFound(_))
    }
}
