// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor and collaborator errors.

use lamina_core::TableError;
use lamina_core::surface::{BitmapId, DisplayId, SurfaceId, TaskId};
use thiserror::Error;

/// Failures reported by a [`Raster`](crate::raster::Raster) or
/// [`DisplayDevice`](crate::raster::DisplayDevice).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    /// The pixel buffer is locked elsewhere.
    #[error("bitmap {0:?} is busy")]
    Busy(BitmapId),
    /// The pixel buffer no longer exists.
    #[error("bitmap {0:?} does not exist")]
    NoSuchObject(BitmapId),
    /// The display could not be acquired.
    #[error("display {0:?} is unavailable")]
    Display(DisplayId),
    /// A scratch buffer could not be allocated.
    #[error("out of memory allocating a bitmap")]
    OutOfMemory,
}

/// Failures of compositor operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompositorError {
    /// The shared table could not be accessed or mutated.
    #[error(transparent)]
    Table(#[from] TableError),
    /// The target's pixel buffer could not be locked in time.
    #[error("pixel buffer {0:?} could not be locked")]
    Lock(BitmapId),
    /// A raster or display call failed.
    #[error(transparent)]
    Raster(#[from] RasterError),
    /// The table lists the surface for this task but no object backs it.
    ///
    /// The surface has already been removed from the table when this is
    /// returned.
    #[error("no object for surface {0:?}; removed from the table")]
    NoMatchingObject(SurfaceId),
    /// A request could not be queued for another task.
    #[error("task {0:?} has no message queue")]
    Message(TaskId),
}

impl CompositorError {
    /// Returns `true` if the failure was handled by removing a dead surface.
    ///
    /// Recursive passes skip such surfaces and carry on.
    #[must_use]
    pub const fn is_self_healed(&self) -> bool {
        matches!(
            self,
            Self::NoMatchingObject(_) | Self::Raster(RasterError::NoSuchObject(_))
        )
    }
}
