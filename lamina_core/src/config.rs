// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface table configuration.

use std::time::Duration;

/// Hard ceiling on the number of records a table may hold.
pub const MAX_RECORDS: usize = 0xffff;

/// Capacity and timeout settings for a
/// [`SurfaceRegistry`](crate::shared::SurfaceRegistry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableConfig {
    /// Records allocated when the registry is created.
    pub initial_capacity: usize,
    /// Growth never exceeds this many records. Clamped to [`MAX_RECORDS`].
    pub max_capacity: usize,
    /// Default timeout for table access.
    pub access_timeout: Duration,
    /// Timeout for the dedicated grow lock.
    pub grow_timeout: Duration,
}

impl TableConfig {
    /// Settings used by a desktop session.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            initial_capacity: 200,
            max_capacity: MAX_RECORDS,
            access_timeout: Duration::from_secs(4),
            grow_timeout: Duration::from_secs(5),
        }
    }

    /// Returns a copy with a different initial capacity.
    #[must_use]
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Returns a copy with a different growth ceiling.
    #[must_use]
    pub const fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// The capacity the table grows to from `current`.
    ///
    /// Doubles, clamped to the ceiling. Equal to `current` when no more
    /// growth is possible.
    #[must_use]
    pub fn next_capacity(&self, current: usize) -> usize {
        let ceiling = self.max_capacity.min(MAX_RECORDS);
        current.saturating_mul(2).max(1).min(ceiling).max(current)
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::standard()
    }
}
