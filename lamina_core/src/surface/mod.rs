// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface records and the pre-ordered surface table.
//!
//! # Overview
//!
//! The surface tree is flattened into one array ordered by depth-first
//! pre-order traversal. A record's `level` is its depth (1 for top-level
//! surfaces) and its `parent` id names the record it is nested in. Later
//! records are in front of earlier ones.
//!
//! ```text
//!   idx  level  id
//!    0     1    desktop
//!    1     2      window A
//!    2     3        button
//!    3     2      window B      (in front of A and its button)
//!    4     2      pointer       (STICK_TO_FRONT | CURSOR)
//! ```
//!
//! # Absolute geometry
//!
//! Each record stores its geometry relative to its parent and the derived
//! absolute box. Tree operations keep the absolute boxes consistent; a
//! single forward pass suffices because parents precede children.
//!
//! # Bitmaps
//!
//! A child whose `bitmap` equals its parent's draws into the parent's
//! buffer. A run of such records is one compositing unit, owned by the
//! topmost record of the run ([`SurfaceTable::bitmap_owner`]).

mod flags;
mod id;
mod record;
pub mod resolve;
mod table;
mod tree;

pub use flags::{SurfaceFlags, SyncFields};
pub use id::{BitmapId, DisplayId, MemoryId, SurfaceId, TaskId};
pub use record::{Geometry, SurfaceRecord};
pub use table::{SurfaceTable, bitmap_owner, display_root, find_index, parent_index, span_end};
pub use tree::{Removal, relayout};
