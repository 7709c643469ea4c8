// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared surface table and tree model for the lamina compositor.
//!
//! `lamina_core` owns the data that every cooperating process sees: one flat,
//! pre-ordered array of [`SurfaceRecord`](surface::SurfaceRecord)s describing
//! the surface tree, its z-order and the absolute geometry of every surface.
//! Rendering lives in `lamina_render`; this crate never touches pixels.
//!
//! # Architecture
//!
//! ```text
//!   SurfaceRegistry (process-wide service)
//!       │  acquire(mode, timeout)
//!       ▼
//!   TableGuard ──► SurfaceTable ──► track / untrack / update / sync_fields
//!       │                 │
//!       │                 └──► snapshot() ──► resolve::{is_visible, restrict_to_parent_bounds, is_volatile}
//!       ▼
//!   grow() under the dedicated grow lock, publishing a new MemoryId
//! ```
//!
//! **[`rect`]**: integer clip rectangles and the four-band split used by
//! the redraw and expose engines.
//!
//! **[`surface`]**: identifiers, flags, records, the table and its tree
//! operations, plus the visibility and volatility resolver.
//!
//! **[`shared`]**: the registry service, thread-local reference-counted
//! access guards and the segment mutex.
//!
//! **[`config`]**: capacity and timeout settings.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! compositor instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-pass
//!   summary events.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod error;
pub mod rect;
pub mod shared;
pub mod surface;
pub mod trace;

pub use error::TableError;
