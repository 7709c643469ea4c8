// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Redraw and exposure engines for the lamina compositor.
//!
//! A [`Compositor`] is one process's view of the shared surface table. It
//! owns the process-local surface objects (background colour and draw
//! hooks), the raster and display collaborators, and the drawing
//! suppression counters.
//!
//! ```text
//!   redraw_surface ──► clip to ancestors ──► occlusion scan ──► draw leaf ──► hooks
//!        │                                        │ split into bands
//!        └─► foreign task: post Invalidate/DrawArea to the MessageBus
//!
//!   expose_surface ──► clip ──► cursor split ──► back-to-front walk
//!        └─► expose_buffer: split around occluders ──► present to display
//!        └─► volatile siblings: redraw + expose
//! ```
//!
//! **[`raster`]**: the raster-library and display-device collaborator traits.
//!
//! **[`drawable`]**: typed draw hooks and the [`Canvas`](drawable::Canvas)
//! they paint into.
//!
//! **[`message`]**: cross-process requests and the coalescing
//! [`MessageBus`](message::MessageBus).
//!
//! **[`soft`]**: an in-memory raster and display used by tests and demos.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): forwards compositor events to the
//!   installed [`TraceSink`](lamina_core::trace::TraceSink).
//! - `trace-rich` (implies `trace`): also emits per-pass summaries.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod background;
mod compositor;
pub mod config;
pub mod drawable;
pub mod error;
mod expose;
pub mod flags;
pub mod message;
mod motion;
pub mod raster;
mod redraw;
pub mod soft;

#[cfg(test)]
mod testing;

pub use compositor::{Compositor, PassStats, SurfaceInfo, SurfaceObject};
pub use config::CompositorConfig;
pub use error::{CompositorError, RasterError};
pub use flags::{ExposeFlags, RedrawFlags};
