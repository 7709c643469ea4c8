// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured diagnostics for the redraw and expose engines.
//!
//! [`TraceSink`] has one method per compositor event; every body defaults to
//! a no-op, so a sink implements only what it needs.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. With the `trace`
//! feature **off**, every `Tracer` method compiles to nothing. With it
//! **on**, each method does a single `Option` branch before dispatching.
//!
//! Operational logging (growth, self-healing removals, lock traffic) goes
//! through the `tracing` crate instead; these events carry the per-rectangle
//! detail needed to replay a pass offline.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies.
//! - `trace-rich` (implies `trace`): gates [`PassSummary`] and
//!   [`TraceSink::on_pass_summary`].

use crate::rect::ClipRect;
use crate::surface::{BitmapId, DisplayId, MemoryId, SurfaceId, TaskId};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why a surface span left the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The owning process untracked it.
    Untracked,
    /// A pass found no live object behind the record.
    OwnerGone,
    /// The record's pixel buffer no longer exists.
    BitmapGone,
}

/// Kind of a cross-process request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Draw only the surface itself in an area.
    DrawArea,
    /// Redraw the surface and its children in an area.
    Invalidate,
    /// Retry an expose whose pixel buffer was busy.
    Expose,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// One leaf draw into a bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawEvent {
    /// Surface that was drawn.
    pub surface: SurfaceId,
    /// Bitmap that received the pixels.
    pub bitmap: BitmapId,
    /// Absolute area drawn.
    pub clip: ClipRect,
}

/// A damage rectangle was split around an occluder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitEvent {
    /// Surface being drawn or exposed.
    pub surface: SurfaceId,
    /// Record that covered part of the rectangle.
    pub occluder: SurfaceId,
    /// Rectangle before the split.
    pub rect: ClipRect,
}

/// One present to a display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlitEvent {
    /// Surface whose pixels were shown.
    pub surface: SurfaceId,
    /// Source bitmap (the scratch buffer's owner when composited).
    pub bitmap: BitmapId,
    /// Target display.
    pub display: DisplayId,
    /// Source area within the bitmap.
    pub source: ClipRect,
    /// Destination left edge on the display.
    pub dest_x: i32,
    /// Destination top edge on the display.
    pub dest_y: i32,
    /// Whether the pixels went through the compositing scratch buffer.
    pub composited: bool,
}

/// A surface span left the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovalEvent {
    /// Root of the removed span.
    pub surface: SurfaceId,
    /// Records removed, including the root.
    pub removed: usize,
    /// Why.
    pub reason: RemovalReason,
}

/// A request was queued for another process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    /// Receiving process.
    pub task: TaskId,
    /// Surface the request is about.
    pub surface: SurfaceId,
    /// Request kind.
    pub kind: MessageKind,
    /// Absolute area.
    pub area: ClipRect,
    /// `true` if merged into an already queued request.
    pub coalesced: bool,
}

/// The table moved to a larger block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrowEvent {
    /// Capacity before growth.
    pub old_capacity: usize,
    /// Capacity after growth.
    pub new_capacity: usize,
    /// Identifier of the newly published block.
    pub memory: MemoryId,
}

/// Counters for one top-level redraw or expose call.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Surface the pass started from.
    pub surface: Option<SurfaceId>,
    /// Leaf draws.
    pub draws: u32,
    /// Occlusion splits.
    pub splits: u32,
    /// Presents.
    pub blits: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives compositor events.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called after a leaf draw.
    fn on_draw(&mut self, e: &DrawEvent) {
        _ = e;
    }

    /// Called when a rectangle is split around an occluder.
    fn on_split(&mut self, e: &SplitEvent) {
        _ = e;
    }

    /// Called after pixels are presented.
    fn on_blit(&mut self, e: &BlitEvent) {
        _ = e;
    }

    /// Called when a span is removed from the table.
    fn on_removal(&mut self, e: &RemovalEvent) {
        _ = e;
    }

    /// Called when a cross-process request is queued.
    fn on_message(&mut self, e: &MessageEvent) {
        _ = e;
    }

    /// Called after the table grows.
    fn on_grow(&mut self, e: &GrowEvent) {
        _ = e;
    }

    /// Called at the end of a top-level pass (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    fn on_pass_summary(&mut self, s: &PassSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer from an optional sink.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(s) => Self::new(s),
            None => Self::none(),
        }
    }

    /// Emits a [`DrawEvent`].
    #[inline]
    pub fn draw(&mut self, e: &DrawEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_draw(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`SplitEvent`].
    #[inline]
    pub fn split(&mut self, e: &SplitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_split(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BlitEvent`].
    #[inline]
    pub fn blit(&mut self, e: &BlitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_blit(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RemovalEvent`].
    #[inline]
    pub fn removal(&mut self, e: &RemovalEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_removal(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`MessageEvent`].
    #[inline]
    pub fn message(&mut self, e: &MessageEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_message(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`GrowEvent`].
    #[inline]
    pub fn grow(&mut self, e: &GrowEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_grow(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PassSummary`] (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn pass_summary(&mut self, s: &PassSummary) {
        if let Some(sink) = &mut self.sink {
            sink.on_pass_summary(s);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
