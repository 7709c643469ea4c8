// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw hooks: how content plugs into the redraw engine.
//!
//! A surface carries zero or more [`DrawHook`]s. When the redraw engine
//! reaches a leaf rectangle it prepares the background and then calls each
//! hook in registration order with a [`Canvas`] clipped to that rectangle.
//!
//! Hooks come in two kinds. [`Drawable`] implementations run natively.
//! Script hooks name a procedure that an installed [`ScriptHost`] runs.

use std::fmt;

use lamina_core::rect::ClipRect;
use lamina_core::surface::{BitmapId, Geometry, SurfaceFlags, SurfaceId};

use crate::error::RasterError;
use crate::raster::{Colour, Raster};

/// Identifies a script environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u32);

/// Handle returned when a hook is added, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u32);

/// What a hook knows about the surface being drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceContext {
    /// The surface.
    pub surface: SurfaceId,
    /// Its relative geometry.
    pub geometry: Geometry,
    /// Its absolute bounding box.
    pub bounds: ClipRect,
    /// Its flags.
    pub flags: SurfaceFlags,
}

/// A clipped view of one surface's area within its bitmap.
///
/// All coordinates are relative to the surface's top-left corner. Every
/// operation is clipped to the damage rectangle being drawn.
pub struct Canvas<'a> {
    raster: &'a mut dyn Raster,
    bitmap: BitmapId,
    offset_x: i32,
    offset_y: i32,
    clip: ClipRect,
}

impl fmt::Debug for Canvas<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("bitmap", &self.bitmap)
            .field("offset", &(self.offset_x, self.offset_y))
            .field("clip", &self.clip)
            .finish_non_exhaustive()
    }
}

impl<'a> Canvas<'a> {
    /// Creates a canvas for a surface at `(offset_x, offset_y)` inside
    /// `bitmap`, limited to `clip` (surface-relative).
    #[must_use]
    pub fn new(
        raster: &'a mut dyn Raster,
        bitmap: BitmapId,
        offset_x: i32,
        offset_y: i32,
        clip: ClipRect,
    ) -> Self {
        Self {
            raster,
            bitmap,
            offset_x,
            offset_y,
            clip,
        }
    }

    /// The bitmap being drawn into.
    #[must_use]
    pub fn bitmap(&self) -> BitmapId {
        self.bitmap
    }

    /// The surface's position inside the bitmap.
    #[must_use]
    pub fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    /// The damage rectangle, relative to the surface.
    #[must_use]
    pub fn clip(&self) -> ClipRect {
        self.clip
    }

    /// Fills `rect` (surface-relative) with `colour`.
    ///
    /// # Errors
    ///
    /// Propagates raster failures.
    pub fn fill(&mut self, rect: ClipRect, colour: Colour) -> Result<(), RasterError> {
        let rect = rect.intersect(&self.clip);
        if rect.is_empty() {
            return Ok(());
        }
        let pixel = self.raster.pack_colour(self.bitmap, colour);
        self.raster
            .fill_rect(self.bitmap, rect.translate(self.offset_x, self.offset_y), pixel)
    }

    /// Fills the whole damage rectangle with `colour`.
    ///
    /// # Errors
    ///
    /// Propagates raster failures.
    pub fn clear(&mut self, colour: Colour) -> Result<(), RasterError> {
        self.fill(self.clip, colour)
    }

    /// Direct access to the raster for operations the canvas lacks.
    ///
    /// Callers are responsible for staying inside [`clip`](Self::clip).
    pub fn raster(&mut self) -> &mut dyn Raster {
        self.raster
    }
}

/// Natively implemented surface content.
pub trait Drawable {
    /// Paints the canvas's damage rectangle.
    fn on_draw(&mut self, ctx: &SurfaceContext, canvas: &mut Canvas<'_>);

    /// Called after the surface's size or position changed.
    fn on_resize(&mut self, geometry: Geometry) {
        _ = geometry;
    }
}

/// Runs script-defined draw procedures.
pub trait ScriptHost {
    /// Calls `procedure` in environment `host`.
    ///
    /// # Errors
    ///
    /// Raster failures raised by the procedure.
    fn call(
        &mut self,
        host: ScriptId,
        procedure: &str,
        ctx: &SurfaceContext,
        canvas: &mut Canvas<'_>,
    ) -> Result<(), RasterError>;
}

/// One registered draw callback.
pub enum DrawHook {
    /// A native implementation.
    Native(Box<dyn Drawable + Send>),
    /// A procedure run by the compositor's [`ScriptHost`].
    Script {
        /// Script environment.
        host: ScriptId,
        /// Procedure name.
        procedure: String,
    },
}

impl fmt::Debug for DrawHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native(..)"),
            Self::Script { host, procedure } => f
                .debug_struct("Script")
                .field("host", host)
                .field("procedure", procedure)
                .finish(),
        }
    }
}

impl DrawHook {
    /// Wraps a native drawable.
    pub fn native(drawable: impl Drawable + Send + 'static) -> Self {
        Self::Native(Box::new(drawable))
    }
}

/// Fills its whole damage rectangle with one colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolidFill(pub Colour);

impl Drawable for SolidFill {
    fn on_draw(&mut self, _ctx: &SurfaceContext, canvas: &mut Canvas<'_>) {
        if let Err(e) = canvas.clear(self.0) {
            tracing::warn!(error = %e, "solid fill failed");
        }
    }
}
