// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A compositor on an in-memory display, plus a fluent builder for the
//! surfaces on it.
//!
//! ```text
//!   TableFixture::new(800, 600)
//!       .surface(1, Geometry::new(0, 0, 800, 600)).register()?      // top level
//!       .surface(2, Geometry::new(100, 100, 200, 200))
//!           .parent(SurfaceId(1)).flags(SurfaceFlags::TRANSPARENT)
//!           .register()?
//! ```
//!
//! Every registered surface carries a [`DrawLog`] hook, so a check can see
//! exactly which areas the redraw engine handed to each surface.

use std::sync::Arc;

use lamina_core::TableError;
use lamina_core::config::TableConfig;
use lamina_core::rect::ClipRect;
use lamina_core::shared::SurfaceRegistry;
use lamina_core::surface::{
    BitmapId, DisplayId, Geometry, SurfaceFlags, SurfaceId, SurfaceRecord, TaskId,
};
use lamina_render::drawable::{Canvas, DrawHook, Drawable, SurfaceContext};
use lamina_render::message::MessageBus;
use lamina_render::raster::Colour;
use lamina_render::soft::{SoftDisplay, SoftRaster};
use lamina_render::{Compositor, CompositorError, SurfaceObject};
use parking_lot::Mutex;
use tracing::debug;

/// The display every fixture presents to.
pub const DISPLAY: DisplayId = DisplayId(1);

/// The task that owns fixture surfaces unless a builder says otherwise.
pub const TASK: TaskId = TaskId(1);

/// The compositor type fixtures drive.
pub type SoftCompositor = Compositor<SoftRaster, SoftDisplay>;

// ---------------------------------------------------------------------------
// DrawLog
// ---------------------------------------------------------------------------

/// Shared log of `(surface, absolute clip)` pairs, one per hook call.
#[derive(Clone, Debug, Default)]
pub struct DrawLog(Arc<Mutex<Vec<(SurfaceId, ClipRect)>>>);

impl DrawLog {
    /// Every draw so far.
    #[must_use]
    pub fn entries(&self) -> Vec<(SurfaceId, ClipRect)> {
        self.0.lock().clone()
    }

    /// Draws handed to `surface`, in order.
    #[must_use]
    pub fn for_surface(&self, surface: SurfaceId) -> Vec<ClipRect> {
        self.0
            .lock()
            .iter()
            .filter(|(s, _)| *s == surface)
            .map(|(_, r)| *r)
            .collect()
    }

    /// Total pixels handed to `surface`.
    #[must_use]
    pub fn area_for(&self, surface: SurfaceId) -> i64 {
        self.for_surface(surface).iter().map(ClipRect::area).sum()
    }

    /// Forgets everything logged so far.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn hook(&self) -> DrawHook {
        DrawHook::native(LogHook(self.clone()))
    }
}

struct LogHook(DrawLog);

impl Drawable for LogHook {
    fn on_draw(&mut self, ctx: &SurfaceContext, canvas: &mut Canvas<'_>) {
        let clip = canvas.clip().translate(ctx.bounds.left, ctx.bounds.top);
        self.0.0.lock().push((ctx.surface, clip));
    }
}

/// A distinct opaque colour for every surface id.
#[must_use]
pub fn palette(id: u32) -> Colour {
    let [r, g, b, _] = id.wrapping_mul(0x9E37_79B9).to_be_bytes();
    Colour::rgb(r, g, b | 1)
}

// ---------------------------------------------------------------------------
// TableFixture
// ---------------------------------------------------------------------------

/// One registry, one message bus and one compositor on a single display.
pub struct TableFixture {
    registry: Arc<SurfaceRegistry>,
    bus: Arc<MessageBus>,
    compositor: SoftCompositor,
    log: DrawLog,
    width: i32,
    height: i32,
}

impl std::fmt::Debug for TableFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableFixture")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl TableFixture {
    /// A fixture with the standard table settings and a `width` x `height`
    /// display.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_table_config(TableConfig::standard(), width, height)
    }

    /// A fixture whose registry uses `config`.
    #[must_use]
    pub fn with_table_config(config: TableConfig, width: i32, height: i32) -> Self {
        let registry = Arc::new(SurfaceRegistry::new(config));
        let bus = Arc::new(MessageBus::new());
        let mut display = SoftDisplay::new();
        display.add_display(DISPLAY, width, height);
        let compositor = Compositor::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            TASK,
            SoftRaster::new(),
            display,
        );
        debug!(width, height, "fixture created");
        Self {
            registry,
            bus,
            compositor,
            log: DrawLog::default(),
            width,
            height,
        }
    }

    /// Starts describing surface `id` at `geometry` (parent-relative).
    pub fn surface(&mut self, id: u32, geometry: Geometry) -> SurfaceBuilder<'_> {
        SurfaceBuilder {
            fixture: self,
            id: SurfaceId(id),
            geometry,
            parent: None,
            flags: SurfaceFlags::empty(),
            share_bitmap: false,
            colour: Some(palette(id)),
            opacity: 255,
            hidden: false,
        }
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SurfaceRegistry> {
        &self.registry
    }

    /// The message bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The compositor.
    #[must_use]
    pub fn compositor(&self) -> &SoftCompositor {
        &self.compositor
    }

    /// The compositor, mutably.
    pub fn compositor_mut(&mut self) -> &mut SoftCompositor {
        &mut self.compositor
    }

    /// The draw log shared by every fixture surface.
    #[must_use]
    pub fn draws(&self) -> &DrawLog {
        &self.log
    }

    /// The display area.
    #[must_use]
    pub fn display_rect(&self) -> ClipRect {
        ClipRect::new(0, 0, self.width, self.height)
    }

    /// A copy of the current table.
    ///
    /// # Errors
    ///
    /// Table lock failures.
    pub fn snapshot(&self) -> Result<Vec<SurfaceRecord>, TableError> {
        self.registry.snapshot()
    }

    /// Hash of the display's framebuffer.
    #[must_use]
    pub fn display_hash(&self) -> u64 {
        self.compositor
            .display()
            .framebuffer(DISPLAY)
            .map_or(0, crate::buffer_hash)
    }

    /// Hash of one surface bitmap, or `None` if it does not exist.
    #[must_use]
    pub fn bitmap_hash(&self, bitmap: BitmapId) -> Option<u64> {
        self.compositor.raster().bitmap(bitmap).map(crate::buffer_hash)
    }
}

// ---------------------------------------------------------------------------
// SurfaceBuilder
// ---------------------------------------------------------------------------

/// Describes one surface before it is registered.
///
/// Defaults: top level, no flags, its own bitmap, filled with [`palette`].
#[must_use = "a surface is only tracked once `register` is called"]
#[derive(Debug)]
pub struct SurfaceBuilder<'a> {
    fixture: &'a mut TableFixture,
    id: SurfaceId,
    geometry: Geometry,
    parent: Option<SurfaceId>,
    flags: SurfaceFlags,
    share_bitmap: bool,
    colour: Option<Colour>,
    opacity: u8,
    hidden: bool,
}

impl SurfaceBuilder<'_> {
    /// Nests the surface under `parent`.
    pub fn parent(mut self, parent: SurfaceId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds state flags. `VISIBLE` is implied unless [`hidden`](Self::hidden).
    pub fn flags(mut self, flags: SurfaceFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Draws into the parent's bitmap instead of a new one.
    pub fn sharing_parent_bitmap(mut self) -> Self {
        self.share_bitmap = true;
        self
    }

    /// Leaves the background unfilled.
    pub fn unfilled(mut self) -> Self {
        self.colour = None;
        self
    }

    /// Fills the background with `colour`.
    pub fn colour(mut self, colour: Colour) -> Self {
        self.colour = Some(colour);
        self
    }

    /// Sets the opacity used by after-copy.
    pub fn opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self
    }

    /// Registers the surface without `VISIBLE`.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Tracks the surface and gives the compositor its object.
    ///
    /// # Errors
    ///
    /// - [`TableError::NotFound`] (wrapped) if a shared bitmap's parent is
    ///   not tracked.
    /// - Anything [`Compositor::register_surface`] reports.
    pub fn register(self) -> Result<SurfaceId, CompositorError> {
        let Self {
            fixture,
            id,
            geometry,
            parent,
            mut flags,
            share_bitmap,
            colour,
            opacity,
            hidden,
        } = self;

        let bitmap = match parent {
            Some(p) if share_bitmap => fixture.registry.record(p)?.bitmap,
            _ => {
                let bitmap = BitmapId(id.0);
                fixture
                    .compositor
                    .raster_mut()
                    .add_bitmap(bitmap, geometry.width, geometry.height);
                bitmap
            }
        };
        if !hidden {
            flags |= SurfaceFlags::VISIBLE;
        }

        let mut record = SurfaceRecord::new(id, bitmap, geometry)
            .with_flags(flags)
            .with_display(DISPLAY)
            .with_opacity(opacity);
        record.parent = parent;

        let mut object = SurfaceObject::new().with_hook(fixture.log.hook());
        if let Some(colour) = colour {
            object = object.with_colour(colour);
        }
        fixture.compositor.register_surface(record, object)?;
        Ok(id)
    }
}
