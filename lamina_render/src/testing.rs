// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared fixtures for the engine tests.

use std::sync::Arc;

use lamina_core::config::TableConfig;
use lamina_core::rect::ClipRect;
use lamina_core::shared::SurfaceRegistry;
use lamina_core::surface::{
    BitmapId, DisplayId, Geometry, SurfaceFlags, SurfaceId, SurfaceRecord, TaskId,
};
use parking_lot::Mutex;

use crate::compositor::{Compositor, SurfaceObject};
use crate::drawable::{Canvas, DrawHook, Drawable, SurfaceContext};
use crate::message::MessageBus;
use crate::raster::Colour;
use crate::soft::{SoftDisplay, SoftRaster};

type Log<T> = Arc<Mutex<Vec<T>>>;

/// Logs every draw (absolute clip) and resize it receives.
struct RecordingHook {
    surface: SurfaceId,
    draws: Log<(SurfaceId, ClipRect)>,
    resizes: Log<(SurfaceId, Geometry)>,
}

impl Drawable for RecordingHook {
    fn on_draw(&mut self, ctx: &SurfaceContext, canvas: &mut Canvas<'_>) {
        let clip = canvas.clip().translate(ctx.bounds.left, ctx.bounds.top);
        self.draws.lock().push((ctx.surface, clip));
    }

    fn on_resize(&mut self, geometry: Geometry) {
        self.resizes.lock().push((self.surface, geometry));
    }
}

/// A distinct opaque colour per surface id.
pub(crate) fn colour_for(id: u32) -> Colour {
    let [r, g, b, _] = id.wrapping_mul(0x9E37_79B9).to_be_bytes();
    Colour::rgb(r, g, b | 1)
}

/// One compositor on a 800x600 display, with its own registry and bus.
pub(crate) struct Harness {
    pub(crate) registry: Arc<SurfaceRegistry>,
    pub(crate) bus: Arc<MessageBus>,
    pub(crate) comp: Compositor<SoftRaster, SoftDisplay>,
    draws: Log<(SurfaceId, ClipRect)>,
    resizes: Log<(SurfaceId, Geometry)>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let registry = Arc::new(SurfaceRegistry::new(TableConfig::standard()));
        let bus = Arc::new(MessageBus::new());
        let mut display = SoftDisplay::new();
        display.add_display(DisplayId(1), 800, 600);
        let comp = Compositor::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            TaskId(1),
            SoftRaster::new(),
            display,
        );
        Self {
            registry,
            bus,
            comp,
            draws: Arc::default(),
            resizes: Arc::default(),
        }
    }

    fn register(&mut self, record: SurfaceRecord, colour: Colour) -> SurfaceId {
        let hook = RecordingHook {
            surface: record.id,
            draws: Arc::clone(&self.draws),
            resizes: Arc::clone(&self.resizes),
        };
        let object = SurfaceObject::new()
            .with_colour(colour)
            .with_hook(DrawHook::native(hook));
        self.comp
            .register_surface(record, object)
            .expect("surface registers");
        record.id
    }

    fn record(
        id: u32,
        parent: Option<SurfaceId>,
        bitmap: BitmapId,
        geometry: Geometry,
        flags: SurfaceFlags,
    ) -> SurfaceRecord {
        let mut record = SurfaceRecord::new(SurfaceId(id), bitmap, geometry)
            .with_flags(flags | SurfaceFlags::VISIBLE);
        record.parent = parent;
        record
    }

    /// A surface with its own buffer, filled with [`colour_for`] `id`.
    pub(crate) fn surface(
        &mut self,
        id: u32,
        parent: Option<SurfaceId>,
        geometry: Geometry,
        flags: SurfaceFlags,
    ) -> SurfaceId {
        self.comp
            .raster_mut()
            .add_bitmap(BitmapId(id), geometry.width, geometry.height);
        let record = Self::record(id, parent, BitmapId(id), geometry, flags);
        self.register(record, colour_for(id))
    }

    /// Like [`surface`](Self::surface) but without a background colour.
    pub(crate) fn surface_plain(
        &mut self,
        id: u32,
        parent: Option<SurfaceId>,
        geometry: Geometry,
        flags: SurfaceFlags,
    ) -> SurfaceId {
        self.comp
            .raster_mut()
            .add_bitmap(BitmapId(id), geometry.width, geometry.height);
        let record = Self::record(id, parent, BitmapId(id), geometry, flags);
        self.register(record, Colour::TRANSPARENT)
    }

    /// A child drawing into its parent's buffer.
    pub(crate) fn child_sharing(
        &mut self,
        id: u32,
        parent: SurfaceId,
        geometry: Geometry,
        flags: SurfaceFlags,
    ) -> SurfaceId {
        let bitmap = self.registry.record(parent).expect("parent tracked").bitmap;
        let record = Self::record(id, Some(parent), bitmap, geometry, flags);
        self.register(record, colour_for(id))
    }

    /// Every hook draw so far, as `(surface, absolute clip)`.
    pub(crate) fn draws(&self) -> Vec<(SurfaceId, ClipRect)> {
        self.draws.lock().clone()
    }

    /// The absolute clips drawn for `surface`, in order.
    pub(crate) fn draws_of(&self, surface: SurfaceId) -> Vec<ClipRect> {
        self.draws
            .lock()
            .iter()
            .filter(|(s, _)| *s == surface)
            .map(|(_, r)| *r)
            .collect()
    }

    pub(crate) fn clear_draws(&self) {
        self.draws.lock().clear();
    }

    pub(crate) fn resizes(&self) -> Vec<(SurfaceId, Geometry)> {
        self.resizes.lock().clone()
    }
}
