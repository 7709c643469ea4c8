// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-task compositor service.
//!
//! One [`Compositor`] exists per task (process). It shares the
//! [`SurfaceRegistry`] and [`MessageBus`] with every other task and owns
//! everything local: surface objects, the raster and display
//! collaborators, the suppression counters and the compositing scratch
//! buffer.
//!
//! Redraw and expose passes run on a snapshot of the table, so the table
//! lock is held only while copying. Surfaces found dead during a pass are
//! untracked from the shared table and hidden in the snapshot, so the rest
//! of the pass skips them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lamina_core::TableError;
use lamina_core::rect::ClipRect;
use lamina_core::shared::{AccessMode, SurfaceRegistry, Tracked};
use lamina_core::surface::{
    BitmapId, Removal, SurfaceFlags, SurfaceId, SurfaceRecord, SyncFields, TaskId, resolve,
    span_end,
};
use lamina_core::trace::{MessageEvent, RemovalEvent, RemovalReason, TraceSink, Tracer};
use tracing::{debug, trace, warn};

use crate::config::CompositorConfig;
use crate::drawable::{DrawHook, HookId, ScriptHost};
use crate::error::CompositorError;
use crate::flags::{ExposeFlags, RedrawFlags};
use crate::message::{MessageBus, Request, SurfaceMessage};
use crate::raster::{Colour, DisplayDevice, Raster};

/// Process-local state behind a tracked surface.
#[derive(Debug, Default)]
pub struct SurfaceObject {
    pub(crate) colour: Colour,
    pub(crate) hooks: Vec<(HookId, DrawHook)>,
    pub(crate) inherited_root: bool,
    next_hook: u32,
}

impl SurfaceObject {
    /// An object with no background and no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the background colour. Alpha 0 disables the fill.
    #[must_use]
    pub fn with_colour(mut self, colour: Colour) -> Self {
        self.colour = colour;
        self
    }

    /// Adds a draw hook.
    #[must_use]
    pub fn with_hook(mut self, hook: DrawHook) -> Self {
        self.add_hook(hook);
        self
    }

    /// Marks the record's custom root as inherited from an ancestor.
    ///
    /// An inherited root only affects background preparation when the root
    /// itself is volatile.
    #[must_use]
    pub fn with_inherited_root(mut self, inherited: bool) -> Self {
        self.inherited_root = inherited;
        self
    }

    /// The background colour.
    #[must_use]
    pub fn colour(&self) -> Colour {
        self.colour
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Appends a hook; it runs after the existing ones.
    pub fn add_hook(&mut self, hook: DrawHook) -> HookId {
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        self.hooks.push((id, hook));
        id
    }

    /// Removes a hook by id.
    pub fn remove_hook(&mut self, id: HookId) -> Option<DrawHook> {
        let pos = self.hooks.iter().position(|(h, _)| *h == id)?;
        Some(self.hooks.remove(pos).1)
    }
}

/// A record plus where its pixels live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Copy of the shared record.
    pub record: SurfaceRecord,
    /// The ancestor that owns the record's bitmap (possibly itself).
    pub bitmap_owner: SurfaceId,
    /// Absolute left edge of the bitmap owner.
    pub owner_left: i32,
    /// Absolute top edge of the bitmap owner.
    pub owner_top: i32,
}

/// Work counters, accumulated until [`Compositor::take_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Leaf draws.
    pub draws: u32,
    /// Occlusion splits, in both engines.
    pub splits: u32,
    /// Presents to a display.
    pub blits: u32,
    /// Requests posted to other tasks or retried.
    pub messages: u32,
}

/// The compositing scratch bitmap.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Scratch {
    pub(crate) bitmap: BitmapId,
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) bits_per_pixel: u8,
}

/// One task's redraw and expose service.
pub struct Compositor<R, D> {
    pub(crate) registry: Arc<SurfaceRegistry>,
    pub(crate) bus: Arc<MessageBus>,
    pub(crate) task: TaskId,
    pub(crate) config: CompositorConfig,
    pub(crate) raster: R,
    pub(crate) display: D,
    pub(crate) scripts: Option<Box<dyn ScriptHost + Send>>,
    pub(crate) objects: HashMap<SurfaceId, SurfaceObject>,
    pub(crate) forbid_draw: u32,
    pub(crate) forbid_expose: u32,
    pub(crate) scratch: Option<Scratch>,
    pub(crate) volatile_start: Option<usize>,
    pub(crate) stats: PassStats,
    sink: Option<Box<dyn TraceSink + Send>>,
    pass_depth: u32,
    #[cfg_attr(
        not(feature = "trace-rich"),
        expect(dead_code, reason = "read only when pass summaries are emitted")
    )]
    pass_start: PassStats,
}

impl<R, D> fmt::Debug for Compositor<R, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compositor")
            .field("task", &self.task)
            .field("config", &self.config)
            .field("objects", &self.objects.len())
            .field("forbid_draw", &self.forbid_draw)
            .field("forbid_expose", &self.forbid_expose)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<R: Raster, D: DisplayDevice> Compositor<R, D> {
    /// Creates the compositor for `task` and opens its message queue.
    #[must_use]
    pub fn new(
        registry: Arc<SurfaceRegistry>,
        bus: Arc<MessageBus>,
        task: TaskId,
        raster: R,
        display: D,
    ) -> Self {
        bus.register_task(task);
        debug!(?task, "compositor created");
        Self {
            registry,
            bus,
            task,
            config: CompositorConfig::standard(),
            raster,
            display,
            scripts: None,
            objects: HashMap::new(),
            forbid_draw: 0,
            forbid_expose: 0,
            scratch: None,
            volatile_start: None,
            stats: PassStats::default(),
            sink: None,
            pass_depth: 0,
            pass_start: PassStats::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CompositorConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs the host that runs script hooks.
    #[must_use]
    pub fn with_script_host(mut self, host: impl ScriptHost + Send + 'static) -> Self {
        self.scripts = Some(Box::new(host));
        self
    }

    /// Installs a diagnostics sink.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: impl TraceSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    // -- Accessors --

    /// The task this compositor draws for.
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SurfaceRegistry> {
        &self.registry
    }

    /// The raster collaborator.
    #[must_use]
    pub fn raster(&self) -> &R {
        &self.raster
    }

    /// Mutable access to the raster collaborator.
    pub fn raster_mut(&mut self) -> &mut R {
        &mut self.raster
    }

    /// The display collaborator.
    #[must_use]
    pub fn display(&self) -> &D {
        &self.display
    }

    /// Mutable access to the display collaborator.
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Returns the counters and resets them.
    pub fn take_stats(&mut self) -> PassStats {
        std::mem::take(&mut self.stats)
    }

    // -- Surface objects --

    /// Tracks `record` for this task and stores its object.
    ///
    /// The record's task is overwritten with this compositor's.
    ///
    /// # Errors
    ///
    /// Any [`TableError`] from tracking.
    pub fn register_surface(
        &mut self,
        record: SurfaceRecord,
        object: SurfaceObject,
    ) -> Result<Tracked, CompositorError> {
        let record = record.with_task(self.task);
        let tracked = self.registry.track(record)?;
        if let Some(grown) = tracked.grown {
            self.tracer().grow(&grown);
        }
        self.objects.insert(record.id, object);
        trace!(surface = ?record.id, index = tracked.index, "surface registered");
        Ok(tracked)
    }

    /// Untracks `id` with its descendants and drops their objects.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id`
    /// is not tracked.
    pub fn unregister_surface(&mut self, id: SurfaceId) -> Result<Removal, CompositorError> {
        let recs = self.snapshot()?;
        let removal = self.registry.untrack(id)?;
        if let Some(idx) = recs.iter().position(|r| r.id == id) {
            for r in &recs[idx..span_end(&recs, idx)] {
                self.objects.remove(&r.id);
            }
        }
        self.tracer().removal(&RemovalEvent {
            surface: id,
            removed: removal.count,
            reason: RemovalReason::Untracked,
        });
        Ok(removal)
    }

    /// The object behind `id`, if this task owns one.
    #[must_use]
    pub fn object(&self, id: SurfaceId) -> Option<&SurfaceObject> {
        self.objects.get(&id)
    }

    /// Mutable access to the object behind `id`.
    pub fn object_mut(&mut self, id: SurfaceId) -> Option<&mut SurfaceObject> {
        self.objects.get_mut(&id)
    }

    /// Adds a draw hook to `id`.
    ///
    /// # Errors
    ///
    /// [`CompositorError::NoMatchingObject`] if this task has no object
    /// for `id`.
    pub fn add_draw_hook(&mut self, id: SurfaceId, hook: DrawHook) -> Result<HookId, CompositorError> {
        self.objects
            .get_mut(&id)
            .map(|o| o.add_hook(hook))
            .ok_or(CompositorError::NoMatchingObject(id))
    }

    /// Removes a draw hook from `id`.
    pub fn remove_draw_hook(&mut self, id: SurfaceId, hook: HookId) -> Option<DrawHook> {
        self.objects.get_mut(&id)?.remove_hook(hook)
    }

    // -- Suppression --

    /// Suppresses redraws and exposes until [`permit_drawing`](Self::permit_drawing).
    pub fn forbid_drawing(&mut self) {
        self.forbid_draw += 1;
        self.forbid_expose += 1;
    }

    /// Suppresses exposes until [`permit_expose`](Self::permit_expose).
    pub fn forbid_expose(&mut self) {
        self.forbid_expose += 1;
    }

    /// Undoes one [`forbid_drawing`](Self::forbid_drawing).
    pub fn permit_drawing(&mut self) {
        self.forbid_draw = self.forbid_draw.saturating_sub(1);
        self.forbid_expose = self.forbid_expose.saturating_sub(1);
    }

    /// Undoes one [`forbid_expose`](Self::forbid_expose).
    pub fn permit_expose(&mut self) {
        self.forbid_expose = self.forbid_expose.saturating_sub(1);
    }

    /// Returns `true` while redraws are suppressed.
    #[must_use]
    pub fn is_drawing_forbidden(&self) -> bool {
        self.forbid_draw > 0
    }

    /// Returns `true` while exposes are suppressed.
    #[must_use]
    pub fn is_expose_forbidden(&self) -> bool {
        self.forbid_expose > 0
    }

    // -- Queries --

    /// Absolute area of `id` left after clipping by every ancestor.
    ///
    /// `None` if hidden, degenerate or untracked.
    ///
    /// # Errors
    ///
    /// Lock failures.
    pub fn visible_area(&self, id: SurfaceId) -> Result<Option<ClipRect>, CompositorError> {
        let guard = self.registry.access(AccessMode::Read)?;
        Ok(guard.read(|t| {
            t.find_index(id)
                .and_then(|i| resolve::visible_area(t.records(), i))
        })?)
    }

    /// Returns `true` if `ancestor` is on `id`'s parent chain.
    ///
    /// # Errors
    ///
    /// Lock failures.
    pub fn is_child(&self, id: SurfaceId, ancestor: SurfaceId) -> Result<bool, CompositorError> {
        let guard = self.registry.access(AccessMode::Read)?;
        Ok(guard.read(|t| resolve::is_child(t.records(), id, ancestor))?)
    }

    /// Copies `id`'s record and locates its bitmap owner.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id`
    /// is not tracked.
    pub fn surface_info(&self, id: SurfaceId) -> Result<SurfaceInfo, CompositorError> {
        let guard = self.registry.access(AccessMode::Read)?;
        let info = guard.read(|t| {
            let idx = t.find_index(id)?;
            let owner = t.record_at(t.bitmap_owner(idx));
            Some(SurfaceInfo {
                record: *t.record_at(idx),
                bitmap_owner: owner.id,
                owner_left: owner.left,
                owner_top: owner.top,
            })
        })?;
        info.ok_or(CompositorError::Table(TableError::NotFound(id)))
    }

    /// Publishes the selected fields of a locally modified record.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if the
    /// record is not tracked.
    pub fn sync_fields(&self, record: &SurfaceRecord, fields: SyncFields) -> Result<(), CompositorError> {
        self.registry.sync_fields(record, fields)?;
        Ok(())
    }

    // -- Messages --

    /// Queues `message` for `task`.
    ///
    /// Returns `true` if it was merged into a pending request.
    ///
    /// # Errors
    ///
    /// [`CompositorError::Message`] if `task` has no queue.
    pub fn post(&mut self, task: TaskId, message: SurfaceMessage) -> Result<bool, CompositorError> {
        let coalesced = self
            .bus
            .post(task, message, self.config.coalesce_messages)
            .ok_or(CompositorError::Message(task))?;
        self.stats.messages += 1;
        debug!(?task, surface = ?message.surface, kind = ?message.request.kind(), coalesced, "request posted");
        self.tracer().message(&MessageEvent {
            task,
            surface: message.surface,
            kind: message.request.kind(),
            area: message.area,
            coalesced,
        });
        Ok(coalesced)
    }

    /// Posts a request, logging instead of failing.
    pub(crate) fn post_request(&mut self, task: TaskId, surface: SurfaceId, area: ClipRect, request: Request) {
        let message = SurfaceMessage {
            surface,
            area,
            request,
        };
        if let Err(e) = self.post(task, message) {
            warn!(?task, surface = ?surface, error = %e, "request dropped");
        }
    }

    /// Runs every request queued for this task.
    ///
    /// All requests are attempted. Returns how many were processed, or the
    /// first error.
    ///
    /// # Errors
    ///
    /// The first failing redraw or expose.
    pub fn process_messages(&mut self) -> Result<usize, CompositorError> {
        let messages = self.bus.take(self.task);
        let count = messages.len();
        let mut first_err = None;
        for m in messages {
            let area = Some(m.area);
            let result = match m.request {
                Request::Expose(flags) => {
                    self.expose_surface(m.surface, area, flags | ExposeFlags::ABSOLUTE)
                }
                Request::Invalidate(flags) => self
                    .redraw_surface(m.surface, area, flags - RedrawFlags::RELATIVE)
                    .and_then(|()| {
                        self.expose_surface(
                            m.surface,
                            area,
                            ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE,
                        )
                    }),
                Request::DrawArea(flags) => self
                    .redraw_surface(
                        m.surface,
                        area,
                        (flags - RedrawFlags::RELATIVE) | RedrawFlags::IGNORE_CHILDREN,
                    )
                    .and_then(|()| self.expose_surface(m.surface, area, ExposeFlags::ABSOLUTE)),
            };
            if let Err(e) = result {
                warn!(surface = ?m.surface, error = %e, "queued request failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    // -- Pass plumbing --

    pub(crate) fn snapshot(&self) -> Result<Vec<SurfaceRecord>, CompositorError> {
        Ok(self.registry.snapshot()?)
    }

    pub(crate) fn tracer(&mut self) -> Tracer<'_> {
        match self.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        }
    }

    pub(crate) fn begin_pass(&mut self, surface: SurfaceId) {
        if self.pass_depth == 0 {
            self.pass_start = self.stats;
            trace!(?surface, "pass started");
        }
        self.pass_depth += 1;
    }

    pub(crate) fn end_pass(&mut self, surface: SurfaceId) {
        self.pass_depth = self.pass_depth.saturating_sub(1);
        if self.pass_depth > 0 {
            return;
        }
        self.volatile_start = None;
        #[cfg(feature = "trace-rich")]
        {
            let summary = lamina_core::trace::PassSummary {
                surface: Some(surface),
                draws: self.stats.draws - self.pass_start.draws,
                splits: self.stats.splits - self.pass_start.splits,
                blits: self.stats.blits - self.pass_start.blits,
            };
            self.tracer().pass_summary(&summary);
        }
        trace!(?surface, "pass finished");
    }

    /// Removes a dead surface from the shared table and hides its span in
    /// the pass snapshot.
    pub(crate) fn self_heal(&mut self, recs: &mut [SurfaceRecord], idx: usize, reason: RemovalReason) {
        let id = recs[idx].id;
        warn!(surface = ?id, ?reason, "removing dead surface from the table");
        let end = span_end(recs, idx);
        for r in &mut recs[idx..end] {
            r.flags.remove(SurfaceFlags::VISIBLE);
            self.objects.remove(&r.id);
        }
        match self.registry.untrack(id) {
            Ok(removal) => self.tracer().removal(&RemovalEvent {
                surface: id,
                removed: removal.count,
                reason,
            }),
            Err(e) if e.is_missing_surface() => {}
            Err(e) => warn!(surface = ?id, error = %e, "dead surface could not be removed"),
        }
    }
}

impl<R, D> Drop for Compositor<R, D> {
    fn drop(&mut self) {
        self.bus.unregister_task(self.task);
        debug!(task = ?self.task, "compositor dropped");
    }
}
