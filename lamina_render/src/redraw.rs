// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The redraw engine: regenerate a surface's pixels inside a damage area.
//!
//! A redraw restricts the area to the target's ancestors, then looks for
//! records in front of the target that share its bitmap. Each one that
//! covers part of the area splits it into up to four bands, and each band
//! is handled on its own. What is left is drawn: background first, then the
//! surface's hooks. Descendants covering the area are redrawn afterwards.

use lamina_core::rect::ClipRect;
use lamina_core::surface::{
    SurfaceFlags, SurfaceId, SurfaceRecord, bitmap_owner, find_index, parent_index, resolve,
    span_end,
};
use lamina_core::trace::{DrawEvent, RemovalReason, SplitEvent};
use tracing::{debug, trace, warn};

use crate::background::{BackgroundStage, Target};
use crate::compositor::Compositor;
use crate::drawable::{Canvas, DrawHook, SurfaceContext};
use crate::error::{CompositorError, RasterError};
use crate::flags::RedrawFlags;
use crate::message::Request;
use crate::raster::{Colour, DisplayDevice, Raster};

impl<R: Raster, D: DisplayDevice> Compositor<R, D> {
    /// Regenerates `id`'s pixels inside `area`.
    ///
    /// `area` is absolute unless [`RedrawFlags::RELATIVE`] is set; `None`
    /// means the whole surface. Descendants covering the area are redrawn
    /// too unless [`RedrawFlags::IGNORE_CHILDREN`] is set. Nothing reaches
    /// the display until the area is exposed.
    ///
    /// Untracked surfaces, hidden surfaces and empty areas are quietly
    /// ignored. Surfaces owned by another task get a request posted to
    /// that task instead.
    ///
    /// # Errors
    ///
    /// - [`CompositorError::Lock`] if the pixel buffer stays busy.
    /// - [`CompositorError::NoMatchingObject`] if the surface belongs to
    ///   this task but has no object; it has been untracked.
    /// - Table lock failures.
    pub fn redraw_surface(
        &mut self,
        id: SurfaceId,
        area: Option<ClipRect>,
        flags: RedrawFlags,
    ) -> Result<(), CompositorError> {
        if self.forbid_draw > 0 {
            trace!(surface = ?id, "redraw suppressed");
            return Ok(());
        }
        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, id) else {
            debug!(surface = ?id, "redraw of untracked surface ignored");
            return Ok(());
        };
        self.begin_pass(id);
        let result = self.redraw_at(&mut recs, idx, area, flags, 0);
        self.end_pass(id);
        result
    }

    /// Redraws `recs[idx]`. `depth` counts recursion from a parent's
    /// redraw; non-solid surfaces only redirect at depth 0.
    pub(crate) fn redraw_at(
        &mut self,
        recs: &mut [SurfaceRecord],
        idx: usize,
        area: Option<ClipRect>,
        mut flags: RedrawFlags,
        depth: u32,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        let mut area = match area {
            None => r.bounds(),
            Some(a) if flags.contains(RedrawFlags::RELATIVE) => a.translate(r.left, r.top),
            Some(a) => a,
        };
        flags.remove(RedrawFlags::RELATIVE);
        if r.has(SurfaceFlags::TOTAL_REDRAW) {
            area = r.bounds();
        }

        if r.is_non_solid() && depth == 0 {
            let Some(parent) = parent_index(recs, idx) else {
                return Ok(());
            };
            debug!(surface = ?r.id, parent = ?recs[parent].id, "redraw redirected to parent");
            return self.redraw_at(
                recs,
                parent,
                Some(area),
                flags - RedrawFlags::IGNORE_CHILDREN,
                depth,
            );
        }

        if !flags.contains(RedrawFlags::FORCE_DRAW) && !resolve::is_visible(recs, idx) {
            return Ok(());
        }

        if r.task != self.task {
            let request = if flags.contains(RedrawFlags::IGNORE_CHILDREN) {
                Request::DrawArea(flags)
            } else {
                Request::Invalidate(flags)
            };
            self.post_request(r.task, r.id, area, request);
            return Ok(());
        }

        let clip = if flags.contains(RedrawFlags::FORCE_DRAW) {
            area.intersect(&r.bounds())
        } else {
            resolve::clip_to_bitmap_owner(recs, idx, area)
        };
        if clip.is_empty() {
            return Ok(());
        }

        if !self.objects.contains_key(&r.id) {
            self.self_heal(recs, idx, RemovalReason::OwnerGone);
            return Err(CompositorError::NoMatchingObject(r.id));
        }

        self.lock_bitmap(recs, idx)?;
        let drawn = self.draw_region(recs, idx, clip, flags);
        self.raster.unlock(r.bitmap);
        drawn?;

        if flags.contains(RedrawFlags::IGNORE_CHILDREN) {
            return Ok(());
        }
        let end = span_end(recs, idx);
        let mut i = idx + 1;
        while i < end {
            let c = recs[i];
            if !c.is_shown() {
                i = span_end(recs, i);
                continue;
            }
            let skip = c.is_non_solid()
                || c.has(SurfaceFlags::CURSOR)
                || (flags.contains(RedrawFlags::SINGLE_BITMAP) && c.bitmap != r.bitmap)
                || (flags.contains(RedrawFlags::IGNORE_NV_CHILDREN)
                    && !resolve::is_volatile(recs, i));
            if !skip && c.bounds().intersects(&clip) {
                match self.redraw_at(
                    recs,
                    i,
                    Some(clip),
                    flags | RedrawFlags::IGNORE_CHILDREN,
                    depth + 1,
                ) {
                    Err(e) if e.is_self_healed() => {
                        debug!(surface = ?c.id, "dead child skipped");
                    }
                    other => other?,
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Locks the pixel buffer of `recs[idx]`, healing the table if the
    /// buffer is gone.
    pub(crate) fn lock_bitmap(
        &mut self,
        recs: &mut [SurfaceRecord],
        idx: usize,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        match self.raster.lock(r.bitmap, self.config.bitmap_timeout) {
            Ok(()) => Ok(()),
            Err(RasterError::Busy(bitmap)) => {
                warn!(surface = ?r.id, ?bitmap, "pixel buffer busy");
                Err(CompositorError::Lock(bitmap))
            }
            Err(e @ RasterError::NoSuchObject(_)) => {
                self.self_heal(recs, idx, RemovalReason::BitmapGone);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Occlusion scan: splits `rect` around same-bitmap records in front of
    /// `recs[idx]` and draws what is left.
    fn draw_region(
        &mut self,
        recs: &[SurfaceRecord],
        idx: usize,
        rect: ClipRect,
        flags: RedrawFlags,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        if r.is_non_solid() {
            return Ok(());
        }
        let rect = rect.intersect(&r.bounds());
        if rect.is_empty() {
            return Ok(());
        }

        if !flags.contains(RedrawFlags::FORCE_DRAW) {
            let children_follow =
                !flags.intersects(RedrawFlags::IGNORE_CHILDREN | RedrawFlags::IGNORE_NV_CHILDREN);
            let own_end = span_end(recs, idx);
            // Children first, then later siblings, then siblings of each
            // ancestor in turn: everything in front of the target.
            let mut level = r.level + 1;
            let mut i = idx + 1;
            while i < recs.len() && recs[i].level > 1 {
                let c = recs[i];
                level = level.min(c.level);
                if c.level > level || c.bitmap != r.bitmap {
                    i += 1;
                    continue;
                }
                if !c.is_shown() {
                    i = span_end(recs, i);
                    continue;
                }
                if !c.bounds().intersects(&rect) {
                    i += 1;
                    continue;
                }
                if c.has(SurfaceFlags::CURSOR) {
                    trace!(surface = ?r.id, "cursor over damage, draw skipped");
                    return Ok(());
                }
                if c.is_non_solid() {
                    // See-through: its children may still cover us.
                    level = c.level + 1;
                    i += 1;
                    continue;
                }
                if children_follow
                    && i < own_end
                    && c.width() + c.height() <= self.config.split_threshold
                {
                    i += 1;
                    continue;
                }

                self.stats.splits += 1;
                trace!(surface = ?r.id, occluder = ?c.id, ?rect, "redraw split");
                self.tracer().split(&SplitEvent {
                    surface: r.id,
                    occluder: c.id,
                    rect,
                });
                for band in rect.split_around(&c.bounds()) {
                    self.draw_region(recs, idx, band, flags)?;
                }
                return Ok(());
            }
        }

        self.draw_leaf(recs, idx, rect)
    }

    /// Draws background and content of `recs[idx]` inside `rect`.
    fn draw_leaf(
        &mut self,
        recs: &[SurfaceRecord],
        idx: usize,
        rect: ClipRect,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        let owner = recs[bitmap_owner(recs, idx)];
        let target = Target {
            bitmap: r.bitmap,
            left: owner.left,
            top: owner.top,
        };
        let colour = self
            .objects
            .get(&r.id)
            .map_or(Colour::TRANSPARENT, |o| o.colour);

        if r.has(SurfaceFlags::PRECOPY) && !r.has(SurfaceFlags::COMPOSITE) {
            self.prepare_background(recs, idx, rect, BackgroundStage::PreCopy, target)?;
        } else if r.has(SurfaceFlags::COMPOSITE) {
            let clear = self.raster.pack_colour(r.bitmap, Colour::TRANSPARENT);
            self.raster
                .fill_rect(r.bitmap, target.local(rect), clear)?;
        } else if colour.a > 0 {
            let pixel = self.raster.pack_colour(r.bitmap, colour);
            self.raster
                .fill_rect(r.bitmap, target.local(rect), pixel)?;
        }

        let ctx = SurfaceContext {
            surface: r.id,
            geometry: r.geometry,
            bounds: r.bounds(),
            flags: r.flags,
        };
        if let Some(object) = self.objects.get_mut(&r.id) {
            let mut canvas = Canvas::new(
                &mut self.raster,
                r.bitmap,
                r.left - owner.left,
                r.top - owner.top,
                rect.translate(-r.left, -r.top),
            );
            for (_, hook) in &mut object.hooks {
                match hook {
                    DrawHook::Native(drawable) => drawable.on_draw(&ctx, &mut canvas),
                    DrawHook::Script { host, procedure } => match self.scripts.as_mut() {
                        Some(scripts) => {
                            if let Err(e) = scripts.call(*host, procedure, &ctx, &mut canvas) {
                                warn!(surface = ?r.id, %procedure, error = %e, "script hook failed");
                            }
                        }
                        None => warn!(surface = ?r.id, %procedure, "no script host installed"),
                    },
                }
            }
        }

        if r.has(SurfaceFlags::AFTER_COPY) && !r.has(SurfaceFlags::COMPOSITE) {
            self.prepare_background(recs, idx, rect, BackgroundStage::AfterCopy, target)?;
        }

        self.stats.draws += 1;
        trace!(surface = ?r.id, ?rect, "drawn");
        self.tracer().draw(&DrawEvent {
            surface: r.id,
            bitmap: r.bitmap,
            clip: rect,
        });
        Ok(())
    }
}
