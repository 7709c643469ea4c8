// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The expose engine: copy finished pixels to the display.
//!
//! Exposing never runs hooks for the target itself. It walks the target
//! (and with [`ExposeFlags::CHILDREN`], its descendants) front to back and
//! presents each buffer's share of the area, split around everything in
//! front of it. A pixel of the display is written once per expose.
//!
//! Surfaces whose look depends on what lies behind them are redrawn and
//! re-exposed afterwards when the flags ask for it, and the pointer is
//! refreshed whenever the exposed area reaches it.

use lamina_core::rect::ClipRect;
use lamina_core::surface::{
    BitmapId, SurfaceFlags, SurfaceId, SurfaceRecord, bitmap_owner, display_root, find_index,
    resolve, span_end,
};
use lamina_core::trace::{BlitEvent, RemovalReason, SplitEvent};
use tracing::{debug, trace, warn};

use crate::background::{BackgroundStage, Target};
use crate::compositor::{Compositor, Scratch};
use crate::error::{CompositorError, RasterError};
use crate::flags::{ExposeFlags, RedrawFlags};
use crate::message::Request;
use crate::raster::{BlitMode, Colour, DisplayDevice, Raster};

/// Returns `true` if `recs[i]` shares its buffer with an ancestor but a
/// surface with another buffer sits between that ancestor and `recs[i]`
/// and overlaps it.
///
/// Such a record cannot be presented as part of its buffer owner: the
/// owner's copy would paint it underneath the surface in between.
fn is_interleaved(recs: &[SurfaceRecord], i: usize) -> bool {
    let owner = bitmap_owner(recs, i);
    if owner == i {
        return false;
    }
    let Some(area) = resolve::visible_area(recs, i) else {
        return false;
    };
    let bitmap = recs[i].bitmap;
    (owner + 1..i).any(|j| {
        let c = &recs[j];
        c.bitmap != bitmap
            && !c.is_non_solid()
            && !c.has(SurfaceFlags::CURSOR)
            && resolve::visible_area(recs, j).is_some_and(|v| v.intersects(&area))
    })
}

impl<R: Raster, D: DisplayDevice> Compositor<R, D> {
    /// Copies `id`'s finished pixels inside `area` to its display.
    ///
    /// `area` is relative to the surface unless [`ExposeFlags::ABSOLUTE`]
    /// is set; `None` means the whole surface. Regions and transparent
    /// surfaces are exposed through their nearest solid ancestor.
    ///
    /// A busy buffer does not fail the call: the expose is re-queued to
    /// this compositor's task and runs on the next
    /// [`process_messages`](Self::process_messages).
    ///
    /// # Errors
    ///
    /// - [`CompositorError::Raster`] if the display is unavailable.
    /// - Table lock failures.
    pub fn expose_surface(
        &mut self,
        id: SurfaceId,
        area: Option<ClipRect>,
        flags: ExposeFlags,
    ) -> Result<(), CompositorError> {
        if self.forbid_expose > 0 {
            trace!(surface = ?id, "expose suppressed");
            return Ok(());
        }
        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, id) else {
            debug!(surface = ?id, "expose of untracked surface ignored");
            return Ok(());
        };
        self.begin_pass(id);
        let result = self.expose_at(&mut recs, idx, area, flags);
        self.end_pass(id);
        result
    }

    pub(crate) fn expose_at(
        &mut self,
        recs: &mut [SurfaceRecord],
        target: usize,
        area: Option<ClipRect>,
        mut flags: ExposeFlags,
    ) -> Result<(), CompositorError> {
        let t = recs[target];
        let area = match area {
            None => t.bounds(),
            Some(a) if flags.contains(ExposeFlags::ABSOLUTE) => a,
            Some(a) => a.translate(t.left, t.top),
        };
        if area.is_empty() || t.bounds().is_empty() || !resolve::is_visible(recs, target) {
            return Ok(());
        }

        let mut idx = target;
        if t.is_non_solid() {
            idx = resolve::solid_ancestor(recs, target);
            flags |= ExposeFlags::CHILDREN;
            if recs[idx].is_non_solid() {
                return Ok(());
            }
        }
        let Some(clip) = resolve::restrict_to_parent_bounds(recs, idx, area, false).visible()
        else {
            return Ok(());
        };

        // Exposing across the pointer's bottom edge in one go tears it;
        // expose the halves separately.
        if !flags.contains(ExposeFlags::CURSOR_SPLIT)
            && let Some(cursor) = recs[idx + 1..]
                .iter()
                .find(|c| c.has(SurfaceFlags::CURSOR))
        {
            let cb = cursor.bounds();
            if cursor.is_shown()
                && cb.bottom > clip.top
                && cb.bottom < clip.bottom
                && cb.left < clip.right
                && cb.right > clip.left
            {
                trace!(surface = ?t.id, at = cb.bottom, "expose split at pointer");
                let split = flags | ExposeFlags::CURSOR_SPLIT | ExposeFlags::ABSOLUTE;
                let upper = ClipRect::new(clip.left, clip.top, clip.right, cb.bottom);
                let lower = ClipRect::new(clip.left, cb.bottom, clip.right, clip.bottom);
                self.expose_at(recs, target, Some(upper), split)?;
                return self.expose_at(recs, target, Some(lower), split);
            }
        }

        let last = if flags.contains(ExposeFlags::CHILDREN) {
            span_end(recs, idx) - 1
        } else {
            idx
        };
        for i in (idx..=last).rev() {
            let c = recs[i];
            if c.is_non_solid() || (c.has(SurfaceFlags::CURSOR) && i != target) {
                continue;
            }
            let rect = if i == idx {
                clip
            } else {
                if !is_interleaved(recs, i) && bitmap_owner(recs, i) != i {
                    continue;
                }
                match resolve::restrict_to_parent_bounds(recs, i, clip, false).visible() {
                    Some(r) => r,
                    None => continue,
                }
            };
            self.expose_candidate(recs, i, rect)?;
        }

        let mut cursor_done = false;
        if flags.intersects(ExposeFlags::REDRAW_VOLATILE | ExposeFlags::REDRAW_VOLATILE_OVERLAP) {
            let end = span_end(recs, idx);
            let mut start = if flags.contains(ExposeFlags::REDRAW_VOLATILE_OVERLAP) {
                (idx + 1..end)
                    .find(|&i| recs[i].has(SurfaceFlags::CURSOR))
                    .unwrap_or(end)
            } else {
                let mut s = idx + 1;
                while s < end && recs[s].bitmap == recs[idx].bitmap {
                    s += 1;
                }
                s
            };
            if let Some(from) = self.volatile_start {
                start = start.max(from);
            }

            let mut i = start;
            while i < recs.len() && recs[i].level > 1 {
                let c = recs[i];
                if !c.is_shown() {
                    i = span_end(recs, i);
                    continue;
                }
                if c.flags.intersects(SurfaceFlags::BACKGROUND_SENSITIVE)
                    && i != target
                    && i != idx
                    && let Some(area) =
                        resolve::restrict_to_parent_bounds(recs, i, clip, false).visible()
                {
                    self.refresh_volatile(recs, i, area)?;
                    if c.has(SurfaceFlags::CURSOR) {
                        cursor_done = true;
                    }
                }
                i += 1;
            }
        }

        if !cursor_done && let Some(last) = recs.len().checked_sub(1) {
            let c = recs[last];
            if c.has(SurfaceFlags::CURSOR)
                && c.is_shown()
                && last != target
                && c.bounds().intersects(&clip)
            {
                self.refresh_volatile(recs, last, clip.intersect(&c.bounds()))?;
            }
        }
        Ok(())
    }

    /// Redraws (or asks the owner to redraw) a background-sensitive
    /// surface, then exposes it.
    fn refresh_volatile(
        &mut self,
        recs: &mut [SurfaceRecord],
        i: usize,
        area: ClipRect,
    ) -> Result<(), CompositorError> {
        let c = recs[i];
        trace!(surface = ?c.id, ?area, "refreshing volatile surface");
        if !c.has(SurfaceFlags::COMPOSITE) {
            match self.redraw_at(recs, i, Some(area), RedrawFlags::IGNORE_CHILDREN, 1) {
                Err(e) if e.is_self_healed() => return Ok(()),
                other => other?,
            }
            if c.task != self.task {
                // The owner exposes once it has drawn.
                return Ok(());
            }
        }
        self.expose_at(recs, i, Some(area), ExposeFlags::ABSOLUTE)
    }

    fn expose_candidate(
        &mut self,
        recs: &mut [SurfaceRecord],
        i: usize,
        rect: ClipRect,
    ) -> Result<(), CompositorError> {
        let c = recs[i];
        match self.raster.lock(c.bitmap, self.config.bitmap_timeout) {
            Ok(()) => {
                let result = self.expose_buffer(recs, i, i, rect);
                self.raster.unlock(c.bitmap);
                result
            }
            Err(RasterError::Busy(bitmap)) => {
                warn!(surface = ?c.id, ?bitmap, "buffer busy, expose deferred");
                self.post_request(
                    self.task,
                    c.id,
                    rect,
                    Request::Expose(ExposeFlags::ABSOLUTE),
                );
                Ok(())
            }
            Err(RasterError::NoSuchObject(_)) => {
                self.self_heal(recs, i, RemovalReason::BitmapGone);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Splits `rect` around everything in front of `recs[scan]` that hides
    /// `recs[idx]`'s buffer there, and presents the rest.
    fn expose_buffer(
        &mut self,
        recs: &[SurfaceRecord],
        idx: usize,
        scan: usize,
        rect: ClipRect,
    ) -> Result<(), CompositorError> {
        let bitmap = recs[idx].bitmap;
        let mut i = scan + 1;
        while i < recs.len() && recs[i].level > 1 {
            let c = &recs[i];
            if !c.is_shown() {
                i = span_end(recs, i);
                continue;
            }
            if c.is_non_solid() {
                i += 1;
                continue;
            }
            if c.has(SurfaceFlags::CURSOR) {
                i = span_end(recs, i);
                continue;
            }
            let Some(front) = resolve::visible_area(recs, i).filter(|v| v.intersects(&rect)) else {
                i = span_end(recs, i);
                continue;
            };
            if c.bitmap == bitmap && !is_interleaved(recs, i) {
                i += 1;
                continue;
            }

            self.stats.splits += 1;
            trace!(surface = ?recs[idx].id, occluder = ?c.id, ?rect, "expose split");
            self.tracer().split(&SplitEvent {
                surface: recs[idx].id,
                occluder: c.id,
                rect,
            });
            for band in rect.split_around(&front) {
                self.expose_buffer(recs, idx, i, band)?;
            }
            return Ok(());
        }
        self.blit(recs, idx, rect)
    }

    /// Presents `rect` (absolute) of `recs[idx]`'s buffer.
    fn blit(
        &mut self,
        recs: &[SurfaceRecord],
        idx: usize,
        rect: ClipRect,
    ) -> Result<(), CompositorError> {
        let c = recs[idx];
        let root = recs[display_root(recs, idx)];
        let rect = rect.intersect(&root.bounds());
        if rect.is_empty() {
            return Ok(());
        }
        let owner = recs[bitmap_owner(recs, idx)];
        let in_buffer = rect.translate(-owner.left, -owner.top);
        let composited =
            (c.has(SurfaceFlags::COMPOSITE) && c.parent.is_some()) || c.has(SurfaceFlags::CURSOR);

        let (source, src_rect) = if composited {
            let scratch = self.scratch_for(c.width(), c.height(), c.bits_per_pixel)?;
            let target = Target {
                bitmap: scratch,
                left: c.left,
                top: c.top,
            };
            let local = target.local(rect);
            let clear = self.raster.pack_colour(scratch, Colour::TRANSPARENT);
            self.raster.fill_rect(scratch, local, clear)?;
            self.prepare_background(recs, idx, rect, BackgroundStage::Composite, target)?;
            self.raster.copy_area(
                c.bitmap,
                scratch,
                BlitMode::Blend { opacity: c.opacity },
                in_buffer,
                local.left,
                local.top,
            )?;
            (scratch, local)
        } else {
            (c.bitmap, in_buffer)
        };

        let dest = rect.translate(-root.left, -root.top);
        self.display.acquire(c.display)?;
        let presented = self.display.present(
            c.display,
            &self.raster,
            source,
            src_rect,
            dest.left,
            dest.top,
        );
        self.display.release(c.display);
        presented?;

        self.stats.blits += 1;
        trace!(surface = ?c.id, ?rect, composited, "blit");
        self.tracer().blit(&BlitEvent {
            surface: c.id,
            bitmap: c.bitmap,
            display: c.display,
            source: src_rect,
            dest_x: dest.left,
            dest_y: dest.top,
            composited,
        });
        Ok(())
    }

    /// Returns a scratch buffer of at least `width x height`, reusing the
    /// previous one when it is large enough.
    fn scratch_for(
        &mut self,
        width: i32,
        height: i32,
        bits_per_pixel: u8,
    ) -> Result<BitmapId, CompositorError> {
        let (mut width, mut height) = (width, height);
        if let Some(s) = self.scratch.take() {
            if s.bits_per_pixel == bits_per_pixel && s.width >= width && s.height >= height {
                self.scratch = Some(s);
                return Ok(s.bitmap);
            }
            self.raster.free_bitmap(s.bitmap);
            if s.bits_per_pixel == bits_per_pixel {
                width = width.max(s.width);
                height = height.max(s.height);
            }
        }
        let bitmap = self.raster.create_bitmap(width, height, bits_per_pixel)?;
        debug!(?bitmap, width, height, bits_per_pixel, "scratch buffer allocated");
        self.scratch = Some(Scratch {
            bitmap,
            width,
            height,
            bits_per_pixel,
        });
        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::{Present, pack};
    use crate::testing::*;
    use lamina_core::surface::{DisplayId, Geometry};

    fn total_area(presents: &[Present]) -> i64 {
        presents.iter().map(|p| p.dest_rect().area()).sum()
    }

    fn assert_disjoint(presents: &[Present]) {
        for (n, a) in presents.iter().enumerate() {
            for b in &presents[n + 1..] {
                assert!(
                    !a.dest_rect().intersects(&b.dest_rect()),
                    "{a:?} and {b:?} overlap"
                );
            }
        }
    }

    #[test]
    fn single_surface_is_presented_once() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 800, 600), SurfaceFlags::empty());
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(a, None, ExposeFlags::empty()).unwrap();
        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 1);
        assert_eq!(presents[0].dest_rect(), ClipRect::new(0, 0, 800, 600));
        let fb = h.comp.display().framebuffer(DisplayId(1)).unwrap();
        assert_eq!(fb.get(400, 300), Some(pack(colour_for(1))));
    }

    #[test]
    fn same_bitmap_child_goes_out_with_its_owner() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 800, 600), SurfaceFlags::empty());
        h.child_sharing(2, a, Geometry::new(100, 100, 200, 200), SurfaceFlags::empty());
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(a, None, ExposeFlags::CHILDREN).unwrap();
        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 1, "one copy of the shared buffer: {presents:?}");
        let fb = h.comp.display().framebuffer(DisplayId(1)).unwrap();
        assert_eq!(fb.get(150, 150), Some(pack(colour_for(2))));
        assert_eq!(fb.get(50, 50), Some(pack(colour_for(1))));
    }

    #[test]
    fn interleaved_child_is_presented_on_its_own() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        h.surface(2, Some(a), Geometry::new(50, 50, 100, 100), SurfaceFlags::empty());
        h.child_sharing(3, a, Geometry::new(100, 100, 100, 100), SurfaceFlags::empty());
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(a, None, ExposeFlags::CHILDREN).unwrap();

        let presents = h.comp.display_mut().take_presents();
        assert_disjoint(&presents);
        assert_eq!(total_area(&presents), 400 * 400, "every pixel exactly once");
        let fb = h.comp.display().framebuffer(DisplayId(1)).unwrap();
        assert_eq!(fb.get(60, 60), Some(pack(colour_for(2))), "own-buffer child");
        assert_eq!(fb.get(120, 120), Some(pack(colour_for(3))), "front child over it");
        assert_eq!(fb.get(10, 10), Some(pack(colour_for(1))));
    }

    #[test]
    fn without_children_only_uncovered_area_is_presented() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        h.surface(2, Some(a), Geometry::new(0, 0, 100, 400), SurfaceFlags::empty());
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(a, None, ExposeFlags::empty()).unwrap();
        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 1);
        assert_eq!(presents[0].dest_rect(), ClipRect::new(100, 0, 400, 400));
    }

    #[test]
    fn busy_buffer_defers_expose_to_the_queue() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.raster_mut().set_busy(BitmapId(1), true);
        h.comp.expose_surface(a, None, ExposeFlags::empty()).unwrap();
        assert!(h.comp.display().presents().is_empty(), "nothing presented yet");
        assert_eq!(h.bus.pending(h.comp.task()), 1);

        h.comp.raster_mut().set_busy(BitmapId(1), false);
        assert_eq!(h.comp.process_messages(), Ok(1));
        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 1, "retried expose presented");
        assert_eq!(presents[0].dest_rect(), ClipRect::new(0, 0, 100, 100));
    }

    #[test]
    fn exposure_is_split_at_the_pointer_bottom() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let cursor = h.surface(9, Some(a), Geometry::new(50, 50, 16, 16), SurfaceFlags::CURSOR);
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.display_mut().take_presents();
        h.clear_draws();

        h.comp
            .expose_surface(a, Some(ClipRect::new(0, 0, 100, 100)), ExposeFlags::ABSOLUTE)
            .unwrap();
        let presents = h.comp.display_mut().take_presents();
        let a_presents: Vec<_> = presents
            .iter()
            .filter(|p| p.bitmap == BitmapId(1))
            .map(Present::dest_rect)
            .collect();
        assert!(a_presents.contains(&ClipRect::new(0, 0, 100, 66)), "{a_presents:?}");
        assert!(a_presents.iter().any(|r| r.top == 66), "{a_presents:?}");
        assert!(
            h.draws().iter().any(|(s, _)| *s == cursor),
            "pointer refreshed over the exposed area"
        );
    }

    #[test]
    fn pointer_is_composited_over_the_background() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let cursor = h.surface_plain(9, Some(a), Geometry::new(10, 10, 8, 8), SurfaceFlags::CURSOR);
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(cursor, None, ExposeFlags::empty()).unwrap();

        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 1);
        assert_ne!(presents[0].bitmap, BitmapId(9), "presented from scratch");
        let fb = h.comp.display().framebuffer(DisplayId(1)).unwrap();
        assert_eq!(
            fb.get(12, 12),
            Some(pack(colour_for(1))),
            "transparent pointer shows the surface behind it"
        );
    }

    #[test]
    fn volatile_sibling_is_refreshed() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(0, 0, 200, 200), SurfaceFlags::empty());
        let v = h.surface(3, Some(a), Geometry::new(150, 150, 100, 100), SurfaceFlags::VOLATILE);
        h.comp.redraw_surface(a, None, RedrawFlags::empty()).unwrap();
        h.clear_draws();

        h.comp
            .expose_surface(b, None, ExposeFlags::REDRAW_VOLATILE_OVERLAP)
            .unwrap();
        let draws = h.draws();
        assert_eq!(draws, [(v, ClipRect::new(150, 150, 200, 200))], "overlap redrawn");
        let presents = h.comp.display_mut().take_presents();
        assert!(presents.iter().any(|p| p.bitmap == BitmapId(3)), "and exposed");
    }

    #[test]
    fn suppressed_expose_does_nothing() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        h.comp.forbid_expose();
        h.comp.expose_surface(a, None, ExposeFlags::empty()).unwrap();
        assert!(h.comp.display().presents().is_empty());
        h.comp.permit_expose();
        h.comp.expose_surface(a, None, ExposeFlags::empty()).unwrap();
        assert_eq!(h.comp.display().presents().len(), 1);
    }

    #[test]
    fn scratch_buffer_is_reused() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let p = h.surface_plain(9, Some(a), Geometry::new(10, 10, 8, 8), SurfaceFlags::CURSOR);
        h.comp.expose_surface(p, None, ExposeFlags::empty()).unwrap();
        h.comp.expose_surface(p, None, ExposeFlags::empty()).unwrap();
        let presents = h.comp.display_mut().take_presents();
        assert_eq!(presents.len(), 2);
        assert_eq!(presents[0].bitmap, presents[1].bitmap, "same scratch buffer");
    }
}
