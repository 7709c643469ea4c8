// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage repair for geometry, stacking and visibility changes.

use lamina_core::TableError;
use lamina_core::rect::ClipRect;
use lamina_core::surface::{
    Geometry, SurfaceFlags, SurfaceId, SurfaceRecord, SyncFields, find_index, parent_index,
    resolve, span_end,
};
use tracing::debug;

use crate::compositor::Compositor;
use crate::drawable::DrawHook;
use crate::error::CompositorError;
use crate::flags::{ExposeFlags, RedrawFlags};
use crate::raster::{DisplayDevice, Raster};

/// A surface that was just removed for being dead is not an error for the
/// pass that found it.
fn tolerate_healed(result: Result<(), CompositorError>) -> Result<(), CompositorError> {
    match result {
        Err(e) if e.is_self_healed() => Ok(()),
        other => other,
    }
}

/// The parts of `area` outside `covered`: right, bottom, top, left.
fn uncovered_bands(area: ClipRect, covered: ClipRect) -> [Option<ClipRect>; 4] {
    if !area.intersects(&covered) {
        return [Some(area), None, None, None];
    }
    let mid_right = covered.right.min(area.right);
    let non_empty = |r: ClipRect| (!r.is_empty()).then_some(r);
    [
        non_empty(ClipRect::new(
            covered.right.max(area.left),
            area.top,
            area.right,
            area.bottom,
        )),
        non_empty(ClipRect::new(
            area.left,
            covered.bottom.max(area.top),
            mid_right,
            area.bottom,
        )),
        non_empty(ClipRect::new(area.left, area.top, mid_right, covered.top)),
        non_empty(ClipRect::new(
            area.left,
            covered.top.max(area.top),
            covered.left,
            covered.bottom.min(area.bottom),
        )),
    ]
}

impl<R: Raster, D: DisplayDevice> Compositor<R, D> {
    /// Moves `id` to `(x, y)` relative to its parent and repairs the
    /// display at the old and new positions.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id`
    /// is not tracked, and any failure of the redraws and exposes.
    pub fn move_surface(&mut self, id: SurfaceId, x: i32, y: i32) -> Result<(), CompositorError> {
        let mut record = self.registry.record(id)?;
        if record.geometry.x == x && record.geometry.y == y {
            return Ok(());
        }
        let old = record.bounds();
        record.geometry.x = x;
        record.geometry.y = y;
        self.apply_geometry(&record, old, false)
    }

    /// Moves and resizes `id`, notifying its native hooks.
    ///
    /// # Errors
    ///
    /// As for [`move_surface`](Self::move_surface).
    pub fn resize_surface(
        &mut self,
        id: SurfaceId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<(), CompositorError> {
        let mut record = self.registry.record(id)?;
        let geometry = Geometry::new(x, y, width, height);
        if record.geometry == geometry {
            return Ok(());
        }
        let old = record.bounds();
        record.geometry = geometry;
        if let Some(object) = self.objects.get_mut(&id) {
            for (_, hook) in &mut object.hooks {
                if let DrawHook::Native(drawable) = hook {
                    drawable.on_resize(geometry);
                }
            }
        }
        self.apply_geometry(&record, old, true)
    }

    fn apply_geometry(
        &mut self,
        record: &SurfaceRecord,
        old: ClipRect,
        resized: bool,
    ) -> Result<(), CompositorError> {
        self.registry.update(record)?;
        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, record.id) else {
            return Ok(());
        };
        self.begin_pass(record.id);
        let result = self.repair_geometry(&mut recs, idx, old, resized);
        self.end_pass(record.id);
        result
    }

    fn repair_geometry(
        &mut self,
        recs: &mut [SurfaceRecord],
        idx: usize,
        old: ClipRect,
        resized: bool,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        let new = r.bounds();
        let parent = parent_index(recs, idx);

        if r.has(SurfaceFlags::REGION) {
            let Some(p) = parent else {
                return Ok(());
            };
            let union = old.union(&new);
            let parts = if union.area() > self.config.region_union_factor * new.area() {
                [Some(old), Some(new)]
            } else {
                [Some(union), None]
            };
            debug!(surface = ?r.id, ?union, "region moved, repairing parent");
            for part in parts.into_iter().flatten() {
                tolerate_healed(self.redraw_at(recs, p, Some(part), RedrawFlags::empty(), 0))?;
                self.expose_at(
                    recs,
                    p,
                    Some(part),
                    ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE,
                )?;
            }
            return Ok(());
        }

        let shares_parent = parent.is_some_and(|p| recs[p].bitmap == r.bitmap);
        let drawn_transparent = r.has(SurfaceFlags::TRANSPARENT)
            && self.objects.get(&r.id).is_some_and(|o| o.hook_count() > 0);
        if resized || shares_parent || drawn_transparent || resolve::is_volatile(recs, idx) {
            tolerate_healed(self.redraw_at(recs, idx, None, RedrawFlags::empty(), 0))?;
        }
        self.expose_at(
            recs,
            idx,
            None,
            ExposeFlags::CHILDREN | ExposeFlags::REDRAW_VOLATILE_OVERLAP,
        )?;

        match parent {
            Some(p) => self.redraw_nonintersect_at(
                recs,
                p,
                idx,
                new,
                old,
                RedrawFlags::empty(),
                ExposeFlags::CHILDREN | ExposeFlags::REDRAW_VOLATILE,
            ),
            None => {
                for band in uncovered_bands(old, new).into_iter().flatten() {
                    self.expose_top_levels(recs, idx, band)?;
                }
                Ok(())
            }
        }
    }

    /// Redraws and exposes `parent` over the parts of `area` that `covered`
    /// does not hide.
    ///
    /// Used after `surface` moved from `area` to `covered`: volatile
    /// surfaces are only refreshed from the end of `surface`'s subtree on.
    ///
    /// # Errors
    ///
    /// Any failure of the redraws and exposes.
    pub fn redraw_nonintersect(
        &mut self,
        parent: SurfaceId,
        surface: SurfaceId,
        covered: ClipRect,
        area: ClipRect,
        redraw_flags: RedrawFlags,
        expose_flags: ExposeFlags,
    ) -> Result<(), CompositorError> {
        let mut recs = self.snapshot()?;
        let (Some(p), Some(idx)) = (find_index(&recs, parent), find_index(&recs, surface)) else {
            return Ok(());
        };
        self.begin_pass(parent);
        let result = self.redraw_nonintersect_at(
            &mut recs,
            p,
            idx,
            covered,
            area,
            redraw_flags,
            expose_flags,
        );
        self.end_pass(parent);
        result
    }

    pub(crate) fn redraw_nonintersect_at(
        &mut self,
        recs: &mut [SurfaceRecord],
        parent: usize,
        idx: usize,
        covered: ClipRect,
        area: ClipRect,
        redraw_flags: RedrawFlags,
        expose_flags: ExposeFlags,
    ) -> Result<(), CompositorError> {
        // Held for every band, including both halves of a pointer split.
        self.volatile_start = Some(span_end(recs, idx));
        let mut result = Ok(());
        for band in uncovered_bands(area, covered).into_iter().flatten() {
            result = tolerate_healed(self.redraw_at(recs, parent, Some(band), redraw_flags, 0))
                .and_then(|()| {
                    self.expose_at(
                        recs,
                        parent,
                        Some(band),
                        expose_flags | ExposeFlags::ABSOLUTE,
                    )
                });
            if result.is_err() {
                break;
            }
        }
        self.volatile_start = None;
        result
    }

    /// Moves `id` and its subtree in front of its siblings.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id`
    /// is not tracked, and any failure of the redraws and exposes.
    pub fn move_to_front(&mut self, id: SurfaceId) -> Result<(), CompositorError> {
        let before = self.snapshot()?;
        let Some(old_idx) = find_index(&before, id) else {
            return Err(TableError::NotFound(id).into());
        };
        let new_idx = self.registry.raise(id)?;
        if new_idx == old_idx {
            return Ok(());
        }
        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, id) else {
            return Ok(());
        };
        self.begin_pass(id);
        let result = self.repair_raised(&mut recs, old_idx, idx);
        self.end_pass(id);
        result
    }

    fn repair_raised(
        &mut self,
        recs: &mut [SurfaceRecord],
        old_idx: usize,
        idx: usize,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        // Same-buffer records we passed over had painted over us.
        for i in old_idx..idx {
            let c = recs[i];
            if c.bitmap != r.bitmap || c.is_non_solid() || !resolve::is_visible(recs, i) {
                continue;
            }
            let overlap = c.bounds().intersect(&r.bounds());
            if !overlap.is_empty() {
                tolerate_healed(self.redraw_at(recs, idx, Some(overlap), RedrawFlags::empty(), 0))?;
            }
        }
        if resolve::is_volatile(recs, idx) {
            tolerate_healed(self.redraw_at(recs, idx, None, RedrawFlags::empty(), 0))?;
        }
        self.expose_at(recs, idx, None, ExposeFlags::CHILDREN)
    }

    /// Moves `id` and its subtree behind its siblings.
    ///
    /// # Errors
    ///
    /// As for [`move_to_front`](Self::move_to_front).
    pub fn move_to_back(&mut self, id: SurfaceId) -> Result<(), CompositorError> {
        let before = self.snapshot()?;
        let Some(old_idx) = find_index(&before, id) else {
            return Err(TableError::NotFound(id).into());
        };
        let new_idx = self.registry.lower(id)?;
        if new_idx == old_idx {
            return Ok(());
        }
        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, id) else {
            return Ok(());
        };
        self.begin_pass(id);
        let result = self.repair_lowered(&mut recs, old_idx, idx);
        self.end_pass(id);
        result
    }

    fn repair_lowered(
        &mut self,
        recs: &mut [SurfaceRecord],
        old_idx: usize,
        idx: usize,
    ) -> Result<(), CompositorError> {
        let r = recs[idx];
        let end = span_end(recs, idx);
        let passed_end = (old_idx + (end - idx)).min(recs.len());
        for i in end..passed_end {
            let c = recs[i];
            if c.parent != r.parent
                || c.bitmap != r.bitmap
                || c.is_non_solid()
                || !resolve::is_visible(recs, i)
            {
                continue;
            }
            let overlap = c.bounds().intersect(&r.bounds());
            if !overlap.is_empty() {
                tolerate_healed(self.redraw_at(recs, i, Some(overlap), RedrawFlags::empty(), 0))?;
            }
        }
        match parent_index(recs, idx) {
            Some(p) => self.expose_at(
                recs,
                p,
                Some(r.bounds()),
                ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE,
            ),
            None => self.expose_top_levels(recs, usize::MAX, r.bounds()),
        }
    }

    /// Shows or hides `id` and repairs the display.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id`
    /// is not tracked, and any failure of the redraws and exposes.
    pub fn set_visible(&mut self, id: SurfaceId, visible: bool) -> Result<(), CompositorError> {
        let mut record = self.registry.record(id)?;
        if record.is_shown() == visible {
            return Ok(());
        }
        record.flags.set(SurfaceFlags::VISIBLE, visible);
        self.registry.sync_fields(&record, SyncFields::FLAGS)?;

        let mut recs = self.snapshot()?;
        let Some(idx) = find_index(&recs, id) else {
            return Ok(());
        };
        self.begin_pass(id);
        let result = if visible {
            tolerate_healed(self.redraw_at(&mut recs, idx, None, RedrawFlags::empty(), 0))
                .and_then(|()| self.expose_at(&mut recs, idx, None, ExposeFlags::CHILDREN))
        } else {
            let area = recs[idx].bounds();
            match parent_index(&recs, idx) {
                Some(p) => tolerate_healed(self.redraw_at(
                    &mut recs,
                    p,
                    Some(area),
                    RedrawFlags::empty(),
                    0,
                ))
                .and_then(|()| {
                    self.expose_at(
                        &mut recs,
                        p,
                        Some(area),
                        ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE,
                    )
                }),
                None => self.expose_top_levels(&mut recs, idx, area),
            }
        };
        self.end_pass(id);
        result
    }

    /// Exposes every visible top-level surface except `skip` that meets
    /// `area`, back to front.
    fn expose_top_levels(
        &mut self,
        recs: &mut [SurfaceRecord],
        skip: usize,
        area: ClipRect,
    ) -> Result<(), CompositorError> {
        for i in 0..recs.len() {
            let c = recs[i];
            if i == skip || c.parent.is_some() || !c.is_shown() || !c.bounds().intersects(&area) {
                continue;
            }
            self.expose_at(
                recs,
                i,
                Some(area),
                ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::pack;
    use crate::testing::*;
    use lamina_core::surface::DisplayId;

    fn pixel(h: &Harness, x: i32, y: i32) -> Option<u32> {
        h.comp.display().framebuffer(DisplayId(1)).unwrap().get(x, y)
    }

    fn shown(h: &mut Harness, id: SurfaceId) {
        h.comp.redraw_surface(id, None, RedrawFlags::empty()).unwrap();
        h.comp.expose_surface(id, None, ExposeFlags::CHILDREN).unwrap();
        h.comp.display_mut().take_presents();
        h.clear_draws();
    }

    #[test]
    fn uncovered_bands_partition_the_old_area() {
        let area = ClipRect::new(50, 50, 150, 150);
        let covered = ClipRect::new(0, 0, 100, 100);
        let bands: Vec<_> = uncovered_bands(area, covered).into_iter().flatten().collect();
        assert_eq!(
            bands,
            [ClipRect::new(100, 50, 150, 150), ClipRect::new(50, 100, 100, 150)]
        );

        let inside = ClipRect::new(40, 40, 60, 60);
        let around: Vec<_> = uncovered_bands(ClipRect::new(0, 0, 100, 100), inside)
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(around.len(), 4, "right, bottom, top, left");
        assert_eq!(around.iter().map(ClipRect::area).sum::<i64>(), 10_000 - 400);

        assert_eq!(
            uncovered_bands(area, ClipRect::new(500, 500, 600, 600))[0],
            Some(area),
            "disjoint: whole area"
        );
    }

    #[test]
    fn moving_own_buffer_child_repairs_old_position() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(10, 10, 50, 50), SurfaceFlags::empty());
        shown(&mut h, a);
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(2))));

        h.comp.move_surface(b, 200, 200).unwrap();
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(1))), "old spot repaired");
        assert_eq!(pixel(&h, 210, 210), Some(pack(colour_for(2))), "new spot shown");
        assert!(
            h.draws().iter().all(|(s, _)| *s == a),
            "own-buffer child is not redrawn to move"
        );
    }

    #[test]
    fn moving_shared_buffer_child_redraws_it() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.child_sharing(2, a, Geometry::new(10, 10, 50, 50), SurfaceFlags::empty());
        shown(&mut h, a);

        h.comp.move_surface(b, 100, 100).unwrap();
        assert!(h.draws().contains(&(b, ClipRect::new(100, 100, 150, 150))));
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(1))));
        assert_eq!(pixel(&h, 120, 120), Some(pack(colour_for(2))));
    }

    #[test]
    fn unchanged_move_is_a_no_op() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        h.comp.move_surface(a, 0, 0).unwrap();
        assert!(h.draws().is_empty());
        assert!(h.comp.display().presents().is_empty());
    }

    #[test]
    fn region_move_repairs_parent_over_union_or_parts() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let region = h.child_sharing(2, a, Geometry::new(10, 10, 20, 20), SurfaceFlags::REGION);

        h.comp.move_surface(region, 15, 15).unwrap();
        assert_eq!(h.draws(), [(a, ClipRect::new(10, 10, 35, 35))], "small move: union");

        h.clear_draws();
        h.comp.move_surface(region, 300, 300).unwrap();
        assert_eq!(
            h.draws(),
            [
                (a, ClipRect::new(15, 15, 35, 35)),
                (a, ClipRect::new(300, 300, 320, 320)),
            ],
            "far move: old and new separately"
        );
    }

    #[test]
    fn resize_notifies_hooks_and_redraws() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(10, 10, 50, 50), SurfaceFlags::empty());
        shown(&mut h, a);

        h.comp.resize_surface(b, 10, 10, 30, 30).unwrap();
        assert_eq!(h.resizes(), [(b, Geometry::new(10, 10, 30, 30))]);
        assert!(h.draws().contains(&(b, ClipRect::new(10, 10, 40, 40))));
        assert_eq!(pixel(&h, 50, 50), Some(pack(colour_for(1))), "shrunk area repaired");
    }

    #[test]
    fn restacking_shared_buffer_siblings() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.child_sharing(2, a, Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        let c = h.child_sharing(3, a, Geometry::new(50, 50, 100, 100), SurfaceFlags::empty());
        shown(&mut h, a);
        assert_eq!(pixel(&h, 75, 75), Some(pack(colour_for(3))));

        h.comp.move_to_front(b).unwrap();
        assert_eq!(h.draws()[0], (b, ClipRect::new(50, 50, 100, 100)));
        assert_eq!(pixel(&h, 75, 75), Some(pack(colour_for(2))), "b now in front");

        h.clear_draws();
        h.comp.move_to_back(b).unwrap();
        assert_eq!(h.draws()[0], (c, ClipRect::new(50, 50, 100, 100)));
        assert_eq!(pixel(&h, 75, 75), Some(pack(colour_for(3))), "c in front again");
    }

    #[test]
    fn hide_and_show_child() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(10, 10, 50, 50), SurfaceFlags::empty());
        shown(&mut h, a);

        h.comp.set_visible(b, false).unwrap();
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(1))));
        assert!(!h.registry.record(b).unwrap().is_shown());

        h.comp.set_visible(b, true).unwrap();
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(2))));
    }

    #[test]
    fn nonintersect_redraws_only_the_uncovered_part() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        h.comp
            .redraw_nonintersect(
                a,
                b,
                ClipRect::new(0, 0, 100, 100),
                ClipRect::new(50, 50, 150, 150),
                RedrawFlags::IGNORE_CHILDREN,
                ExposeFlags::empty(),
            )
            .unwrap();
        let draws = h.draws();
        assert_eq!(draws.iter().map(|(_, r)| r.area()).sum::<i64>(), 7_500);
        assert!(draws.iter().all(|(s, r)| *s == a && !r.intersects(&ClipRect::new(0, 0, 100, 100))));
    }

    #[test]
    fn nonintersect_refreshes_only_volatiles_after_the_moved_subtree() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        let inner = h.surface(3, Some(b), Geometry::new(10, 10, 20, 20), SurfaceFlags::VOLATILE);
        let sibling = h.surface(4, Some(a), Geometry::new(150, 0, 50, 50), SurfaceFlags::VOLATILE);

        h.comp
            .redraw_nonintersect(
                a,
                b,
                ClipRect::new(300, 300, 310, 310),
                ClipRect::new(0, 0, 200, 100),
                RedrawFlags::IGNORE_CHILDREN,
                ExposeFlags::CHILDREN | ExposeFlags::REDRAW_VOLATILE,
            )
            .unwrap();
        assert_eq!(h.draws_of(sibling), [ClipRect::new(150, 0, 200, 50)], "sibling refreshed");
        assert!(h.draws_of(inner).is_empty(), "moved subtree left alone");
        assert_eq!(h.comp.volatile_start, None, "start index is one-shot");
    }

    #[test]
    fn volatile_start_holds_across_pointer_split() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        let inner = h.surface(3, Some(b), Geometry::new(10, 60, 20, 20), SurfaceFlags::VOLATILE);
        let sibling = h.surface(4, Some(a), Geometry::new(150, 60, 50, 30), SurfaceFlags::VOLATILE);
        // Its bottom edge at y=50 splits the expose of the band.
        h.surface(5, Some(a), Geometry::new(180, 40, 10, 10), SurfaceFlags::CURSOR);

        h.comp
            .redraw_nonintersect(
                a,
                b,
                ClipRect::new(300, 300, 310, 310),
                ClipRect::new(0, 0, 200, 100),
                RedrawFlags::IGNORE_CHILDREN,
                ExposeFlags::CHILDREN | ExposeFlags::REDRAW_VOLATILE,
            )
            .unwrap();
        assert!(
            h.draws_of(inner).is_empty(),
            "lower half still starts after the moved subtree"
        );
        assert_eq!(h.draws_of(sibling), [ClipRect::new(150, 60, 200, 90)], "sibling refreshed");
    }

    #[test]
    fn move_refreshes_volatile_sibling_not_moved_descendant() {
        let mut h = Harness::new();
        let a = h.surface(1, None, Geometry::new(0, 0, 400, 400), SurfaceFlags::empty());
        let b = h.surface(2, Some(a), Geometry::new(0, 0, 100, 100), SurfaceFlags::empty());
        let inner = h.surface(3, Some(b), Geometry::new(10, 10, 20, 20), SurfaceFlags::VOLATILE);
        let sibling = h.surface(4, Some(a), Geometry::new(40, 40, 100, 100), SurfaceFlags::VOLATILE);
        shown(&mut h, a);

        h.comp.move_surface(b, 200, 200).unwrap();
        assert!(h.draws_of(inner).is_empty(), "moved descendant is not redrawn");
        assert!(!h.draws_of(sibling).is_empty(), "uncovered sibling is refreshed");
        assert_eq!(h.comp.volatile_start, None, "start index cleared after the move");
        assert_eq!(pixel(&h, 20, 20), Some(pack(colour_for(1))), "old spot repaired");
    }
}
