// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Background preparation for surfaces that show what lies behind them.
//!
//! Before a `PRECOPY` surface draws, and after an `AFTER_COPY` one has, the
//! pixels of the surfaces behind it are copied into its buffer. Composited
//! surfaces get the same treatment into a scratch buffer at blit time.

use lamina_core::rect::ClipRect;
use lamina_core::surface::{
    BitmapId, SurfaceFlags, SurfaceRecord, bitmap_owner, find_index, parent_index, resolve,
    span_end,
};
use tracing::{trace, warn};

use crate::compositor::Compositor;
use crate::error::CompositorError;
use crate::raster::{BlitMode, DisplayDevice, Raster};

/// When a background is being prepared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BackgroundStage {
    /// Before the surface's hooks run.
    PreCopy,
    /// After the hooks ran; the background is blended over the content.
    AfterCopy,
    /// Into a scratch buffer for a composited blit.
    Composite,
}

/// Destination buffer and the absolute position of its origin.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Target {
    pub(crate) bitmap: BitmapId,
    pub(crate) left: i32,
    pub(crate) top: i32,
}

impl Target {
    /// Converts an absolute rectangle to buffer coordinates.
    pub(crate) fn local(&self, rect: ClipRect) -> ClipRect {
        rect.translate(-self.left, -self.top)
    }
}

const COPY_SKIP: SurfaceFlags = SurfaceFlags::REGION
    .union(SurfaceFlags::CURSOR)
    .union(SurfaceFlags::COMPOSITE)
    .union(SurfaceFlags::TRANSPARENT);

impl<R: Raster, D: DisplayDevice> Compositor<R, D> {
    /// The record whose background `recs[idx]` shows: its custom render
    /// root, unless the root was inherited and is not volatile.
    pub(crate) fn effective_root(&self, recs: &[SurfaceRecord], idx: usize) -> usize {
        let r = &recs[idx];
        if r.root == r.id {
            return idx;
        }
        let Some(root) = find_index(recs, r.root) else {
            return idx;
        };
        let inherited = self.objects.get(&r.id).is_some_and(|o| o.inherited_root);
        if !inherited || resolve::is_volatile(recs, root) {
            root
        } else {
            idx
        }
    }

    /// Copies everything behind `recs[idx]` inside `clip` into `dest`.
    pub(crate) fn prepare_background(
        &mut self,
        recs: &[SurfaceRecord],
        idx: usize,
        clip: ClipRect,
        stage: BackgroundStage,
        dest: Target,
    ) -> Result<(), CompositorError> {
        let root = self.effective_root(recs, idx);
        let end = bitmap_owner(recs, root);
        let Some(mut start) = parent_index(recs, end) else {
            return Ok(());
        };
        while recs[start].has(SurfaceFlags::TRANSPARENT) {
            match parent_index(recs, start) {
                Some(p) => start = p,
                None => break,
            }
        }

        let opacity = match stage {
            BackgroundStage::PreCopy | BackgroundStage::Composite => 255,
            BackgroundStage::AfterCopy => {
                let source = if root == idx {
                    recs[bitmap_owner(recs, idx)].opacity
                } else {
                    recs[root].opacity
                };
                255 - source
            }
        };
        if opacity == 0 {
            return Ok(());
        }
        trace!(surface = ?recs[idx].id, ?stage, ?clip, "preparing background");

        for i in start..end {
            let r = &recs[i];
            if r.flags.intersects(COPY_SKIP) {
                continue;
            }
            if parent_index(recs, i).is_some_and(|p| p >= start && recs[p].bitmap == r.bitmap) {
                continue;
            }
            let Some(area) = resolve::restrict_to_parent_bounds(recs, i, clip, true).visible()
            else {
                continue;
            };
            self.copy_background(recs, i, end, area, opacity, dest)?;
        }
        Ok(())
    }

    /// Copies `area` of `recs[i]`'s buffer into `dest`, minus the parts
    /// covered by other buffers in front of it.
    fn copy_background(
        &mut self,
        recs: &[SurfaceRecord],
        i: usize,
        end: usize,
        area: ClipRect,
        opacity: u8,
        dest: Target,
    ) -> Result<(), CompositorError> {
        let r = recs[i];
        let mut j = if r.has(SurfaceFlags::PERVASIVE_COPY) {
            span_end(recs, i)
        } else {
            i + 1
        };
        while j < end {
            let c = &recs[j];
            if !c.is_shown() {
                j = span_end(recs, j);
                continue;
            }
            if c.flags.intersects(COPY_SKIP) || c.bitmap == r.bitmap {
                j += 1;
                continue;
            }
            if let Some(front) = resolve::visible_area(recs, j)
                && front.intersects(&area)
            {
                for band in area.split_around(&front) {
                    self.copy_background(recs, i, end, band, opacity, dest)?;
                }
                return Ok(());
            }
            j = span_end(recs, j);
        }

        if r.bitmap == dest.bitmap {
            return Ok(());
        }
        if let Err(e) = self.raster.lock(r.bitmap, self.config.bitmap_timeout) {
            warn!(surface = ?r.id, error = %e, "background source unavailable");
            return Ok(());
        }
        let owner = &recs[bitmap_owner(recs, i)];
        let mode = if opacity == 255 {
            BlitMode::Plain
        } else {
            BlitMode::Blend { opacity }
        };
        let copied = self.raster.copy_area(
            r.bitmap,
            dest.bitmap,
            mode,
            area.translate(-owner.left, -owner.top),
            area.left - dest.left,
            area.top - dest.top,
        );
        self.raster.unlock(r.bitmap);
        copied?;
        Ok(())
    }
}
