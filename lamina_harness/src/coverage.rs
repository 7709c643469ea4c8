// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Occlusion-completeness checking for sets of presents.
//!
//! [`CoverageTracker`] paints an ownership map of the checked area from a
//! table snapshot, back to front: every visible solid record claims the
//! pixels of its visible area for its bitmap. Presents are then laid over
//! the map. A correct expose reaches every claimed pixel exactly once, from
//! the claiming bitmap.
//!
//! Pointer and composited surfaces reach the display through the scratch
//! buffer, so their pixels accept a present from any bitmap.

use lamina_core::rect::ClipRect;
use lamina_core::surface::{BitmapId, SurfaceFlags, SurfaceRecord, resolve};
use lamina_render::soft::Present;
use tracing::debug;

/// Letter grade for one expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoverageGrade {
    /// Every visible pixel exactly once, from the right buffer.
    A,
    /// Complete and correct, with a little overdraw.
    B,
    /// Nearly complete.
    C,
    /// Visibly wrong.
    D,
}

impl CoverageGrade {
    /// Returns a short label for reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

/// Totals returned by [`CoverageTracker::report`].
#[derive(Clone, Copy, Debug)]
pub struct CoverageReport {
    /// Current grade.
    pub grade: CoverageGrade,
    /// Pixels some surface claims.
    pub expected: u64,
    /// Claimed pixels presented exactly once.
    pub exact: u64,
    /// Claimed pixels never presented.
    pub missed: u64,
    /// Pixel presents beyond the first, anywhere.
    pub overdrawn: u64,
    /// Pixel presents from a buffer other than the claiming one, or onto
    /// unclaimed pixels.
    pub wrong_owner: u64,
    /// Presents observed.
    pub presents: u64,
    /// Union of all present destinations, clipped to the checked area.
    pub bounds: kurbo::Rect,
}

impl CoverageReport {
    /// Missed pixels per 1000 expected.
    #[must_use]
    pub fn missed_per_1000(&self) -> f64 {
        per_1000(self.missed, self.expected)
    }

    /// Overdrawn pixels per 1000 expected.
    #[must_use]
    pub fn overdrawn_per_1000(&self) -> f64 {
        per_1000(self.overdrawn, self.expected)
    }

    /// Wrong-owner pixels per 1000 expected.
    #[must_use]
    pub fn wrong_per_1000(&self) -> f64 {
        per_1000(self.wrong_owner, self.expected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Claim {
    Nobody,
    Bitmap(BitmapId),
    Composited,
}

/// Ownership map of one area plus per-pixel present counts.
#[derive(Debug)]
pub struct CoverageTracker {
    area: ClipRect,
    claims: Vec<Claim>,
    hits: Vec<u32>,
    wrong_owner: u64,
    presents: u64,
    bounds: Option<kurbo::Rect>,
}

impl CoverageTracker {
    /// Builds the ownership map of `area` from a table snapshot.
    #[must_use]
    pub fn new(records: &[SurfaceRecord], area: ClipRect) -> Self {
        let len = usize::try_from(area.area()).unwrap_or(0);
        let mut tracker = Self {
            area,
            claims: vec![Claim::Nobody; len],
            hits: vec![0; len],
            wrong_owner: 0,
            presents: 0,
            bounds: None,
        };

        for (i, r) in records.iter().enumerate() {
            if r.is_non_solid() {
                continue;
            }
            let Some(visible) = resolve::visible_area(records, i) else {
                continue;
            };
            let claim = if r.flags.intersects(SurfaceFlags::CURSOR | SurfaceFlags::COMPOSITE) {
                Claim::Composited
            } else {
                Claim::Bitmap(r.bitmap)
            };
            tracker.for_each_pixel(visible, |claims, _, p| claims[p] = claim);
        }
        tracker
    }

    /// The checked area.
    #[must_use]
    pub fn area(&self) -> ClipRect {
        self.area
    }

    /// Lays one present over the map.
    pub fn observe(&mut self, present: &Present) {
        self.presents += 1;
        let dest = present.dest_rect().intersect(&self.area);
        if dest.is_empty() {
            return;
        }
        let k = dest.to_kurbo();
        self.bounds = Some(self.bounds.map_or(k, |b| b.union(k)));

        let mut wrong = 0;
        self.for_each_pixel(dest, |claims, hits, p| {
            hits[p] += 1;
            match claims[p] {
                Claim::Composited => {}
                Claim::Bitmap(b) if b == present.bitmap => {}
                _ => wrong += 1,
            }
        });
        self.wrong_owner += wrong;
    }

    /// Lays every present over the map.
    pub fn observe_all<'a>(&mut self, presents: impl IntoIterator<Item = &'a Present>) {
        for present in presents {
            self.observe(present);
        }
    }

    /// Totals and grade so far.
    #[must_use]
    pub fn report(&self) -> CoverageReport {
        let mut expected = 0;
        let mut exact = 0;
        let mut missed = 0;
        let mut overdrawn = 0;
        for (claim, &hits) in self.claims.iter().zip(&self.hits) {
            overdrawn += u64::from(hits.saturating_sub(1));
            if *claim == Claim::Nobody {
                continue;
            }
            expected += 1;
            match hits {
                0 => missed += 1,
                1 => exact += 1,
                _ => {}
            }
        }

        let mut report = CoverageReport {
            grade: CoverageGrade::D,
            expected,
            exact,
            missed,
            overdrawn,
            wrong_owner: self.wrong_owner,
            presents: self.presents,
            bounds: self.bounds.unwrap_or(kurbo::Rect::ZERO),
        };
        report.grade = grade_for(&report);
        debug!(
            grade = report.grade.as_str(),
            expected, missed, overdrawn, wrong = report.wrong_owner, "coverage graded"
        );
        report
    }

    /// Pixels of `rect` within the area that no present has reached yet.
    #[must_use]
    pub fn unreached(&self, rect: ClipRect) -> u64 {
        let mut count = 0;
        let clipped = rect.intersect(&self.area);
        for y in clipped.top..clipped.bottom.max(clipped.top) {
            for x in clipped.left..clipped.right.max(clipped.left) {
                if let Some(p) = self.index(x, y)
                    && self.hits[p] == 0
                {
                    count += 1;
                }
            }
        }
        count
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.area.contains_point(x, y) {
            return None;
        }
        let row = i64::from(y - self.area.top) * i64::from(self.area.width());
        usize::try_from(row + i64::from(x - self.area.left)).ok()
    }

    fn for_each_pixel(
        &mut self,
        rect: ClipRect,
        mut f: impl FnMut(&mut [Claim], &mut [u32], usize),
    ) {
        let clipped = rect.intersect(&self.area);
        if clipped.is_empty() {
            return;
        }
        for y in clipped.top..clipped.bottom {
            for x in clipped.left..clipped.right {
                if let Some(p) = self.index(x, y) {
                    f(&mut self.claims, &mut self.hits, p);
                }
            }
        }
    }
}

fn per_1000(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 1000.0 / total as f64
    }
}

fn grade_for(report: &CoverageReport) -> CoverageGrade {
    let missed = report.missed_per_1000();
    let overdrawn = report.overdrawn_per_1000();
    let wrong = report.wrong_per_1000();

    if report.missed == 0 && report.overdrawn == 0 && report.wrong_owner == 0 {
        CoverageGrade::A
    } else if report.missed == 0 && report.wrong_owner == 0 && overdrawn < 50.0 {
        CoverageGrade::B
    } else if missed < 10.0 && wrong < 10.0 && overdrawn < 250.0 {
        CoverageGrade::C
    } else {
        CoverageGrade::D
    }
}
