// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer clip rectangles.
//!
//! All compositor geometry is expressed in whole pixels with exclusive
//! right/bottom edges. A rectangle whose right edge is not greater than its
//! left edge (or bottom not greater than top) is *empty*; clipping routines
//! may produce such rectangles and callers treat them as "nothing to do".

use core::fmt;

/// An axis-aligned rectangle with exclusive right and bottom edges.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClipRect {
    /// Left edge (inclusive).
    pub left: i32,
    /// Top edge (inclusive).
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl fmt::Debug for ClipRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClipRect({}x{},{}x{})",
            self.left,
            self.top,
            self.width(),
            self.height()
        )
    }
}

impl ClipRect {
    /// The canonical empty rectangle at the origin.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Creates a rectangle from its four edges.
    #[inline]
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Creates a rectangle from an origin and a size.
    #[inline]
    #[must_use]
    pub const fn from_origin_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Width, or a non-positive value for empty rectangles.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height, or a non-positive value for empty rectangles.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Number of covered pixels (zero for empty rectangles).
    #[must_use]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width()) * i64::from(self.height())
        }
    }

    /// Returns `true` if both rectangles share at least one pixel.
    #[inline]
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        other.left < self.right
            && other.top < self.bottom
            && other.right > self.left
            && other.bottom > self.top
    }

    /// Clips `self` to `bounds`. The result may be empty.
    #[inline]
    #[must_use]
    pub fn intersect(&self, bounds: &Self) -> Self {
        Self::new(
            self.left.max(bounds.left),
            self.top.max(bounds.top),
            self.right.min(bounds.right),
            self.bottom.min(bounds.bottom),
        )
    }

    /// Smallest rectangle containing both inputs. Empty inputs are ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Returns `true` if `other` lies entirely within `self`.
    #[must_use]
    pub const fn contains_rect(&self, other: &Self) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Returns `true` if the pixel at `(x, y)` lies inside.
    #[must_use]
    pub const fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Returns the rectangle shifted by `(dx, dy)`.
    #[inline]
    #[must_use]
    pub const fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.left.saturating_add(dx),
            self.top.saturating_add(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }

    /// Splits `self` into the parts not covered by `occluder`.
    ///
    /// Yields at most four non-overlapping bands in the order left, right,
    /// top, bottom. The left and right bands span the full height of `self`;
    /// the top and bottom bands are bounded horizontally by the occluder.
    /// If the two rectangles do not intersect, `self` is yielded unchanged.
    #[must_use]
    pub fn split_around(&self, occluder: &Self) -> Bands {
        let mut bands = Bands::default();
        if !self.intersects(occluder) {
            bands.push(*self);
            return bands;
        }

        let mut inner = *occluder;
        if inner.left <= self.left {
            inner.left = self.left;
        } else {
            bands.push(Self::new(self.left, self.top, inner.left, self.bottom));
        }

        if inner.right >= self.right {
            inner.right = self.right;
        } else {
            bands.push(Self::new(inner.right, self.top, self.right, self.bottom));
        }

        if inner.top <= self.top {
            inner.top = self.top;
        } else {
            bands.push(Self::new(inner.left, self.top, inner.right, inner.top));
        }

        if inner.bottom < self.bottom {
            bands.push(Self::new(inner.left, inner.bottom, inner.right, self.bottom));
        }
        bands
    }

    /// Converts to a floating-point [`kurbo::Rect`].
    #[must_use]
    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.left),
            f64::from(self.top),
            f64::from(self.right),
            f64::from(self.bottom),
        )
    }

    /// Converts from a [`kurbo::Rect`], expanding fractional edges outward so
    /// the result covers every touched pixel.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "expanded edges are integral; out-of-range values saturate"
    )]
    pub fn from_kurbo(rect: kurbo::Rect) -> Self {
        let r = rect.abs().expand();
        Self::new(r.x0 as i32, r.y0 as i32, r.x1 as i32, r.y1 as i32)
    }
}

/// Up to four rectangles produced by [`ClipRect::split_around`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Bands {
    rects: [ClipRect; 4],
    len: u8,
    pos: u8,
}

impl Bands {
    fn push(&mut self, rect: ClipRect) {
        self.rects[usize::from(self.len)] = rect;
        self.len += 1;
    }

    /// Number of bands remaining.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        (self.len - self.pos) as usize
    }
}

impl Iterator for Bands {
    type Item = ClipRect;

    fn next(&mut self) -> Option<ClipRect> {
        if self.pos >= self.len {
            return None;
        }
        let r = self.rects[usize::from(self.pos)];
        self.pos += 1;
        Some(r)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

impl ExactSizeIterator for Bands {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_clips_to_bounds() {
        let r = ClipRect::new(-10, -10, 50, 50);
        let clipped = r.intersect(&ClipRect::new(0, 0, 40, 100));
        assert_eq!(clipped, ClipRect::new(0, 0, 40, 50));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = ClipRect::new(0, 0, 10, 10);
        let b = ClipRect::new(10, 0, 20, 10);
        assert!(!a.intersects(&b), "touching edges do not overlap");
        assert!(a.intersect(&b).is_empty(), "clip of disjoint rects is empty");
    }

    #[test]
    fn union_ignores_empty() {
        let a = ClipRect::new(5, 5, 10, 10);
        assert_eq!(a.union(&ClipRect::EMPTY), a);
        assert_eq!(ClipRect::EMPTY.union(&a), a);
        assert_eq!(
            a.union(&ClipRect::new(0, 20, 2, 30)),
            ClipRect::new(0, 5, 10, 30)
        );
    }

    #[test]
    fn split_around_centre_yields_four_bands() {
        let r = ClipRect::new(0, 0, 800, 600);
        let occ = ClipRect::new(100, 100, 300, 300);
        let bands: Vec<_> = r.split_around(&occ).collect();
        assert_eq!(
            bands,
            vec![
                ClipRect::new(0, 0, 100, 600),
                ClipRect::new(300, 0, 800, 600),
                ClipRect::new(100, 0, 300, 100),
                ClipRect::new(100, 300, 300, 600),
            ]
        );
        let covered: i64 = bands.iter().map(ClipRect::area).sum();
        assert_eq!(covered, r.area() - occ.area(), "bands cover the remainder");
    }

    #[test]
    fn split_around_full_cover_yields_nothing() {
        let r = ClipRect::new(10, 10, 20, 20);
        assert_eq!(r.split_around(&ClipRect::new(0, 0, 100, 100)).count(), 0);
    }

    #[test]
    fn split_around_disjoint_keeps_self() {
        let r = ClipRect::new(0, 0, 10, 10);
        let bands: Vec<_> = r.split_around(&ClipRect::new(50, 50, 60, 60)).collect();
        assert_eq!(bands, vec![r]);
    }

    #[test]
    fn split_bands_never_overlap_each_other_or_occluder() {
        let r = ClipRect::new(0, 0, 100, 100);
        for occ in [
            ClipRect::new(-5, 20, 40, 60),
            ClipRect::new(60, -10, 120, 30),
            ClipRect::new(10, 90, 20, 200),
            ClipRect::new(30, 30, 70, 70),
        ] {
            let bands: Vec<_> = r.split_around(&occ).collect();
            for (i, a) in bands.iter().enumerate() {
                assert!(!a.intersects(&occ), "band {a:?} overlaps occluder {occ:?}");
                assert!(r.contains_rect(a), "band {a:?} escapes {r:?}");
                for b in &bands[i + 1..] {
                    assert!(!a.intersects(b), "bands {a:?} and {b:?} overlap");
                }
            }
        }
    }

    #[test]
    fn translate_saturates_at_the_edges() {
        let r = ClipRect::new(i32::MAX - 10, 0, i32::MAX - 5, 10);
        assert_eq!(
            r.translate(20, 0),
            ClipRect::new(i32::MAX, 0, i32::MAX, 10),
            "clamped instead of wrapping"
        );
        assert!(r.translate(20, 0).is_empty(), "pushed off the far edge");
        assert_eq!(
            ClipRect::new(i32::MIN, 0, 0, 1).translate(-1, 0).left,
            i32::MIN,
            "clamped at the low edge"
        );
    }

    #[test]
    fn kurbo_conversion_expands_fractions() {
        let k = kurbo::Rect::new(0.5, 1.2, 9.1, 10.0);
        assert_eq!(ClipRect::from_kurbo(k), ClipRect::new(0, 1, 10, 10));
        let back = ClipRect::new(1, 2, 3, 4).to_kurbo();
        assert_eq!(back, kurbo::Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
