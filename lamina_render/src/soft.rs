// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory raster and display.
//!
//! Pixels are packed `0xAARRGGBB` regardless of the requested depth. Used
//! by the test suites and by headless demos.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use lamina_core::rect::ClipRect;
use lamina_core::surface::{BitmapId, DisplayId};

use crate::error::RasterError;
use crate::raster::{BlitMode, Colour, DisplayDevice, Raster};

/// First id handed out by [`SoftRaster::create_bitmap`].
const SCRATCH_BASE: u32 = 0x8000_0000;

/// A bitmap held by [`SoftRaster`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftBitmap {
    width: i32,
    height: i32,
    bits_per_pixel: u8,
    pixels: Vec<u32>,
}

impl SoftBitmap {
    fn new(width: i32, height: i32, bits_per_pixel: u8) -> Self {
        let len = usize::try_from(width.max(0)).unwrap_or(0)
            * usize::try_from(height.max(0)).unwrap_or(0);
        Self {
            width: width.max(0),
            height: height.max(0),
            bits_per_pixel,
            pixels: vec![0; len],
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Bits per pixel requested at creation.
    #[must_use]
    pub fn bits_per_pixel(&self) -> u8 {
        self.bits_per_pixel
    }

    /// Raw pixels, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn bounds(&self) -> ClipRect {
        ClipRect::new(0, 0, self.width, self.height)
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds().contains_point(x, y) {
            return None;
        }
        usize::try_from(y * self.width + x).ok()
    }

    /// Reads one pixel.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<u32> {
        self.offset(x, y).map(|i| self.pixels[i])
    }

    fn set(&mut self, x: i32, y: i32, pixel: u32) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i] = pixel;
        }
    }
}

fn channel(pixel: u32, shift: u32) -> u32 {
    (pixel >> shift) & 0xff
}

/// Blends `src` over `dest` with extra `opacity`.
fn blend(src: u32, dest: u32, opacity: u8) -> u32 {
    let alpha = channel(src, 24) * u32::from(opacity) / 255;
    let inv = 255 - alpha;
    let mix = |shift| (channel(src, shift) * alpha + channel(dest, shift) * inv) / 255;
    let out_alpha = alpha + channel(dest, 24) * inv / 255;
    (out_alpha << 24) | (mix(16) << 16) | (mix(8) << 8) | mix(0)
}

/// Packs a colour as `0xAARRGGBB`.
#[must_use]
pub fn pack(colour: Colour) -> u32 {
    (u32::from(colour.a) << 24)
        | (u32::from(colour.r) << 16)
        | (u32::from(colour.g) << 8)
        | u32::from(colour.b)
}

/// An in-memory [`Raster`].
#[derive(Debug, Default)]
pub struct SoftRaster {
    bitmaps: HashMap<BitmapId, SoftBitmap>,
    busy: HashSet<BitmapId>,
    locks: HashMap<BitmapId, u32>,
    next_scratch: u32,
}

impl SoftRaster {
    /// Creates a raster with no bitmaps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a 32-bit bitmap.
    pub fn add_bitmap(&mut self, id: BitmapId, width: i32, height: i32) {
        self.bitmaps.insert(id, SoftBitmap::new(width, height, 32));
    }

    /// Deletes a bitmap, as if its owner had exited.
    pub fn remove_bitmap(&mut self, id: BitmapId) {
        self.bitmaps.remove(&id);
    }

    /// Marks a bitmap as locked by someone else.
    pub fn set_busy(&mut self, id: BitmapId, busy: bool) {
        if busy {
            self.busy.insert(id);
        } else {
            self.busy.remove(&id);
        }
    }

    /// Looks up a bitmap.
    #[must_use]
    pub fn bitmap(&self, id: BitmapId) -> Option<&SoftBitmap> {
        self.bitmaps.get(&id)
    }

    /// Number of outstanding locks on `id`.
    #[must_use]
    pub fn lock_count(&self, id: BitmapId) -> u32 {
        self.locks.get(&id).copied().unwrap_or(0)
    }
}

impl Raster for SoftRaster {
    fn lock(&mut self, bitmap: BitmapId, _timeout: Duration) -> Result<(), RasterError> {
        if !self.bitmaps.contains_key(&bitmap) {
            return Err(RasterError::NoSuchObject(bitmap));
        }
        if self.busy.contains(&bitmap) {
            return Err(RasterError::Busy(bitmap));
        }
        *self.locks.entry(bitmap).or_default() += 1;
        Ok(())
    }

    fn unlock(&mut self, bitmap: BitmapId) {
        if let Some(n) = self.locks.get_mut(&bitmap) {
            *n = n.saturating_sub(1);
        }
    }

    fn copy_area(
        &mut self,
        src: BitmapId,
        dest: BitmapId,
        mode: BlitMode,
        src_rect: ClipRect,
        dest_x: i32,
        dest_y: i32,
    ) -> Result<(), RasterError> {
        let source = self
            .bitmaps
            .get(&src)
            .ok_or(RasterError::NoSuchObject(src))?
            .clone();
        let target = self
            .bitmaps
            .get_mut(&dest)
            .ok_or(RasterError::NoSuchObject(dest))?;

        let area = src_rect.intersect(&source.bounds());
        let (dx, dy) = (dest_x - src_rect.left, dest_y - src_rect.top);
        let area = area.intersect(&target.bounds().translate(-dx, -dy));
        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let Some(s) = source.get(x, y) else { continue };
                let out = match mode {
                    BlitMode::Plain => s,
                    BlitMode::Blend { opacity } => {
                        blend(s, target.get(x + dx, y + dy).unwrap_or(0), opacity)
                    }
                };
                target.set(x + dx, y + dy, out);
            }
        }
        Ok(())
    }

    fn fill_rect(&mut self, bitmap: BitmapId, rect: ClipRect, pixel: u32) -> Result<(), RasterError> {
        let target = self
            .bitmaps
            .get_mut(&bitmap)
            .ok_or(RasterError::NoSuchObject(bitmap))?;
        let area = rect.intersect(&target.bounds());
        for y in area.top..area.bottom {
            for x in area.left..area.right {
                target.set(x, y, pixel);
            }
        }
        Ok(())
    }

    fn pack_colour(&self, _bitmap: BitmapId, colour: Colour) -> u32 {
        pack(colour)
    }

    fn pixel(&self, bitmap: BitmapId, x: i32, y: i32) -> Option<u32> {
        self.bitmaps.get(&bitmap)?.get(x, y)
    }

    fn create_bitmap(
        &mut self,
        width: i32,
        height: i32,
        bits_per_pixel: u8,
    ) -> Result<BitmapId, RasterError> {
        if width <= 0 || height <= 0 {
            return Err(RasterError::OutOfMemory);
        }
        let id = BitmapId(SCRATCH_BASE + self.next_scratch);
        self.next_scratch += 1;
        self.bitmaps
            .insert(id, SoftBitmap::new(width, height, bits_per_pixel));
        Ok(id)
    }

    fn free_bitmap(&mut self, bitmap: BitmapId) {
        self.bitmaps.remove(&bitmap);
    }
}

/// One call to [`DisplayDevice::present`] on a [`SoftDisplay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Present {
    /// Target display.
    pub display: DisplayId,
    /// Source bitmap.
    pub bitmap: BitmapId,
    /// Source area.
    pub src_rect: ClipRect,
    /// Destination left edge.
    pub dest_x: i32,
    /// Destination top edge.
    pub dest_y: i32,
}

impl Present {
    /// The destination area on the display.
    #[must_use]
    pub fn dest_rect(&self) -> ClipRect {
        ClipRect::from_origin_size(
            self.dest_x,
            self.dest_y,
            self.src_rect.width(),
            self.src_rect.height(),
        )
    }
}

/// An in-memory [`DisplayDevice`] with one framebuffer per display.
#[derive(Debug, Default)]
pub struct SoftDisplay {
    framebuffers: HashMap<DisplayId, SoftBitmap>,
    presents: Vec<Present>,
    unavailable: HashSet<DisplayId>,
}

impl SoftDisplay {
    /// Creates a device with no displays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a display of the given size.
    pub fn add_display(&mut self, id: DisplayId, width: i32, height: i32) {
        self.framebuffers.insert(id, SoftBitmap::new(width, height, 32));
    }

    /// Makes [`DisplayDevice::acquire`] fail for `id`.
    pub fn set_unavailable(&mut self, id: DisplayId, unavailable: bool) {
        if unavailable {
            self.unavailable.insert(id);
        } else {
            self.unavailable.remove(&id);
        }
    }

    /// The framebuffer of `id`.
    #[must_use]
    pub fn framebuffer(&self, id: DisplayId) -> Option<&SoftBitmap> {
        self.framebuffers.get(&id)
    }

    /// Every present since the last [`take_presents`](Self::take_presents).
    #[must_use]
    pub fn presents(&self) -> &[Present] {
        &self.presents
    }

    /// Drains the present log.
    pub fn take_presents(&mut self) -> Vec<Present> {
        std::mem::take(&mut self.presents)
    }
}

impl DisplayDevice for SoftDisplay {
    fn acquire(&mut self, display: DisplayId) -> Result<(), RasterError> {
        if self.unavailable.contains(&display) || !self.framebuffers.contains_key(&display) {
            return Err(RasterError::Display(display));
        }
        Ok(())
    }

    fn release(&mut self, _display: DisplayId) {}

    fn present(
        &mut self,
        display: DisplayId,
        raster: &dyn Raster,
        bitmap: BitmapId,
        src_rect: ClipRect,
        dest_x: i32,
        dest_y: i32,
    ) -> Result<(), RasterError> {
        let fb = self
            .framebuffers
            .get_mut(&display)
            .ok_or(RasterError::Display(display))?;
        let (dx, dy) = (dest_x - src_rect.left, dest_y - src_rect.top);
        for y in src_rect.top..src_rect.bottom {
            for x in src_rect.left..src_rect.right {
                if let Some(p) = raster.pixel(bitmap, x, y) {
                    fb.set(x + dx, y + dy, p);
                }
            }
        }
        self.presents.push(Present {
            display,
            bitmap,
            src_rect,
            dest_x,
            dest_y,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Colour = Colour::rgb(255, 0, 0);

    #[test]
    fn fill_is_clipped_to_bitmap() {
        let mut raster = SoftRaster::new();
        raster.add_bitmap(BitmapId(1), 4, 4);
        raster
            .fill_rect(BitmapId(1), ClipRect::new(2, 2, 10, 10), pack(RED))
            .unwrap();
        assert_eq!(raster.pixel(BitmapId(1), 3, 3), Some(pack(RED)));
        assert_eq!(raster.pixel(BitmapId(1), 1, 1), Some(0));
        assert_eq!(raster.pixel(BitmapId(1), 4, 4), None, "outside the bitmap");
    }

    #[test]
    fn blend_respects_alpha_and_opacity() {
        let opaque = pack(RED);
        assert_eq!(blend(opaque, 0xff00_00ff, 255), opaque);
        assert_eq!(blend(opaque, 0xff00_00ff, 0), 0xff00_00ff, "zero opacity keeps dest");
        let half = blend(opaque, 0xff00_0000, 128);
        assert_eq!(channel(half, 16), 128);
    }

    #[test]
    fn copy_area_offsets_and_clips() {
        let mut raster = SoftRaster::new();
        raster.add_bitmap(BitmapId(1), 4, 4);
        raster.add_bitmap(BitmapId(2), 4, 4);
        raster
            .fill_rect(BitmapId(1), ClipRect::new(0, 0, 4, 4), pack(RED))
            .unwrap();
        raster
            .copy_area(
                BitmapId(1),
                BitmapId(2),
                BlitMode::Plain,
                ClipRect::new(0, 0, 2, 2),
                3,
                3,
            )
            .unwrap();
        assert_eq!(raster.pixel(BitmapId(2), 3, 3), Some(pack(RED)));
        assert_eq!(raster.pixel(BitmapId(2), 2, 2), Some(0));
    }

    #[test]
    fn lock_reports_busy_and_missing() {
        let mut raster = SoftRaster::new();
        raster.add_bitmap(BitmapId(1), 1, 1);
        raster.set_busy(BitmapId(1), true);
        let t = Duration::from_millis(1);
        assert_eq!(raster.lock(BitmapId(1), t), Err(RasterError::Busy(BitmapId(1))));
        assert_eq!(
            raster.lock(BitmapId(7), t),
            Err(RasterError::NoSuchObject(BitmapId(7)))
        );
    }

    #[test]
    fn present_copies_into_framebuffer_and_logs() {
        let mut raster = SoftRaster::new();
        raster.add_bitmap(BitmapId(1), 4, 4);
        raster
            .fill_rect(BitmapId(1), ClipRect::new(0, 0, 4, 4), pack(RED))
            .unwrap();
        let mut display = SoftDisplay::new();
        display.add_display(DisplayId(1), 8, 8);
        display
            .present(DisplayId(1), &raster, BitmapId(1), ClipRect::new(1, 1, 3, 3), 5, 5)
            .unwrap();
        let fb = display.framebuffer(DisplayId(1)).unwrap();
        assert_eq!(fb.get(5, 5), Some(pack(RED)));
        assert_eq!(fb.get(7, 7), Some(0), "only the 2x2 source area is copied");
        assert_eq!(display.presents()[0].dest_rect(), ClipRect::new(5, 5, 7, 7));
    }
}
