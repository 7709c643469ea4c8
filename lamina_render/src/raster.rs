// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator interfaces for pixel buffers and display devices.
//!
//! The compositor never touches pixels itself. A [`Raster`] implementation
//! owns the bitmaps named by [`BitmapId`]s in the surface table, and a
//! [`DisplayDevice`] receives finished pixels. Pixel formats, fonts and
//! image decoding all live behind these traits.
//!
//! Coordinates passed to a `Raster` are relative to the bitmap's top-left
//! corner. Coordinates passed to a `DisplayDevice` are relative to the
//! display's top-level surface.

use std::time::Duration;

use lamina_core::rect::ClipRect;
use lamina_core::surface::{BitmapId, DisplayId};

use crate::error::RasterError;

/// An RGBA colour with 8 bits per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Colour {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha; 0 means "no fill" for surface backgrounds.
    pub a: u8,
}

impl Colour {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Creates a colour from its channels.
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque colour.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }
}

/// How [`Raster::copy_area`] combines source and destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlitMode {
    /// Overwrite the destination.
    Plain,
    /// Alpha-blend the source over the destination, scaled by `opacity`.
    Blend {
        /// Extra opacity applied to the source, 255 leaves it unchanged.
        opacity: u8,
    },
}

/// The raster library: bitmap locking, copies and fills.
pub trait Raster {
    /// Locks `bitmap` for drawing, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`RasterError::Busy`] if it stays locked elsewhere.
    /// - [`RasterError::NoSuchObject`] if the bitmap is gone.
    fn lock(&mut self, bitmap: BitmapId, timeout: Duration) -> Result<(), RasterError>;

    /// Releases a lock taken with [`lock`](Self::lock).
    fn unlock(&mut self, bitmap: BitmapId);

    /// Copies `src_rect` of `src` to `(dest_x, dest_y)` in `dest`.
    ///
    /// The copy is clipped to both bitmaps.
    ///
    /// # Errors
    ///
    /// [`RasterError::NoSuchObject`] if either bitmap is gone.
    fn copy_area(
        &mut self,
        src: BitmapId,
        dest: BitmapId,
        mode: BlitMode,
        src_rect: ClipRect,
        dest_x: i32,
        dest_y: i32,
    ) -> Result<(), RasterError>;

    /// Fills `rect` of `bitmap` with a packed pixel value.
    ///
    /// # Errors
    ///
    /// [`RasterError::NoSuchObject`] if the bitmap is gone.
    fn fill_rect(&mut self, bitmap: BitmapId, rect: ClipRect, pixel: u32) -> Result<(), RasterError>;

    /// Packs `colour` into `bitmap`'s pixel format.
    fn pack_colour(&self, bitmap: BitmapId, colour: Colour) -> u32;

    /// Reads one packed pixel, `None` outside the bitmap.
    fn pixel(&self, bitmap: BitmapId, x: i32, y: i32) -> Option<u32>;

    /// Allocates an off-table bitmap.
    ///
    /// # Errors
    ///
    /// [`RasterError::OutOfMemory`] if it cannot be allocated.
    fn create_bitmap(
        &mut self,
        width: i32,
        height: i32,
        bits_per_pixel: u8,
    ) -> Result<BitmapId, RasterError>;

    /// Frees a bitmap from [`create_bitmap`](Self::create_bitmap).
    fn free_bitmap(&mut self, bitmap: BitmapId);
}

/// A physical display.
pub trait DisplayDevice {
    /// Takes exclusive access to `display`.
    ///
    /// # Errors
    ///
    /// [`RasterError::Display`] if the display is unavailable.
    fn acquire(&mut self, display: DisplayId) -> Result<(), RasterError>;

    /// Releases access taken with [`acquire`](Self::acquire).
    fn release(&mut self, display: DisplayId);

    /// Copies `src_rect` of `bitmap` to `(dest_x, dest_y)` on `display`.
    ///
    /// # Errors
    ///
    /// [`RasterError::Display`] if the display went away.
    fn present(
        &mut self,
        display: DisplayId,
        raster: &dyn Raster,
        bitmap: BitmapId,
        src_rect: ClipRect,
        dest_x: i32,
        dest_y: i32,
    ) -> Result<(), RasterError>;
}
