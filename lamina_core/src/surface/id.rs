// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types for surfaces and the resources they reference.
//!
//! Every identifier is a plain `u32` newtype. Zero is never a valid id; a
//! missing parent is modelled with `Option<SurfaceId>` rather than a
//! sentinel.

use core::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

id_type! {
    /// Identifies a surface. Unique across every process sharing a table.
    SurfaceId
}

id_type! {
    /// Identifies the pixel buffer a surface renders into.
    ///
    /// Surfaces whose `BitmapId` equals their parent's share one buffer and
    /// are composited as a unit.
    BitmapId
}

id_type! {
    /// Identifies a display device (the real framebuffer).
    DisplayId
}

id_type! {
    /// Identifies the process (task) that owns a surface.
    TaskId
}

id_type! {
    /// Identifies a shared memory block.
    ///
    /// The surface table itself lives in one; growing the table publishes a
    /// new `MemoryId`.
    MemoryId
}
