// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as tagged little-endian records. [`decode`] reads them back as
//! an iterator of [`RecordedEvent`]. Decoding stops at the first truncated
//! or unknown record.

use lamina_core::rect::ClipRect;
use lamina_core::surface::{BitmapId, DisplayId, MemoryId, SurfaceId, TaskId};
use lamina_core::trace::{
    BlitEvent, DrawEvent, GrowEvent, MessageEvent, MessageKind, PassSummary, RemovalEvent,
    RemovalReason, SplitEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_DRAW: u8 = 1;
const TAG_SPLIT: u8 = 2;
const TAG_BLIT: u8 = 3;
const TAG_REMOVAL: u8 = 4;
const TAG_MESSAGE: u8 = 5;
const TAG_GROW: u8 = 6;
const TAG_PASS_SUMMARY: u8 = 7;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_rect(&mut self, r: ClipRect) {
        self.write_i32(r.left);
        self.write_i32(r.top);
        self.write_i32(r.right);
        self.write_i32(r.bottom);
    }

    fn write_option_u32(&mut self, v: Option<u32>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u32(val);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
            }
        }
    }
}

impl TraceSink for RecorderSink {
    fn on_draw(&mut self, e: &DrawEvent) {
        self.write_u8(TAG_DRAW);
        self.write_u32(e.surface.0);
        self.write_u32(e.bitmap.0);
        self.write_rect(e.clip);
    }

    fn on_split(&mut self, e: &SplitEvent) {
        self.write_u8(TAG_SPLIT);
        self.write_u32(e.surface.0);
        self.write_u32(e.occluder.0);
        self.write_rect(e.rect);
    }

    fn on_blit(&mut self, e: &BlitEvent) {
        self.write_u8(TAG_BLIT);
        self.write_u32(e.surface.0);
        self.write_u32(e.bitmap.0);
        self.write_u32(e.display.0);
        self.write_rect(e.source);
        self.write_i32(e.dest_x);
        self.write_i32(e.dest_y);
        self.write_u8(u8::from(e.composited));
    }

    fn on_removal(&mut self, e: &RemovalEvent) {
        self.write_u8(TAG_REMOVAL);
        self.write_u32(e.surface.0);
        self.write_u64(e.removed as u64);
        self.write_u8(match e.reason {
            RemovalReason::Untracked => 0,
            RemovalReason::OwnerGone => 1,
            RemovalReason::BitmapGone => 2,
        });
    }

    fn on_message(&mut self, e: &MessageEvent) {
        self.write_u8(TAG_MESSAGE);
        self.write_u32(e.task.0);
        self.write_u32(e.surface.0);
        self.write_u8(match e.kind {
            MessageKind::DrawArea => 0,
            MessageKind::Invalidate => 1,
            MessageKind::Expose => 2,
        });
        self.write_rect(e.area);
        self.write_u8(u8::from(e.coalesced));
    }

    fn on_grow(&mut self, e: &GrowEvent) {
        self.write_u8(TAG_GROW);
        self.write_u64(e.old_capacity as u64);
        self.write_u64(e.new_capacity as u64);
        self.write_u32(e.memory.0);
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        self.write_u8(TAG_PASS_SUMMARY);
        self.write_option_u32(s.surface.map(|id| id.0));
        self.write_u32(s.draws);
        self.write_u32(s.splits);
        self.write_u32(s.blits);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`DrawEvent`].
    Draw(DrawEvent),
    /// A [`SplitEvent`].
    Split(SplitEvent),
    /// A [`BlitEvent`].
    Blit(BlitEvent),
    /// A [`RemovalEvent`].
    Removal(RemovalEvent),
    /// A [`MessageEvent`].
    Message(MessageEvent),
    /// A [`GrowEvent`].
    Grow(GrowEvent),
    /// A [`PassSummary`].
    PassSummary(PassSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_usize(&mut self) -> Option<usize> {
        usize::try_from(self.read_u64()?).ok()
    }

    fn read_rect(&mut self) -> Option<ClipRect> {
        Some(ClipRect::new(
            self.read_i32()?,
            self.read_i32()?,
            self.read_i32()?,
            self.read_i32()?,
        ))
    }

    fn read_option_u32(&mut self) -> Option<Option<u32>> {
        let present = self.read_u8()?;
        let val = self.read_u32()?;
        Some((present != 0).then_some(val))
    }

    fn decode_draw(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Draw(DrawEvent {
            surface: SurfaceId(self.read_u32()?),
            bitmap: BitmapId(self.read_u32()?),
            clip: self.read_rect()?,
        }))
    }

    fn decode_split(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Split(SplitEvent {
            surface: SurfaceId(self.read_u32()?),
            occluder: SurfaceId(self.read_u32()?),
            rect: self.read_rect()?,
        }))
    }

    fn decode_blit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Blit(BlitEvent {
            surface: SurfaceId(self.read_u32()?),
            bitmap: BitmapId(self.read_u32()?),
            display: DisplayId(self.read_u32()?),
            source: self.read_rect()?,
            dest_x: self.read_i32()?,
            dest_y: self.read_i32()?,
            composited: self.read_u8()? != 0,
        }))
    }

    fn decode_removal(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Removal(RemovalEvent {
            surface: SurfaceId(self.read_u32()?),
            removed: self.read_usize()?,
            reason: match self.read_u8()? {
                0 => RemovalReason::Untracked,
                1 => RemovalReason::OwnerGone,
                _ => RemovalReason::BitmapGone,
            },
        }))
    }

    fn decode_message(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Message(MessageEvent {
            task: TaskId(self.read_u32()?),
            surface: SurfaceId(self.read_u32()?),
            kind: match self.read_u8()? {
                0 => MessageKind::DrawArea,
                1 => MessageKind::Invalidate,
                _ => MessageKind::Expose,
            },
            area: self.read_rect()?,
            coalesced: self.read_u8()? != 0,
        }))
    }

    fn decode_grow(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Grow(GrowEvent {
            old_capacity: self.read_usize()?,
            new_capacity: self.read_usize()?,
            memory: MemoryId(self.read_u32()?),
        }))
    }

    fn decode_pass_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassSummary(PassSummary {
            surface: self.read_option_u32()?.map(SurfaceId),
            draws: self.read_u32()?,
            splits: self.read_u32()?,
            blits: self.read_u32()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<RecordedEvent> {
        let tag = self.read_u8()?;
        match tag {
            TAG_DRAW => self.decode_draw(),
            TAG_SPLIT => self.decode_split(),
            TAG_BLIT => self.decode_blit(),
            TAG_REMOVAL => self.decode_removal(),
            TAG_MESSAGE => self.decode_message(),
            TAG_GROW => self.decode_grow(),
            TAG_PASS_SUMMARY => self.decode_pass_summary(),
            _ => {
                // Unknown tag: the stream is unreadable from here on.
                self.pos = self.data.len();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blit() -> BlitEvent {
        BlitEvent {
            surface: SurfaceId(4),
            bitmap: BitmapId(0x8000_0000),
            display: DisplayId(1),
            source: ClipRect::new(0, 0, 16, 16),
            dest_x: -3,
            dest_y: 120,
            composited: true,
        }
    }

    #[test]
    fn mixed_stream_decodes_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_draw(&DrawEvent {
            surface: SurfaceId(1),
            bitmap: BitmapId(1),
            clip: ClipRect::new(0, 0, 800, 600),
        });
        rec.on_blit(&sample_blit());
        rec.on_removal(&RemovalEvent {
            surface: SurfaceId(7),
            removed: 3,
            reason: RemovalReason::BitmapGone,
        });
        rec.on_pass_summary(&PassSummary {
            surface: Some(SurfaceId(1)),
            draws: 5,
            splits: 2,
            blits: 1,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 4, "all events decoded");
        assert!(
            matches!(events[0], RecordedEvent::Draw(e) if e.clip.width() == 800),
            "draw clip survives"
        );
        assert_eq!(events[1], RecordedEvent::Blit(sample_blit()), "negative origin survives");
        assert!(
            matches!(events[2], RecordedEvent::Removal(e) if e.removed == 3 && e.reason == RemovalReason::BitmapGone),
            "{:?}",
            events[2]
        );
        assert!(
            matches!(events[3], RecordedEvent::PassSummary(s) if s.surface == Some(SurfaceId(1))),
            "summary keeps its surface"
        );
    }

    #[test]
    fn message_and_grow_events() {
        let mut rec = RecorderSink::new();
        rec.on_message(&MessageEvent {
            task: TaskId(2),
            surface: SurfaceId(9),
            kind: MessageKind::Invalidate,
            area: ClipRect::new(1, 2, 3, 4),
            coalesced: false,
        });
        rec.on_grow(&GrowEvent {
            old_capacity: 200,
            new_capacity: 400,
            memory: MemoryId(3),
        });
        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert!(
            matches!(events[0], RecordedEvent::Message(m) if m.kind == MessageKind::Invalidate),
            "{:?}",
            events[0]
        );
        assert!(
            matches!(events[1], RecordedEvent::Grow(g) if g.new_capacity == 400),
            "{:?}",
            events[1]
        );
    }

    #[test]
    fn truncated_recording_stops_cleanly() {
        let mut rec = RecorderSink::new();
        rec.on_blit(&sample_blit());
        rec.on_blit(&sample_blit());
        let bytes = rec.into_bytes();
        let cut = &bytes[..bytes.len() - 5];
        assert_eq!(decode(cut).count(), 1, "partial second record dropped");
    }

    #[test]
    fn unknown_tag_ends_decoding() {
        assert_eq!(decode(&[0xFF, 1, 2, 3]).count(), 0, "nothing decodes");
    }
}
