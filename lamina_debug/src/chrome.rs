// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Recordings carry no clock. Each event's timestamp is its ordinal in the
//! recording, in microseconds, so the viewer shows passes in order with a
//! uniform spacing. Draws and splits are grouped under `tid` 0, presents
//! under `tid` 1 and table traffic under `tid` 2.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use lamina_core::rect::ClipRect;

use crate::recorder::{RecordedEvent, decode};

const TID_DRAW: u32 = 0;
const TID_BLIT: u32 = 1;
const TID_TABLE: u32 = 2;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// A [`PassSummary`](lamina_core::trace::PassSummary) closes a pass: the
/// events since the previous summary are wrapped in a complete (`"X"`) span.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut pass_start = 0_u64;

    for (ts, recorded) in (0_u64..).zip(decode(bytes)) {
        match recorded {
            RecordedEvent::Draw(e) => events.push(json!({
                "ph": "i",
                "name": "Draw",
                "cat": "Redraw",
                "ts": ts,
                "pid": 0,
                "tid": TID_DRAW,
                "s": "t",
                "args": {
                    "surface": e.surface.0,
                    "bitmap": e.bitmap.0,
                    "clip": rect_json(e.clip),
                }
            })),
            RecordedEvent::Split(e) => events.push(json!({
                "ph": "i",
                "name": "Split",
                "cat": "Redraw",
                "ts": ts,
                "pid": 0,
                "tid": TID_DRAW,
                "s": "t",
                "args": {
                    "surface": e.surface.0,
                    "occluder": e.occluder.0,
                    "rect": rect_json(e.rect),
                }
            })),
            RecordedEvent::Blit(e) => {
                let name = if e.composited { "CompositedBlit" } else { "Blit" };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Expose",
                    "ts": ts,
                    "pid": 0,
                    "tid": TID_BLIT,
                    "s": "t",
                    "args": {
                        "surface": e.surface.0,
                        "bitmap": e.bitmap.0,
                        "display": e.display.0,
                        "source": rect_json(e.source),
                        "dest": [e.dest_x, e.dest_y],
                    }
                }));
            }
            RecordedEvent::Removal(e) => events.push(json!({
                "ph": "i",
                "name": "Removal",
                "cat": "Table",
                "ts": ts,
                "pid": 0,
                "tid": TID_TABLE,
                "s": "p",
                "args": {
                    "surface": e.surface.0,
                    "records": e.removed,
                    "reason": format!("{:?}", e.reason),
                }
            })),
            RecordedEvent::Message(e) => events.push(json!({
                "ph": "i",
                "name": format!("{:?}", e.kind),
                "cat": "Message",
                "ts": ts,
                "pid": 0,
                "tid": TID_TABLE,
                "s": "p",
                "args": {
                    "task": e.task.0,
                    "surface": e.surface.0,
                    "area": rect_json(e.area),
                    "coalesced": e.coalesced,
                }
            })),
            RecordedEvent::Grow(e) => events.push(json!({
                "ph": "i",
                "name": "Grow",
                "cat": "Table",
                "ts": ts,
                "pid": 0,
                "tid": TID_TABLE,
                "s": "g",
                "args": {
                    "old_capacity": e.old_capacity,
                    "new_capacity": e.new_capacity,
                    "memory": e.memory.0,
                }
            })),
            RecordedEvent::PassSummary(s) => {
                events.push(json!({
                    "ph": "X",
                    "name": "Pass",
                    "cat": "Summary",
                    "ts": pass_start,
                    "dur": ts + 1 - pass_start,
                    "pid": 0,
                    "tid": TID_DRAW,
                    "args": {
                        "surface": s.surface.map(|id| id.0),
                        "draws": s.draws,
                        "splits": s.splits,
                        "blits": s.blits,
                    }
                }));
                pass_start = ts + 1;
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn rect_json(r: ClipRect) -> Value {
    json!([r.left, r.top, r.right, r.bottom])
}
