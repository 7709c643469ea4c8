// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Rectangles
//! print as `left,top..right,bottom`.

use std::io::Write;

use lamina_core::rect::ClipRect;
use lamina_core::trace::{
    BlitEvent, DrawEvent, GrowEvent, MessageEvent, MessageKind, PassSummary, RemovalEvent,
    RemovalReason, SplitEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    events: u64,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer, events: 0 }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer, events: 0 }
    }

    /// Number of events written so far.
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        self.events += 1;
        let _ = writeln!(self.writer, "#{:<5} {args}", self.events);
    }
}

struct Span(ClipRect);

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = self.0;
        write!(f, "{},{}..{},{}", r.left, r.top, r.right, r.bottom)
    }
}

fn reason_name(reason: RemovalReason) -> &'static str {
    match reason {
        RemovalReason::Untracked => "untracked",
        RemovalReason::OwnerGone => "owner-gone",
        RemovalReason::BitmapGone => "bitmap-gone",
    }
}

fn kind_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::DrawArea => "draw-area",
        MessageKind::Invalidate => "invalidate",
        MessageKind::Expose => "expose",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_draw(&mut self, e: &DrawEvent) {
        self.line(format_args!(
            "[draw] surface={} bitmap={} clip={}",
            e.surface.0,
            e.bitmap.0,
            Span(e.clip)
        ));
    }

    fn on_split(&mut self, e: &SplitEvent) {
        self.line(format_args!(
            "[split] surface={} occluder={} rect={}",
            e.surface.0,
            e.occluder.0,
            Span(e.rect)
        ));
    }

    fn on_blit(&mut self, e: &BlitEvent) {
        self.line(format_args!(
            "[blit] surface={} bitmap={} display={} src={} dest={},{}{}",
            e.surface.0,
            e.bitmap.0,
            e.display.0,
            Span(e.source),
            e.dest_x,
            e.dest_y,
            if e.composited { " composited" } else { "" }
        ));
    }

    fn on_removal(&mut self, e: &RemovalEvent) {
        self.line(format_args!(
            "[remove] surface={} records={} reason={}",
            e.surface.0,
            e.removed,
            reason_name(e.reason)
        ));
    }

    fn on_message(&mut self, e: &MessageEvent) {
        self.line(format_args!(
            "[message] task={} surface={} kind={} area={}{}",
            e.task.0,
            e.surface.0,
            kind_name(e.kind),
            Span(e.area),
            if e.coalesced { " coalesced" } else { "" }
        ));
    }

    fn on_grow(&mut self, e: &GrowEvent) {
        self.line(format_args!(
            "[grow] capacity={}->{} memory={}",
            e.old_capacity, e.new_capacity, e.memory.0
        ));
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        match s.surface {
            Some(id) => self.line(format_args!(
                "[pass] surface={} draws={} splits={} blits={}",
                id.0, s.draws, s.splits, s.blits
            )),
            None => self.line(format_args!(
                "[pass] draws={} splits={} blits={}",
                s.draws, s.splits, s.blits
            )),
        }
    }
}
