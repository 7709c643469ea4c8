// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-process requests.
//!
//! Only the task owning a surface may draw into its bitmap. Everyone else
//! posts a [`SurfaceMessage`] to the owner's queue and carries on; the
//! owner applies it in [`Compositor::process_messages`](crate::Compositor::process_messages).
//!
//! Requests of the same kind for the same surface are coalesced: the
//! pending area grows to the union and the flags are merged.

use std::collections::HashMap;

use lamina_core::rect::ClipRect;
use lamina_core::surface::{SurfaceId, TaskId};
use lamina_core::trace::MessageKind;
use parking_lot::Mutex;
use tracing::debug;

use crate::flags::{ExposeFlags, RedrawFlags};

/// What the owner is asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// Re-expose an area.
    Expose(ExposeFlags),
    /// Redraw the surface and its children, then expose.
    Invalidate(RedrawFlags),
    /// Redraw only the surface itself, then expose.
    DrawArea(RedrawFlags),
}

impl Request {
    /// The request's kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Expose(_) => MessageKind::Expose,
            Self::Invalidate(_) => MessageKind::Invalidate,
            Self::DrawArea(_) => MessageKind::DrawArea,
        }
    }

    /// Merges `other`'s flags into `self`. Both must be the same kind.
    fn merge(&mut self, other: Self) {
        match (self, other) {
            (Self::Expose(a), Self::Expose(b)) => *a |= b,
            (Self::Invalidate(a), Self::Invalidate(b)) | (Self::DrawArea(a), Self::DrawArea(b)) => {
                *a |= b;
            }
            _ => {}
        }
    }
}

/// A request about one surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceMessage {
    /// Surface the request is about.
    pub surface: SurfaceId,
    /// Absolute area.
    pub area: ClipRect,
    /// What to do.
    pub request: Request,
}

/// Per-task message queues shared by every compositor of a session.
#[derive(Debug, Default)]
pub struct MessageBus {
    queues: Mutex<HashMap<TaskId, Vec<SurfaceMessage>>>,
}

impl MessageBus {
    /// Creates a bus with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a queue for `task`. Existing messages are kept.
    pub fn register_task(&self, task: TaskId) {
        self.queues.lock().entry(task).or_default();
    }

    /// Closes `task`'s queue, dropping pending messages.
    pub fn unregister_task(&self, task: TaskId) {
        if let Some(dropped) = self.queues.lock().remove(&task) {
            debug!(?task, pending = dropped.len(), "message queue closed");
        }
    }

    /// Returns `true` if `task` has a queue.
    #[must_use]
    pub fn has_task(&self, task: TaskId) -> bool {
        self.queues.lock().contains_key(&task)
    }

    /// Queues `message` for `task`.
    ///
    /// With `coalesce`, a pending message of the same kind for the same
    /// surface absorbs this one. Returns `Some(true)` if the message was
    /// merged, `Some(false)` if appended, and `None` if `task` has no
    /// queue.
    pub fn post(&self, task: TaskId, message: SurfaceMessage, coalesce: bool) -> Option<bool> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&task)?;
        if coalesce {
            let kind = message.request.kind();
            if let Some(pending) = queue
                .iter_mut()
                .find(|m| m.surface == message.surface && m.request.kind() == kind)
            {
                pending.area = pending.area.union(&message.area);
                pending.request.merge(message.request);
                return Some(true);
            }
        }
        queue.push(message);
        Some(false)
    }

    /// Removes and returns everything queued for `task`.
    #[must_use]
    pub fn take(&self, task: TaskId) -> Vec<SurfaceMessage> {
        self.queues
            .lock()
            .get_mut(&task)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of messages queued for `task`.
    #[must_use]
    pub fn pending(&self, task: TaskId) -> usize {
        self.queues.lock().get(&task).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expose(surface: u32, area: ClipRect, flags: ExposeFlags) -> SurfaceMessage {
        SurfaceMessage {
            surface: SurfaceId(surface),
            area,
            request: Request::Expose(flags),
        }
    }

    #[test]
    fn same_surface_and_kind_coalesce() {
        let bus = MessageBus::new();
        bus.register_task(TaskId(2));
        let a = expose(5, ClipRect::new(0, 0, 10, 10), ExposeFlags::CHILDREN);
        let b = expose(5, ClipRect::new(20, 0, 30, 10), ExposeFlags::ABSOLUTE);
        assert_eq!(bus.post(TaskId(2), a, true), Some(false));
        assert_eq!(bus.post(TaskId(2), b, true), Some(true));

        let queued = bus.take(TaskId(2));
        assert_eq!(queued.len(), 1, "second request merged into the first");
        assert_eq!(queued[0].area, ClipRect::new(0, 0, 30, 10));
        assert_eq!(
            queued[0].request,
            Request::Expose(ExposeFlags::CHILDREN | ExposeFlags::ABSOLUTE)
        );
        assert_eq!(bus.pending(TaskId(2)), 0, "take drains the queue");
    }

    #[test]
    fn different_kinds_do_not_coalesce() {
        let bus = MessageBus::new();
        bus.register_task(TaskId(2));
        let area = ClipRect::new(0, 0, 10, 10);
        bus.post(TaskId(2), expose(5, area, ExposeFlags::empty()), true);
        bus.post(
            TaskId(2),
            SurfaceMessage {
                surface: SurfaceId(5),
                area,
                request: Request::Invalidate(RedrawFlags::empty()),
            },
            true,
        );
        bus.post(TaskId(2), expose(6, area, ExposeFlags::empty()), true);
        assert_eq!(bus.pending(TaskId(2)), 3);
    }

    #[test]
    fn coalescing_can_be_disabled() {
        let bus = MessageBus::new();
        bus.register_task(TaskId(2));
        let m = expose(5, ClipRect::new(0, 0, 10, 10), ExposeFlags::empty());
        bus.post(TaskId(2), m, false);
        bus.post(TaskId(2), m, false);
        assert_eq!(bus.pending(TaskId(2)), 2);
    }

    #[test]
    fn unknown_task_is_rejected() {
        let bus = MessageBus::new();
        let m = expose(5, ClipRect::new(0, 0, 10, 10), ExposeFlags::empty());
        assert_eq!(bus.post(TaskId(9), m, true), None);
        bus.register_task(TaskId(9));
        bus.unregister_task(TaskId(9));
        assert!(!bus.has_task(TaskId(9)));
    }
}
