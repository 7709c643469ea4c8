// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owner-tracking mutex guarding one table segment.
//!
//! Unlike a scoped guard, the lock is released by an explicit call. This
//! lets the outermost [`TableGuard`](super::TableGuard) of a thread hold it
//! across any number of nested guards.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct SegmentMutex {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl SegmentMutex {
    /// Creates a mutex already owned by the calling thread.
    pub(crate) fn locked_by_current() -> Self {
        Self {
            owner: Mutex::new(Some(thread::current().id())),
            released: Condvar::new(),
        }
    }

    /// Takes the lock for the calling thread, waiting at most `timeout`.
    ///
    /// Returns `false` on timeout.
    pub(crate) fn lock_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut owner = self.owner.lock();
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return true;
                }
                Some(t) if t == me => return true,
                Some(_) => {
                    if self.released.wait_until(&mut owner, deadline).timed_out() {
                        if owner.is_none() {
                            *owner = Some(me);
                            return true;
                        }
                        return false;
                    }
                }
            }
        }
    }

    /// Releases the lock if the calling thread owns it.
    pub(crate) fn unlock(&self) {
        let me = thread::current().id();
        let mut owner = self.owner.lock();
        if *owner == Some(me) {
            *owner = None;
            drop(owner);
            self.released.notify_one();
        }
    }

    /// Returns `true` if the calling thread holds the lock.
    pub(crate) fn is_held_by_current(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_times_out_while_held_elsewhere() {
        let m = Arc::new(SegmentMutex::default());
        assert!(m.lock_for(Duration::from_millis(10)));
        let other = Arc::clone(&m);
        let got = thread::spawn(move || other.lock_for(Duration::from_millis(20)))
            .join()
            .unwrap();
        assert!(!got, "second thread must time out");
        m.unlock();
        let other = Arc::clone(&m);
        let got = thread::spawn(move || {
            let ok = other.lock_for(Duration::from_millis(20));
            other.unlock();
            ok
        })
        .join()
        .unwrap();
        assert!(got, "lock is free after unlock");
    }

    #[test]
    fn waiter_wakes_on_release() {
        let m = Arc::new(SegmentMutex::default());
        assert!(m.lock_for(Duration::from_millis(10)));
        let other = Arc::clone(&m);
        let waiter = thread::spawn(move || other.lock_for(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        m.unlock();
        assert!(waiter.join().unwrap(), "waiter acquires after release");
    }

    #[test]
    fn unlock_by_non_owner_is_ignored() {
        let m = Arc::new(SegmentMutex::locked_by_current());
        let other = Arc::clone(&m);
        thread::spawn(move || other.unlock()).join().unwrap();
        assert!(m.is_held_by_current(), "still owned by this thread");
    }
}
