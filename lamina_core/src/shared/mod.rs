// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The process-wide surface registry and its access guards.
//!
//! A [`SurfaceRegistry`] is the explicitly constructed service that owns the
//! shared surface table. Callers obtain a [`TableGuard`] through
//! [`SurfaceRegistry::acquire`]:
//!
//! - The first acquire in a thread maps the current table segment and takes
//!   its mutex, waiting at most `timeout`.
//! - Nested acquires on the same thread only bump a thread-local count.
//!   Redraw and expose recurse heavily, so this is the common case.
//! - Dropping the outermost guard releases the mutex and unmaps the segment.
//!
//! # Growth
//!
//! The table never resizes in place. [`TableGuard::grow`] copies it into a
//! larger segment under a dedicated grow lock, publishes the segment's new
//! [`MemoryId`] and hands the old mutex back. Threads that were queued on
//! the old segment notice the identifier change and retry on the new one.
//! Growth is refused while the calling thread holds nested access, since
//! outer frames of the same thread may still be iterating the old block.
//!
//! # Access intents
//!
//! [`AccessMode`] distinguishes reads, tree mutation and in-place updates.
//! All three take the same exclusive mutex; the intent is recorded in logs.

mod lock;

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::TableConfig;
use crate::error::TableError;
use crate::surface::{MemoryId, Removal, SurfaceId, SurfaceRecord, SurfaceTable, SyncFields};
use crate::trace::GrowEvent;

use lock::SegmentMutex;

/// Why a caller is accessing the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-only traversal.
    Read,
    /// Tree mutation (insert, remove, restack).
    Write,
    /// In-place field updates (geometry sync after a move).
    Update,
}

/// One published table block.
#[derive(Debug)]
struct Segment {
    memory: MemoryId,
    lock: SegmentMutex,
    table: RwLock<SurfaceTable>,
}

/// A thread's view of one registry.
struct Mapping {
    registry: u64,
    segment: Arc<Segment>,
    depth: u32,
}

thread_local! {
    static MAPPINGS: RefCell<Vec<Mapping>> = const { RefCell::new(Vec::new()) };
}

static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Result of [`SurfaceRegistry::track`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tracked {
    /// Index the record was inserted at.
    pub index: usize,
    /// Set if the table had to grow first.
    pub grown: Option<GrowEvent>,
}

/// Process-wide owner of the shared surface table.
///
/// Construct one per session and share it (typically in an `Arc`) with
/// every compositor context. Dropping the last handle tears the table down.
pub struct SurfaceRegistry {
    key: u64,
    config: TableConfig,
    current: RwLock<Arc<Segment>>,
    grow_lock: Mutex<()>,
    next_memory: AtomicU32,
}

impl fmt::Debug for SurfaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRegistry")
            .field("memory", &self.memory_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SurfaceRegistry {
    /// Creates a registry with an empty table.
    #[must_use]
    pub fn new(config: TableConfig) -> Self {
        let memory = MemoryId(1);
        debug!(capacity = config.initial_capacity, ?memory, "surface registry created");
        Self {
            key: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            config,
            current: RwLock::new(Arc::new(Segment {
                memory,
                lock: SegmentMutex::default(),
                table: RwLock::new(SurfaceTable::with_capacity(config.initial_capacity)),
            })),
            grow_lock: Mutex::new(()),
            next_memory: AtomicU32::new(2),
        }
    }

    /// The registry's configuration.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Identifier of the currently published table block.
    #[must_use]
    pub fn memory_id(&self) -> MemoryId {
        self.current.read().memory
    }

    /// Acquires the table for `mode`, waiting at most `timeout` for the
    /// segment mutex.
    ///
    /// Nested calls on a thread that already holds access return
    /// immediately.
    ///
    /// # Errors
    ///
    /// [`TableError::LockTimeout`] if the mutex is not obtained in time.
    pub fn acquire(&self, mode: AccessMode, timeout: Duration) -> Result<TableGuard<'_>, TableError> {
        let nested = MAPPINGS.with_borrow_mut(|maps| {
            maps.iter_mut()
                .find(|m| m.registry == self.key)
                .map(|m| {
                    m.depth += 1;
                    m.depth
                })
        });
        if let Some(depth) = nested {
            trace!(?mode, depth, "nested table access");
            return Ok(TableGuard::new(self, mode));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let segment = Arc::clone(&self.current.read());
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !segment.lock.lock_for(remaining) {
                debug!(?mode, ?timeout, "table access timed out");
                return Err(TableError::LockTimeout { mode, timeout });
            }
            if segment.memory != self.memory_id() {
                // The table grew while we waited.
                segment.lock.unlock();
                continue;
            }
            trace!(?mode, memory = ?segment.memory, "table access");
            MAPPINGS.with_borrow_mut(|maps| {
                maps.push(Mapping {
                    registry: self.key,
                    segment,
                    depth: 1,
                });
            });
            return Ok(TableGuard::new(self, mode));
        }
    }

    /// [`acquire`](Self::acquire) with the configured access timeout.
    ///
    /// # Errors
    ///
    /// [`TableError::LockTimeout`] if the mutex is not obtained in time.
    pub fn access(&self, mode: AccessMode) -> Result<TableGuard<'_>, TableError> {
        self.acquire(mode, self.config.access_timeout)
    }

    fn release(&self) {
        let released = MAPPINGS.with_borrow_mut(|maps| {
            let pos = maps.iter().position(|m| m.registry == self.key)?;
            maps[pos].depth -= 1;
            if maps[pos].depth == 0 {
                Some(maps.swap_remove(pos).segment)
            } else {
                None
            }
        });
        if let Some(segment) = released {
            segment.lock.unlock();
            trace!(memory = ?segment.memory, "table released");
        }
    }

    // -- Tree API ---------------------------------------------------------

    /// Inserts `record`, growing the table first if it is full.
    ///
    /// # Errors
    ///
    /// - [`TableError::ArrayFull`] past the growth ceiling.
    /// - [`TableError::GrowReentrant`] if growth is needed while this
    ///   thread holds nested access.
    /// - Any error of [`SurfaceTable::insert`].
    pub fn track(&self, record: SurfaceRecord) -> Result<Tracked, TableError> {
        let guard = self.access(AccessMode::Write)?;
        let grown = if guard.read(SurfaceTable::is_full)? {
            Some(guard.grow()?)
        } else {
            None
        };
        let index = guard.write(|t| t.insert(record))??;
        Ok(Tracked { index, grown })
    }

    /// Removes `id` and all its descendants.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn untrack(&self, id: SurfaceId) -> Result<Removal, TableError> {
        let guard = self.access(AccessMode::Write)?;
        guard.write(|t| t.remove(id))?
    }

    /// Publishes `source`'s geometry and relayouts its span.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `source.id` is not tracked.
    pub fn update(&self, source: &SurfaceRecord) -> Result<usize, TableError> {
        let guard = self.access(AccessMode::Update)?;
        guard.write(|t| t.update(source))?
    }

    /// Publishes the selected fields of `source`.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `source.id` is not tracked.
    pub fn sync_fields(&self, source: &SurfaceRecord, fields: SyncFields) -> Result<usize, TableError> {
        let guard = self.access(AccessMode::Update)?;
        guard.write(|t| t.sync_fields(source, fields))?
    }

    /// Moves `id` in front of its siblings. Returns the new index.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn raise(&self, id: SurfaceId) -> Result<usize, TableError> {
        let guard = self.access(AccessMode::Write)?;
        guard.write(|t| t.raise(id))?
    }

    /// Moves `id` behind its siblings. Returns the new index.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn lower(&self, id: SurfaceId) -> Result<usize, TableError> {
        let guard = self.access(AccessMode::Write)?;
        guard.write(|t| t.lower(id))?
    }

    /// Copies every record.
    ///
    /// # Errors
    ///
    /// [`TableError::LockTimeout`] if the table cannot be read in time.
    pub fn snapshot(&self) -> Result<Vec<SurfaceRecord>, TableError> {
        self.access(AccessMode::Read)?.read(SurfaceTable::snapshot)
    }

    /// Copies the record for `id`.
    ///
    /// # Errors
    ///
    /// [`TableError::NotFound`] if `id` is not tracked.
    pub fn record(&self, id: SurfaceId) -> Result<SurfaceRecord, TableError> {
        let guard = self.access(AccessMode::Read)?;
        guard
            .read(|t| t.find_index(id).map(|i| *t.record_at(i)))?
            .ok_or(TableError::NotFound(id))
    }

    /// Number of tracked records.
    ///
    /// # Errors
    ///
    /// [`TableError::LockTimeout`] if the table cannot be read in time.
    pub fn record_count(&self) -> Result<usize, TableError> {
        self.access(AccessMode::Read)?.read(SurfaceTable::len)
    }

    /// Current table capacity.
    ///
    /// # Errors
    ///
    /// [`TableError::LockTimeout`] if the table cannot be read in time.
    pub fn capacity(&self) -> Result<usize, TableError> {
        self.access(AccessMode::Read)?.read(SurfaceTable::capacity)
    }

    fn allocate_memory_id(&self) -> MemoryId {
        MemoryId(self.next_memory.fetch_add(1, Ordering::Relaxed))
    }
}

impl Drop for SurfaceRegistry {
    fn drop(&mut self) {
        let records = self.current.read().table.read().len();
        debug!(records, memory = ?self.memory_id(), "surface registry torn down");
    }
}

/// Scoped access to the surface table, bound to the acquiring thread.
///
/// Guards nest: every guard of a thread shares one mapping, and the mutex
/// is released when the last of them drops. Table contents are reached
/// through [`read`](Self::read) and [`write`](Self::write) closures; do not
/// call one from inside the other.
pub struct TableGuard<'a> {
    registry: &'a SurfaceRegistry,
    mode: AccessMode,
    _thread_bound: PhantomData<*const ()>,
}

impl fmt::Debug for TableGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableGuard")
            .field("mode", &self.mode)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl<'a> TableGuard<'a> {
    fn new(registry: &'a SurfaceRegistry, mode: AccessMode) -> Self {
        Self {
            registry,
            mode,
            _thread_bound: PhantomData,
        }
    }

    /// The intent this guard was acquired with.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Number of live guards on this thread for the same registry.
    #[must_use]
    pub fn depth(&self) -> u32 {
        MAPPINGS.with_borrow(|maps| {
            maps.iter()
                .find(|m| m.registry == self.registry.key)
                .map_or(0, |m| m.depth)
        })
    }

    fn segment(&self) -> Result<Arc<Segment>, TableError> {
        MAPPINGS
            .with_borrow(|maps| {
                maps.iter()
                    .find(|m| m.registry == self.registry.key)
                    .map(|m| Arc::clone(&m.segment))
            })
            .ok_or_else(|| TableError::AccessMemory(self.registry.memory_id()))
    }

    /// Identifier of the block this thread has mapped.
    ///
    /// # Errors
    ///
    /// [`TableError::AccessMemory`] if the mapping is gone.
    pub fn memory_id(&self) -> Result<MemoryId, TableError> {
        Ok(self.segment()?.memory)
    }

    /// Runs `f` with shared access to the table.
    ///
    /// # Errors
    ///
    /// [`TableError::AccessMemory`] if the mapping is gone.
    pub fn read<R>(&self, f: impl FnOnce(&SurfaceTable) -> R) -> Result<R, TableError> {
        let segment = self.segment()?;
        let table = segment.table.read();
        Ok(f(&table))
    }

    /// Runs `f` with exclusive access to the table.
    ///
    /// # Errors
    ///
    /// [`TableError::AccessMemory`] if the mapping is gone.
    pub fn write<R>(&self, f: impl FnOnce(&mut SurfaceTable) -> R) -> Result<R, TableError> {
        debug_assert!(
            self.mode != AccessMode::Read,
            "table mutated through a read guard"
        );
        let segment = self.segment()?;
        let mut table = segment.table.write();
        Ok(f(&mut table))
    }

    /// Copies the table into a larger block and publishes it.
    ///
    /// Capacity doubles up to the configured ceiling. Record order and
    /// contents are preserved exactly.
    ///
    /// # Errors
    ///
    /// - [`TableError::GrowReentrant`] if this thread holds nested access.
    /// - [`TableError::LockTimeout`] if the grow lock is busy.
    /// - [`TableError::ArrayFull`] at the ceiling.
    pub fn grow(&self) -> Result<GrowEvent, TableError> {
        if self.depth() > 1 {
            return Err(TableError::GrowReentrant);
        }
        let registry = self.registry;
        let timeout = registry.config.grow_timeout;
        let Some(_grow_lock) = registry.grow_lock.try_lock_for(timeout) else {
            return Err(TableError::LockTimeout {
                mode: AccessMode::Write,
                timeout,
            });
        };

        let old = self.segment()?;
        debug_assert!(old.lock.is_held_by_current(), "grow without holding the table");
        let table = old.table.read();
        let old_capacity = table.capacity();
        let new_capacity = registry.config.next_capacity(old_capacity);
        if new_capacity <= old_capacity {
            return Err(TableError::ArrayFull {
                capacity: old_capacity,
            });
        }

        let memory = registry.allocate_memory_id();
        let segment = Arc::new(Segment {
            memory,
            lock: SegmentMutex::locked_by_current(),
            table: RwLock::new(table.grown(new_capacity)),
        });
        drop(table);

        *registry.current.write() = Arc::clone(&segment);
        MAPPINGS.with_borrow_mut(|maps| {
            if let Some(m) = maps.iter_mut().find(|m| m.registry == registry.key) {
                m.segment = segment;
            }
        });
        old.lock.unlock();

        debug!(old_capacity, new_capacity, ?memory, "surface table grown");
        Ok(GrowEvent {
            old_capacity,
            new_capacity,
            memory,
        })
    }
}

impl Drop for TableGuard<'_> {
    fn drop(&mut self) {
        self.registry.release();
    }
}
