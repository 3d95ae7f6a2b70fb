//! Allocation accounting for pipeline sub-objects.
//!
//! An [`Arena`] decides whether an endpoint may allocate another
//! sub-object. Construction reserves `size_of` each sub-object through an
//! [`ArenaLease`] before building it; the lease is returned to the arena
//! when the endpoint (or a half-built pipeline) is dropped.
//!
//! A refused allocation is never fatal to the process: it only leaves the
//! endpoint being built invalid.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, SendError};

/// Memory budget shared by endpoints.
pub trait Arena: Send + Sync {
    /// Reserve `size` bytes. Returns `false` if the arena is exhausted.
    fn allocate(&self, size: usize) -> bool;

    /// Return `size` bytes previously reserved with [`allocate`](Self::allocate).
    fn deallocate(&self, size: usize);
}

/// Unlimited arena backed by the global allocator; tracks live bytes.
#[derive(Debug, Default)]
pub struct HeapArena {
    allocated: AtomicUsize,
}

impl HeapArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently reserved.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Arena for HeapArena {
    fn allocate(&self, size: usize) -> bool {
        self.allocated.fetch_add(size, Ordering::Relaxed);
        true
    }

    fn deallocate(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::Relaxed);
    }
}

/// Arena that refuses allocations beyond a fixed byte limit.
#[derive(Debug)]
pub struct LimitedArena {
    limit: usize,
    allocated: AtomicUsize,
}

impl LimitedArena {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Arena for LimitedArena {
    fn allocate(&self, size: usize) -> bool {
        self.allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(size).filter(|&next| next <= self.limit)
            })
            .is_ok()
    }

    fn deallocate(&self, size: usize) {
        self.allocated.fetch_sub(size, Ordering::AcqRel);
    }
}

/// Reservation held for the lifetime of one sub-object.
pub struct ArenaLease {
    arena: Arc<dyn Arena>,
    size: usize,
}

impl ArenaLease {
    /// Reserve room for a `T`, or fail with [`SendError::NoMem`].
    pub fn for_type<T>(arena: &Arc<dyn Arena>, what: &'static str) -> Result<Self> {
        let size = std::mem::size_of::<T>();
        if !arena.allocate(size) {
            tracing::debug!(what, size, "arena refused allocation");
            return Err(SendError::NoMem { what });
        }
        Ok(Self {
            arena: arena.clone(),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for ArenaLease {
    fn drop(&mut self) {
        self.arena.deallocate(self.size);
    }
}

impl std::fmt::Debug for ArenaLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaLease").field("size", &self.size).finish()
    }
}
