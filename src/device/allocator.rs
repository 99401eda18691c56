// Copyright 2024-2026 mirrorsync Contributors
// Licensed under the Apache License, Version 2.0

//! Device allocator trait and the host-backed implementation.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

/// Alignment guaranteed for every allocation handed out by
/// [`HostBackedAllocator`].
pub const DEVICE_ALIGNMENT: usize = 64;

/// Raw address of device memory. Never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevicePtr(NonNull<u8>);

impl DevicePtr {
    /// Wrap a raw pointer, returning `None` for null.
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub const fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub const fn as_non_null(self) -> NonNull<u8> {
        self.0
    }

    /// Numeric address, used as the allocation key.
    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Reinterpret as a typed pointer.
    pub const fn cast<T>(self) -> NonNull<T> {
        self.0.cast()
    }
}

/// Trait abstracting the device runtime's allocate/free entry points.
///
/// Memory returned by `allocate` must stay addressable from the host for the
/// bulk copies performed by the coherence cache.
pub trait DeviceAllocator: Send + Sync {
    fn allocate(&self, size: usize) -> Result<DevicePtr>;

    /// Release memory obtained from `allocate`. Freeing a pointer this
    /// allocator did not hand out is a programming error.
    fn free(&self, ptr: DevicePtr);

    fn allocated_bytes(&self) -> usize;

    fn name(&self) -> &str {
        "device"
    }
}

// -- Host-backed allocator ----------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Allocation {
    size: usize,
    layout: Layout,
}

struct AllocState {
    allocations: HashMap<usize, Allocation>,
    total: usize,
}

/// Device allocator backed by zeroed, aligned host memory.
///
/// Stands in for a unified-memory runtime: pointers are directly addressable
/// by both sides, so transfers are plain byte copies. Enforces a capacity and
/// tracks every live allocation for leak detection.
pub struct HostBackedAllocator {
    capacity: usize,
    state: Mutex<AllocState>,
}

impl HostBackedAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(AllocState {
                allocations: HashMap::new(),
                total: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of live (un-freed) allocations.
    pub fn leak_count(&self) -> usize {
        self.state.lock().allocations.len()
    }
}

impl DeviceAllocator for HostBackedAllocator {
    fn allocate(&self, size: usize) -> Result<DevicePtr> {
        let mut s = self.state.lock();
        let available = self.capacity.saturating_sub(s.total);
        if size > available {
            warn!(
                requested = size,
                available,
                "device allocation exceeds capacity"
            );
            return Err(CacheError::OutOfMemory {
                requested: size,
                available,
            });
        }

        // Zero-byte requests still get a distinct address.
        let layout = Layout::from_size_align(size.max(1), DEVICE_ALIGNMENT)
            .map_err(|e| CacheError::AllocationFailed(e.to_string()))?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = DevicePtr::new(raw).ok_or_else(|| {
            CacheError::AllocationFailed(format!("host allocation of {size} bytes failed"))
        })?;

        let allocation = Allocation { size, layout };
        s.allocations.insert(ptr.addr(), allocation);
        s.total += size;
        debug!(
            addr = ptr.addr(),
            size,
            total = s.total,
            "device buffer allocated"
        );
        Ok(ptr)
    }

    fn free(&self, ptr: DevicePtr) {
        let mut s = self.state.lock();
        let Some(allocation) = s.allocations.remove(&ptr.addr()) else {
            panic!(
                "free of unknown device pointer {:#x} (double free?)",
                ptr.addr()
            );
        };
        s.total -= allocation.size;
        debug!(
            addr = ptr.addr(),
            size = allocation.size,
            total = s.total,
            "device buffer freed"
        );
        // SAFETY: ptr was produced by `alloc_zeroed` with exactly this layout
        // and has just been removed from the live set.
        unsafe { alloc::dealloc(ptr.as_ptr(), allocation.layout) };
    }

    fn allocated_bytes(&self) -> usize {
        self.state.lock().total
    }

    fn name(&self) -> &str {
        "host-backed"
    }
}

impl Drop for HostBackedAllocator {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.allocations.is_empty() {
            warn!(
                leaked = state.allocations.len(),
                bytes = state.total,
                "allocator dropped with live buffers"
            );
        }
        for (addr, allocation) in state.allocations.drain() {
            // SAFETY: every key is the address of a live `alloc_zeroed` block.
            unsafe { alloc::dealloc(addr as *mut u8, allocation.layout) };
        }
        state.total = 0;
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
