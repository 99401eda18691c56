// Copyright 2024-2026 mirrorsync Contributors
// Licensed under the Apache License, Version 2.0

//! Shared ownership of a device-resident buffer.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use super::allocator::{DeviceAllocator, DevicePtr};
use crate::error::Result;

/// Callback that releases a device buffer.
pub type Deleter = Box<dyn FnOnce(DevicePtr)>;

struct DeviceBuffer {
    ptr: DevicePtr,
    size: usize,
    deleter: Option<Deleter>,
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if let Some(deleter) = self.deleter.take() {
            trace!(
                addr = self.ptr.addr(),
                size = self.size,
                "releasing device buffer"
            );
            deleter(self.ptr);
        }
    }
}

/// Reference-counted handle to a device buffer.
///
/// A handle is moved into exactly one cache and is not `Clone`. Aliases of
/// that cache share it, and the deleter runs exactly once, when the last
/// alias is dropped.
///
/// ```compile_fail
/// use std::sync::Arc;
/// use mirrorsync::{DeviceHandle, HostBackedAllocator};
///
/// let alloc = Arc::new(HostBackedAllocator::new(4096));
/// let handle = DeviceHandle::allocate(alloc, 64).unwrap();
/// let second = handle.clone();
/// ```
pub struct DeviceHandle {
    buffer: Rc<DeviceBuffer>,
}

impl DeviceHandle {
    /// Allocate `size` bytes and release them through the same allocator.
    pub fn allocate(allocator: Arc<dyn DeviceAllocator>, size: usize) -> Result<Self> {
        let ptr = allocator.allocate(size)?;
        let deleter: Deleter = Box::new(move |ptr: DevicePtr| allocator.free(ptr));
        Ok(Self::adopt(ptr, size, deleter))
    }

    /// Adopt an existing device buffer with a caller-supplied deleter.
    ///
    /// # Safety
    ///
    /// `ptr` must address at least `size` bytes that are readable and
    /// writable from the host until `deleter` runs.
    pub unsafe fn from_raw<F>(ptr: DevicePtr, size: usize, deleter: F) -> Self
    where
        F: FnOnce(DevicePtr) + 'static,
    {
        Self::adopt(ptr, size, Box::new(deleter))
    }

    fn adopt(ptr: DevicePtr, size: usize, deleter: Deleter) -> Self {
        let buffer = DeviceBuffer {
            ptr,
            size,
            deleter: Some(deleter),
        };
        Self {
            buffer: Rc::new(buffer),
        }
    }

    /// Another owner of the same buffer, for aliases within one cache family.
    pub(crate) fn share(&self) -> Self {
        Self {
            buffer: Rc::clone(&self.buffer),
        }
    }

    pub fn ptr(&self) -> DevicePtr {
        self.buffer.ptr
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.buffer.size
    }

    /// Number of handles sharing this buffer.
    pub fn use_count(&self) -> usize {
        Rc::strong_count(&self.buffer)
    }

    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("addr", &format_args!("{:#x}", self.buffer.ptr.addr()))
            .field("size", &self.buffer.size)
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostBackedAllocator;
    use std::cell::Cell;

    #[test]
    fn last_drop_frees_through_allocator() {
        let alloc = Arc::new(HostBackedAllocator::new(4096));
        let handle = DeviceHandle::allocate(alloc.clone(), 1024).unwrap();
        let alias = handle.share();
        assert_eq!(handle.use_count(), 2);

        drop(handle);
        assert_eq!(alloc.allocated_bytes(), 1024);
        assert!(alias.is_unique());

        drop(alias);
        assert_eq!(alloc.allocated_bytes(), 0);
    }

    #[test]
    fn custom_deleter_runs_once() {
        let alloc = HostBackedAllocator::new(64);
        let ptr = alloc.allocate(64).unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let deleter = move |_: DevicePtr| seen.set(seen.get() + 1);
        let handle = unsafe { DeviceHandle::from_raw(ptr, 64, deleter) };
        let copies: Vec<_> = (0..3).map(|_| handle.share()).collect();
        drop(handle);
        assert_eq!(calls.get(), 0);
        drop(copies);
        assert_eq!(calls.get(), 1);
        alloc.free(ptr);
    }

    #[test]
    fn failed_allocation_builds_nothing() {
        let alloc = Arc::new(HostBackedAllocator::new(16));
        let result = DeviceHandle::allocate(alloc.clone(), 32);
        assert!(result.unwrap_err().is_out_of_memory());
        assert_eq!(alloc.leak_count(), 0);
    }
}
