// Copyright 2024-2026 mirrorsync Contributors
// Licensed under the Apache License, Version 2.0

//! Device-side view of a marshalled buffer.
//!
//! Accelerator code never sees a [`SyncCache`](crate::SyncCache); it receives
//! the bare pointer appended by the marshalling hook and rebuilds a
//! `DeviceView` from it.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use bytemuck::Pod;

use super::allocator::DevicePtr;

/// Nullable typed pointer into device memory.
pub struct DeviceView<T> {
    ptr: Option<NonNull<T>>,
    _elem: PhantomData<T>,
}

impl<T> Clone for DeviceView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceView<T> {}

impl<T: Pod> DeviceView<T> {
    pub const fn null() -> Self {
        Self {
            ptr: None,
            _elem: PhantomData,
        }
    }

    /// Rebuild a view from a marshalled pointer.
    pub fn from_pointer(ptr: DevicePtr) -> Self {
        assert_eq!(
            ptr.addr() % mem::align_of::<T>(),
            0,
            "device pointer {:#x} is misaligned for the element type",
            ptr.addr()
        );
        Self {
            ptr: Some(ptr.cast()),
            _elem: PhantomData,
        }
    }

    pub fn get(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Point the view somewhere else, or at nothing.
    pub fn reset(&mut self, ptr: Option<DevicePtr>) {
        *self = ptr.map_or_else(Self::null, Self::from_pointer);
    }

    /// # Safety
    ///
    /// The view must address at least `len` initialised elements that are
    /// not written through any other path for `'k`.
    pub unsafe fn as_slice<'k>(&self, len: usize) -> Option<&'k [T]> {
        let ptr = self.ptr?;
        Some(unsafe { slice::from_raw_parts(ptr.as_ptr(), len) })
    }

    /// # Safety
    ///
    /// The view must address at least `len` elements that are not accessed
    /// through any other path for `'k`.
    pub unsafe fn as_mut_slice<'k>(&mut self, len: usize) -> Option<&'k mut [T]> {
        let ptr = self.ptr?;
        Some(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }
}

impl<T> fmt::Debug for DeviceView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "DeviceView({:p})", p),
            None => write!(f, "DeviceView(null)"),
        }
    }
}
