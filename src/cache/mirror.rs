//! Non-owning reference to the home buffer and the bounded copies between it
//! and the device buffer.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use bytemuck::Pod;

use crate::device::DeviceHandle;

/// `(pointer, byte length)` of externally-owned home memory.
#[derive(Debug, Clone, Copy)]
pub struct HostMirror<'a> {
    ptr: NonNull<u8>,
    len: usize,
    _home: PhantomData<&'a mut [u8]>,
}

impl<'a> HostMirror<'a> {
    pub fn new<T: Pod>(home: &'a mut [T]) -> Self {
        let bytes: &'a mut [u8] = bytemuck::cast_slice_mut(home);
        let len = bytes.len();
        Self {
            ptr: NonNull::from(bytes).cast(),
            len,
            _home: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `ptr` must address `len` bytes that stay valid for reads and writes
    /// for `'a` and are not accessed elsewhere while a copy runs.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            _home: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrite `count` home bytes with the device buffer's contents.
    pub(crate) fn pull_from(&self, device: &DeviceHandle, count: usize) {
        let src = device.ptr().as_non_null();
        copy_bounded(src, device.size(), self.ptr, self.len, count);
    }

    /// Overwrite `count` device bytes with the home buffer's contents.
    pub(crate) fn push_to(&self, device: &DeviceHandle, count: usize) {
        let dst = device.ptr().as_non_null();
        copy_bounded(self.ptr, self.len, dst, device.size(), count);
    }
}

/// Copy exactly `count` bytes, asserting both sides hold that many.
fn copy_bounded(src: NonNull<u8>, src_len: usize, dst: NonNull<u8>, dst_len: usize, count: usize) {
    assert!(
        count <= src_len && count <= dst_len,
        "copy of {count} bytes exceeds buffer bounds (source {src_len}, destination {dst_len})"
    );
    if count == 0 {
        return;
    }
    // SAFETY: both regions hold at least `count` bytes (checked above, and
    // guaranteed by the constructors of `HostMirror` and `DeviceHandle`); the
    // home and device buffers are distinct allocations.
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count) };
}
