//! The coherence cache over one home/device buffer pair.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::rc::Rc;
use std::slice;
use std::sync::Arc;

use bytemuck::Pod;
use serde::Deserialize;

use super::mirror::HostMirror;
use super::state::{CoherenceCell, CoherenceState, Transfer, Transition};
use crate::device::{DeviceAllocator, DeviceHandle, DevicePtr};
use crate::error::{CacheError, Result};
use crate::marshal::ArgumentSink;
use crate::telemetry::{transfer_span, TransferSnapshot};

/// What a cache does with unsynchronized device data when its last owner is
/// dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Release the device buffer as is. The home buffer keeps whatever it
    /// held, possibly stale.
    #[default]
    Discard,
    /// The last owner calls `synchronize()` before releasing.
    SynchronizeLast,
}

/// Tracks which of a home buffer and its device mirror is authoritative and
/// copies between them only on the edges where staleness is certain.
///
/// Cloning aliases the device buffer and the coherence state; every clone sees
/// the same state. The type is `!Send`: aliases must stay on one thread.
///
/// Host views returned by [`get`](Self::get) and [`get_mut`](Self::get_mut)
/// follow `RefCell` rules across all aliases. Overlapping a mutable view with
/// any other view, or marshalling the buffer while a view is alive, panics.
pub struct SyncCache<'a, T: Pod> {
    device: DeviceHandle,
    coherence: Rc<CoherenceCell>,
    home: Option<HostMirror<'a>>,
    len: usize,
    drop_policy: DropPolicy,
    _elem: PhantomData<T>,
}

impl<'a, T: Pod> SyncCache<'a, T> {
    /// Pair a device buffer with a home slice. Starts `HostOwned`.
    ///
    /// Panics if the slice and the device buffer differ in byte size.
    pub fn new(device: DeviceHandle, home: &'a mut [T]) -> Self {
        let len = home.len();
        Self::with_mirror(device, HostMirror::new(home), len)
    }

    /// Pair a device buffer with raw home memory owned elsewhere.
    ///
    /// # Safety
    ///
    /// `home` must address `len` elements valid for reads and writes for
    /// `'a`. Writes made directly through it must be announced with
    /// [`refresh`](Self::refresh).
    pub unsafe fn from_raw_parts(device: DeviceHandle, home: NonNull<T>, len: usize) -> Self {
        let bytes = len * mem::size_of::<T>();
        let mirror = unsafe { HostMirror::from_raw_parts(home.cast(), bytes) };
        Self::with_mirror(device, mirror, len)
    }

    fn with_mirror(device: DeviceHandle, home: HostMirror<'a>, len: usize) -> Self {
        assert_eq!(
            home.len(),
            device.size(),
            "home buffer is {} bytes but device buffer is {} bytes",
            home.len(),
            device.size()
        );
        assert_aligned::<T>(device.ptr());
        Self::assemble(device, Some(home), len, CoherenceState::HostOwned)
    }

    /// Wrap a device buffer with no home mirror. Starts `DeviceOwned`.
    pub fn device_only(device: DeviceHandle) -> Self {
        let elem = mem::size_of::<T>();
        let len = device.size().checked_div(elem).unwrap_or(0);
        assert_eq!(
            len * elem,
            device.size(),
            "device buffer of {} bytes is not a whole number of {elem}-byte elements",
            device.size()
        );
        assert_aligned::<T>(device.ptr());
        Self::assemble(device, None, len, CoherenceState::DeviceOwned)
    }

    fn assemble(
        device: DeviceHandle,
        home: Option<HostMirror<'a>>,
        len: usize,
        initial: CoherenceState,
    ) -> Self {
        Self {
            device,
            coherence: Rc::new(CoherenceCell::new(initial)),
            home,
            len,
            drop_policy: DropPolicy::default(),
            _elem: PhantomData,
        }
    }

    /// Allocate a device mirror sized to `home`.
    pub fn allocate(allocator: &Arc<dyn DeviceAllocator>, home: &'a mut [T]) -> Result<Self> {
        let device = DeviceHandle::allocate(Arc::clone(allocator), mem::size_of_val(home))?;
        Ok(Self::new(device, home))
    }

    /// Allocate a device-only buffer of `len` elements.
    pub fn allocate_device_only(allocator: &Arc<dyn DeviceAllocator>, len: usize) -> Result<Self> {
        let size = len.checked_mul(mem::size_of::<T>()).ok_or_else(|| {
            CacheError::AllocationFailed(format!("{len} elements overflow the address space"))
        })?;
        let device = DeviceHandle::allocate(Arc::clone(allocator), size)?;
        Ok(Self::device_only(device))
    }

    pub fn with_drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Declare that the home buffer was written behind the cache's back.
    pub fn refresh(&self) {
        self.apply(self.state().on_refresh());
    }

    /// Copy device bytes home if the device copy is authoritative.
    pub fn synchronize(&self) {
        self.apply(self.state().on_synchronize(self.has_mirror()));
    }

    /// True when this is the sole owner of the device buffer.
    pub fn is_last(&self) -> bool {
        self.device.is_unique()
    }

    /// Read-only view of current data: the home buffer (synchronized first)
    /// or, without a mirror, the device buffer.
    pub fn get(&self) -> HostRef<'_, T> {
        let ptr = self.as_ptr();
        let borrow = self
            .coherence
            .views()
            .try_borrow()
            .unwrap_or_else(|_| panic!("buffer is already mutably borrowed through an alias"));
        // SAFETY: `ptr` addresses `len` initialised elements of a live buffer,
        // and the shared borrow flag excludes writers for the view's lifetime.
        let data = unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) };
        HostRef {
            data,
            _borrow: borrow,
        }
    }

    /// Mutable view of current data. With a mirror the home buffer becomes
    /// authoritative.
    pub fn get_mut(&self) -> HostRefMut<'_, T> {
        let ptr = self.as_mut_ptr();
        let borrow = self
            .coherence
            .views()
            .try_borrow_mut()
            .unwrap_or_else(|_| panic!("buffer is already borrowed through an alias"));
        // SAFETY: as in `get`; the exclusive borrow flag excludes every other
        // view of this buffer pair.
        let data = unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.len) };
        HostRefMut {
            data,
            _borrow: borrow,
        }
    }

    /// Raw read pointer with the transitions of [`get`](Self::get). Not
    /// tracked by the view borrow flag.
    pub fn as_ptr(&self) -> NonNull<T> {
        self.apply(self.state().on_read(self.has_mirror()));
        self.data_ptr()
    }

    /// Raw write pointer with the transitions of [`get_mut`](Self::get_mut).
    /// Not tracked by the view borrow flag.
    pub fn as_mut_ptr(&self) -> NonNull<T> {
        self.apply(self.state().on_write(self.has_mirror()));
        self.data_ptr()
    }

    /// Called by the marshalling layer right before an accelerator
    /// invocation consumes this buffer. Pushes host data to the device if the
    /// host copy is authoritative, marks the device copy authoritative, and
    /// appends the bare device pointer to `args`.
    pub fn prepare_for_invocation<S: ArgumentSink + ?Sized>(&self, args: &mut S) {
        assert!(
            self.coherence.views().try_borrow_mut().is_ok(),
            "cannot marshal a buffer while a host view of it is alive"
        );
        self.apply(self.state().on_invocation(self.has_mirror()));
        args.append_pointer(self.device.ptr());
    }

    pub fn state(&self) -> CoherenceState {
        self.coherence.get()
    }

    pub fn has_mirror(&self) -> bool {
        self.home.is_some()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of each buffer in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * mem::size_of::<T>()
    }

    pub fn device_ptr(&self) -> DevicePtr {
        self.device.ptr()
    }

    /// Number of aliases sharing the device buffer.
    pub fn use_count(&self) -> usize {
        self.device.use_count()
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// Copies performed so far for this buffer pair, across all aliases.
    pub fn transfer_stats(&self) -> TransferSnapshot {
        self.coherence.stats().snapshot()
    }

    fn data_ptr(&self) -> NonNull<T> {
        match &self.home {
            Some(home) => home.as_ptr().cast(),
            None => self.device.ptr().cast(),
        }
    }

    fn apply(&self, transition: Transition) {
        if let Some(direction) = transition.transfer {
            self.transfer(direction);
        }
        self.coherence.set(transition.next);
    }

    fn transfer(&self, direction: Transfer) {
        let Some(home) = &self.home else {
            unreachable!(
                "{} transfer requested for a buffer without a home mirror",
                direction.label()
            );
        };
        assert!(
            self.coherence.views().try_borrow_mut().is_ok(),
            "cannot copy {} while a host view is alive",
            direction.label()
        );
        let bytes = self.size_bytes();
        let _span = transfer_span(direction, bytes).entered();
        match direction {
            Transfer::DeviceToHost => home.pull_from(&self.device, bytes),
            Transfer::HostToDevice => home.push_to(&self.device, bytes),
        }
        self.coherence.stats().record(direction, bytes);
    }
}

fn assert_aligned<T>(ptr: DevicePtr) {
    assert_eq!(
        ptr.addr() % mem::align_of::<T>(),
        0,
        "device buffer {:#x} is misaligned for the element type",
        ptr.addr()
    );
}

impl<T: Pod> Clone for SyncCache<'_, T> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.share(),
            coherence: Rc::clone(&self.coherence),
            home: self.home,
            len: self.len,
            drop_policy: self.drop_policy,
            _elem: PhantomData,
        }
    }
}

impl<T: Pod> Drop for SyncCache<'_, T> {
    fn drop(&mut self) {
        if self.drop_policy == DropPolicy::SynchronizeLast && self.is_last() {
            self.synchronize();
        }
    }
}

impl<T: Pod> fmt::Debug for SyncCache<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCache")
            .field("state", &self.state())
            .field("len", &self.len)
            .field("mirrored", &self.has_mirror())
            .field("device", &self.device)
            .finish()
    }
}

/// Shared view of a cache's current data.
pub struct HostRef<'c, T> {
    data: &'c [T],
    _borrow: Ref<'c, ()>,
}

impl<T> Deref for HostRef<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

/// Exclusive view of a cache's current data.
pub struct HostRefMut<'c, T> {
    data: &'c mut [T],
    _borrow: RefMut<'c, ()>,
}

impl<T> Deref for HostRefMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T> DerefMut for HostRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data
    }
}

#[cfg(test)]
#[path = "sync_cache_tests.rs"]
mod tests;
