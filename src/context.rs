//! Entry point bundling a device allocator with cache defaults.

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::debug;

use crate::cache::{DropPolicy, SyncCache};
use crate::config::CacheConfig;
use crate::device::{DeviceAllocator, HostBackedAllocator};
use crate::error::Result;
use crate::telemetry::{allocation_span, SpanExt};

/// Builds [`SyncCache`]s against one allocator.
#[derive(Clone)]
pub struct MirrorContext {
    allocator: Arc<dyn DeviceAllocator>,
    drop_policy: DropPolicy,
}

impl MirrorContext {
    /// Context over a [`HostBackedAllocator`] sized by `config`.
    pub fn new(config: &CacheConfig) -> Self {
        let allocator = Arc::new(HostBackedAllocator::new(config.device_capacity));
        Self::with_allocator(allocator)
            .drop_policy(config.drop_policy)
    }

    pub fn with_allocator(allocator: Arc<dyn DeviceAllocator>) -> Self {
        Self {
            allocator,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Drop policy applied to every cache this context builds.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Allocate a device mirror for `home`.
    pub fn mirror<'a, T: Pod>(&self, home: &'a mut [T]) -> Result<SyncCache<'a, T>> {
        let span = allocation_span(std::mem::size_of_val(home), self.allocator.name());
        let _guard = span.enter();
        let result = SyncCache::allocate(&self.allocator, home);
        span.record_result(&result);
        let cache = result?;
        debug!(
            len = cache.len(),
            bytes = cache.size_bytes(),
            "mirrored home buffer"
        );
        Ok(cache.with_drop_policy(self.drop_policy))
    }

    /// Allocate a device-only buffer of `len` elements.
    pub fn device_buffer<'a, T: Pod>(&self, len: usize) -> Result<SyncCache<'a, T>> {
        let bytes = len.saturating_mul(std::mem::size_of::<T>());
        let span = allocation_span(bytes, self.allocator.name());
        let _guard = span.enter();
        let result = SyncCache::allocate_device_only(&self.allocator, len);
        span.record_result(&result);
        Ok(result?.with_drop_policy(self.drop_policy))
    }

    pub fn allocator(&self) -> &Arc<dyn DeviceAllocator> {
        &self.allocator
    }

    /// Bytes currently allocated on the device.
    pub fn allocated_bytes(&self) -> usize {
        self.allocator.allocated_bytes()
    }
}

impl fmt::Debug for MirrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorContext")
            .field("allocator", &self.allocator.name())
            .field("allocated_bytes", &self.allocated_bytes())
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}
