//! mirrorsync
//!
//! Coherence cache between a home buffer in ordinary memory and its mirror
//! on an accelerator device.
//!
//! # Model
//!
//! - Ordinary code reads and writes the home buffer through
//!   [`SyncCache::get`] / [`SyncCache::get_mut`].
//! - Accelerator code only ever sees the device buffer, handed to it as a bare
//!   pointer by [`SyncCache::prepare_for_invocation`].
//! - A three-state [`CoherenceState`] shared by every alias decides when a copy
//!   is needed. Copies are lazy and happen only on edges where one side is
//!   known to be stale.
//! - The device buffer is reference counted; the last alias releases it.
//!
//! # Threading
//!
//! Caches are `!Send`. Aliases of one buffer pair live on one thread.

pub mod cache;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod marshal;
pub mod telemetry;

pub use cache::{CoherenceState, DropPolicy, HostRef, HostRefMut, SyncCache};
pub use config::CacheConfig;
pub use context::MirrorContext;
pub use device::{DeviceAllocator, DeviceHandle, DevicePtr, DeviceView, HostBackedAllocator};
pub use error::CacheError;
pub use marshal::{ArgumentList, ArgumentSink, KernelArg, KernelArgument};
