//! Device memory collaborators.
//!
//! Allocation and release of accelerator memory, the shared handle that ties
//! a buffer's lifetime to its last owner, and the bare view accelerator code
//! rebuilds from a marshalled pointer.

mod allocator;
mod handle;
mod view;

pub use allocator::{DeviceAllocator, DevicePtr, HostBackedAllocator, DEVICE_ALIGNMENT};
pub use handle::{Deleter, DeviceHandle};
pub use view::DeviceView;
