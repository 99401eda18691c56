//! Host/device coherence cache.
//!
//! A [`SyncCache`] pairs a home buffer with its device mirror and a shared
//! [`CoherenceCell`] recording which of the two is authoritative:
//!
//! | State | Home buffer | Device buffer |
//! |---|---|---|
//! | `HostOwned` | current | possibly stale |
//! | `DeviceOwned` | possibly stale | current |
//! | `Shared` | current | current |
//!
//! Device→host copies happen on `synchronize`/`get`/`get_mut` from
//! `DeviceOwned`; host→device copies happen in `prepare_for_invocation` from
//! `HostOwned`. Nothing else copies.

mod mirror;
mod state;
mod sync_cache;

pub use mirror::HostMirror;
pub use state::{CoherenceCell, CoherenceState, Transfer, Transition};
pub use sync_cache::{DropPolicy, HostRef, HostRefMut, SyncCache};
