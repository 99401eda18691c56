//! Coherence state machine.
//!
//! Transitions are pure: each trigger maps the current state to a
//! [`Transition`] naming the next state and the copy, if any, that must run
//! before it takes effect. The cache applies them.

use std::cell::{Cell, RefCell};
use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::telemetry::TransferStats;

/// Which physical buffer holds the authoritative bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceState {
    /// The home buffer is current; the device copy may be stale.
    HostOwned,
    /// An invocation may have written the device copy; the home buffer may be
    /// stale.
    DeviceOwned,
    /// Both buffers hold identical bytes.
    Shared,
}

impl CoherenceState {
    /// The home buffer holds the authoritative bytes.
    pub fn is_host_current(self) -> bool {
        matches!(self, Self::HostOwned | Self::Shared)
    }

    pub fn is_device_current(self) -> bool {
        matches!(self, Self::DeviceOwned | Self::Shared)
    }

    /// The home buffer was written through a path the cache does not see.
    pub fn on_refresh(self) -> Transition {
        Transition::to(Self::HostOwned)
    }

    pub fn on_synchronize(self, mirrored: bool) -> Transition {
        if mirrored && !self.is_host_current() {
            Transition::copy(Self::Shared, Transfer::DeviceToHost)
        } else {
            Transition::to(self)
        }
    }

    /// Read-only host access. Leaves `Shared` alone.
    pub fn on_read(self, mirrored: bool) -> Transition {
        self.on_synchronize(mirrored)
    }

    /// Mutable host access: sync, then the host copy becomes authoritative.
    /// Without a mirror there is only one buffer and nothing changes.
    pub fn on_write(self, mirrored: bool) -> Transition {
        if !mirrored {
            return Transition::to(self);
        }
        Transition {
            next: Self::HostOwned,
            ..self.on_synchronize(true)
        }
    }

    /// An accelerator invocation is about to consume (and presumably dirty)
    /// the device copy.
    pub fn on_invocation(self, mirrored: bool) -> Transition {
        if mirrored && !self.is_device_current() {
            Transition::copy(Self::DeviceOwned, Transfer::HostToDevice)
        } else {
            Transition::to(Self::DeviceOwned)
        }
    }
}

impl fmt::Display for CoherenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostOwned => write!(f, "host-owned"),
            Self::DeviceOwned => write!(f, "device-owned"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

/// Direction of a bulk copy across the host/device boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transfer {
    DeviceToHost,
    HostToDevice,
}

impl Transfer {
    /// Label used for metrics and spans.
    pub fn label(self) -> &'static str {
        match self {
            Self::DeviceToHost => "to_host",
            Self::HostToDevice => "to_device",
        }
    }
}

/// Outcome of a trigger: the copy to perform (if any), then the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Transition {
    pub next: CoherenceState,
    pub transfer: Option<Transfer>,
}

impl Transition {
    const fn to(next: CoherenceState) -> Self {
        Self {
            next,
            transfer: None,
        }
    }

    const fn copy(next: CoherenceState, transfer: Transfer) -> Self {
        Self {
            next,
            transfer: Some(transfer),
        }
    }
}

/// State shared by every alias of one home/device buffer pair.
///
/// Besides the coherence state it carries the borrow flag for outstanding
/// host views and the pair's transfer counters.
#[derive(Debug)]
pub struct CoherenceCell {
    state: Cell<CoherenceState>,
    views: RefCell<()>,
    stats: TransferStats,
}

impl CoherenceCell {
    pub fn new(initial: CoherenceState) -> Self {
        Self {
            state: Cell::new(initial),
            views: RefCell::new(()),
            stats: TransferStats::default(),
        }
    }

    pub fn get(&self) -> CoherenceState {
        self.state.get()
    }

    pub(crate) fn set(&self, next: CoherenceState) {
        let prev = self.state.replace(next);
        if prev != next {
            trace!(from = %prev, to = %next, "coherence transition");
        }
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub(crate) fn views(&self) -> &RefCell<()> {
        &self.views
    }
}

#[cfg(test)]
mod tests {
    use super::CoherenceState::*;
    use super::*;

    const ALL: [CoherenceState; 3] = [HostOwned, DeviceOwned, Shared];

    #[test]
    fn refresh_always_marks_host_owned_without_copy() {
        for state in ALL {
            assert_eq!(state.on_refresh(), Transition::to(HostOwned));
        }
    }

    #[test]
    fn synchronize_copies_only_from_device_owned() {
        assert_eq!(
            DeviceOwned.on_synchronize(true),
            Transition::copy(Shared, Transfer::DeviceToHost)
        );
        assert_eq!(HostOwned.on_synchronize(true), Transition::to(HostOwned));
        assert_eq!(Shared.on_synchronize(true), Transition::to(Shared));
    }

    #[test]
    fn synchronize_without_mirror_is_inert() {
        for state in ALL {
            assert_eq!(state.on_synchronize(false), Transition::to(state));
        }
    }

    #[test]
    fn synchronize_twice_copies_once() {
        let first = DeviceOwned.on_synchronize(true);
        let second = first.next.on_synchronize(true);
        assert!(first.transfer.is_some());
        assert!(second.transfer.is_none());
    }

    #[test]
    fn write_syncs_then_claims_host() {
        assert_eq!(
            DeviceOwned.on_write(true),
            Transition::copy(HostOwned, Transfer::DeviceToHost)
        );
        assert_eq!(Shared.on_write(true), Transition::to(HostOwned));
        assert_eq!(HostOwned.on_write(true), Transition::to(HostOwned));
        assert_eq!(DeviceOwned.on_write(false), Transition::to(DeviceOwned));
    }

    #[test]
    fn read_leaves_shared_shared() {
        assert_eq!(Shared.on_read(true), Transition::to(Shared));
        assert_eq!(DeviceOwned.on_read(true).next, Shared);
    }

    #[test]
    fn invocation_pushes_only_from_host_owned() {
        assert_eq!(
            HostOwned.on_invocation(true),
            Transition::copy(DeviceOwned, Transfer::HostToDevice)
        );
        assert_eq!(Shared.on_invocation(true), Transition::to(DeviceOwned));
        assert_eq!(DeviceOwned.on_invocation(true), Transition::to(DeviceOwned));
        assert_eq!(HostOwned.on_invocation(false), Transition::to(DeviceOwned));
    }

    #[test]
    fn currency_helpers_match_states() {
        assert!(Shared.is_host_current() && Shared.is_device_current());
        assert!(HostOwned.is_host_current());
        assert!(!HostOwned.is_device_current());
        assert!(!DeviceOwned.is_host_current());
        assert!(DeviceOwned.is_device_current());
    }

    #[test]
    fn cell_is_shared_not_copied() {
        let cell = std::rc::Rc::new(CoherenceCell::new(HostOwned));
        let alias = cell.clone();
        alias.set(DeviceOwned);
        assert_eq!(cell.get(), DeviceOwned);
    }
}
