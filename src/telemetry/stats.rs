//! Transfer counters.
//!
//! Each buffer pair keeps its own [`TransferStats`] so tests and callers can
//! observe exactly how many copies a sequence of operations caused. Every
//! copy is also reported to the `metrics` facade for process-wide export.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::cache::Transfer;

/// Point-in-time copy of a pair's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSnapshot {
    pub to_host: u64,
    pub to_host_bytes: u64,
    pub to_device: u64,
    pub to_device_bytes: u64,
}

impl TransferSnapshot {
    pub fn total_transfers(&self) -> u64 {
        self.to_host + self.to_device
    }

    pub fn total_bytes(&self) -> u64 {
        self.to_host_bytes + self.to_device_bytes
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Per-pair transfer counters. Single-threaded, like the cache that owns it.
#[derive(Debug, Default)]
pub struct TransferStats {
    to_host: Cell<u64>,
    to_host_bytes: Cell<u64>,
    to_device: Cell<u64>,
    to_device_bytes: Cell<u64>,
}

impl TransferStats {
    pub fn record(&self, direction: Transfer, bytes: usize) {
        let bytes = bytes as u64;
        let (count, total) = match direction {
            Transfer::DeviceToHost => (&self.to_host, &self.to_host_bytes),
            Transfer::HostToDevice => (&self.to_device, &self.to_device_bytes),
        };
        count.set(count.get() + 1);
        total.set(total.get() + bytes);

        metrics::counter!("mirrorsync_transfers_total", "direction" => direction.label())
            .increment(1);
        metrics::counter!("mirrorsync_transfer_bytes_total", "direction" => direction.label())
            .increment(bytes);
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            to_host: self.to_host.get(),
            to_host_bytes: self.to_host_bytes.get(),
            to_device: self.to_device.get(),
            to_device_bytes: self.to_device_bytes.get(),
        }
    }
}
