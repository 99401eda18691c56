//! Fuzz target for coherence bookkeeping.
//!
//! Drives two aliases of one buffer pair through arbitrary operation
//! sequences and checks every observable against a reference model: state,
//! bytes seen by the host, bytes seen by the device, and copy counts.

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mirrorsync::{
    ArgumentList, CoherenceState, DeviceAllocator, DeviceView, HostBackedAllocator, SyncCache,
};

const LEN: usize = 16;

#[derive(Debug, Arbitrary)]
enum Op {
    Refresh { alias: bool },
    Synchronize { alias: bool },
    Read { alias: bool },
    Write { alias: bool, index: u8, value: u8 },
    Invoke { alias: bool, fill: u8 },
}

struct Model {
    state: CoherenceState,
    host: [u8; LEN],
    device: [u8; LEN],
    to_host: u64,
    to_device: u64,
}

impl Model {
    fn synchronize(&mut self) {
        if self.state == CoherenceState::DeviceOwned {
            self.host = self.device;
            self.to_host += 1;
            self.state = CoherenceState::Shared;
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let alloc: Arc<dyn DeviceAllocator> = Arc::new(HostBackedAllocator::new(4096));
    let mut home = [0u8; LEN];
    let a = SyncCache::allocate(&alloc, &mut home).unwrap();
    let b = a.clone();
    let mut model = Model {
        state: CoherenceState::HostOwned,
        host: [0; LEN],
        device: [0; LEN],
        to_host: 0,
        to_device: 0,
    };

    for op in ops {
        match op {
            Op::Refresh { alias } => {
                let cache = if alias { &b } else { &a };
                cache.refresh();
                model.state = CoherenceState::HostOwned;
            }
            Op::Synchronize { alias } => {
                let cache = if alias { &b } else { &a };
                cache.synchronize();
                model.synchronize();
                assert_eq!(model.host, model.device);
            }
            Op::Read { alias } => {
                let cache = if alias { &b } else { &a };
                let seen = cache.get().to_vec();
                model.synchronize();
                assert_eq!(seen, model.host);
            }
            Op::Write { alias, index, value } => {
                let cache = if alias { &b } else { &a };
                cache.get_mut()[index as usize % LEN] = value;
                model.synchronize();
                model.state = CoherenceState::HostOwned;
                model.host[index as usize % LEN] = value;
            }
            Op::Invoke { alias, fill } => {
                let cache = if alias { &b } else { &a };
                let mut args = ArgumentList::new();
                cache.prepare_for_invocation(&mut args);
                if model.state == CoherenceState::HostOwned {
                    model.device = model.host;
                    model.to_device += 1;
                }
                model.state = CoherenceState::DeviceOwned;

                let mut view = DeviceView::<u8>::from_pointer(args.pointer(0).unwrap());
                let device = unsafe { view.as_mut_slice(LEN) }.unwrap();
                assert_eq!(device, &model.device);
                device.fill(fill);
                model.device = [fill; LEN];
            }
        }

        assert_eq!(a.state(), model.state);
        let stats = b.transfer_stats();
        assert_eq!(stats.to_host, model.to_host);
        assert_eq!(stats.to_device, model.to_device);
    }
});
