//! Marshalling of invocation arguments.
//!
//! The marshalling layer walks the arguments of a pending accelerator
//! invocation and asks each one to append itself to an [`ArgumentSink`].
//! Caches append only their raw device pointer; scalars append their bytes.

use bytemuck::Pod;

use crate::cache::SyncCache;
use crate::device::DevicePtr;

/// Outgoing argument stream of a pending invocation.
pub trait ArgumentSink {
    fn append_pointer(&mut self, ptr: DevicePtr);
    fn append_scalar(&mut self, bytes: &[u8]);
}

/// A value that can be passed to an accelerator invocation.
pub trait KernelArgument {
    fn marshal(&self, args: &mut dyn ArgumentSink);
}

impl<T: Pod> KernelArgument for SyncCache<'_, T> {
    fn marshal(&self, args: &mut dyn ArgumentSink) {
        self.prepare_for_invocation(args);
    }
}

macro_rules! scalar_argument {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KernelArgument for $ty {
                fn marshal(&self, args: &mut dyn ArgumentSink) {
                    args.append_scalar(bytemuck::bytes_of(self));
                }
            }
        )*
    };
}

scalar_argument!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// One recorded argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelArg {
    Pointer(DevicePtr),
    Scalar(Vec<u8>),
}

/// In-memory argument stream.
#[derive(Debug, Default)]
pub struct ArgumentList {
    args: Vec<KernelArg>,
}

impl ArgumentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marshal `arg` onto the end of the list.
    pub fn push(&mut self, arg: &dyn KernelArgument) -> &mut Self {
        arg.marshal(self);
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn as_slice(&self) -> &[KernelArg] {
        &self.args
    }

    /// The device pointer at `index`, if that argument is a pointer.
    pub fn pointer(&self, index: usize) -> Option<DevicePtr> {
        match self.args.get(index)? {
            KernelArg::Pointer(ptr) => Some(*ptr),
            KernelArg::Scalar(_) => None,
        }
    }

    /// The scalar at `index` decoded as `T`, if the sizes agree.
    pub fn scalar<T: Pod>(&self, index: usize) -> Option<T> {
        match self.args.get(index)? {
            KernelArg::Scalar(bytes) => bytemuck::try_pod_read_unaligned(bytes).ok(),
            KernelArg::Pointer(_) => None,
        }
    }

    pub fn clear(&mut self) {
        self.args.clear();
    }
}

impl ArgumentSink for ArgumentList {
    fn append_pointer(&mut self, ptr: DevicePtr) {
        self.args.push(KernelArg::Pointer(ptr));
    }

    fn append_scalar(&mut self, bytes: &[u8]) {
        self.args.push(KernelArg::Scalar(bytes.to_vec()));
    }
}
