//! Tests for the device allocator trait and `HostBackedAllocator`.

use super::*;

#[test]
fn allocate_and_free_all_returns_zero() {
    let alloc = HostBackedAllocator::new(4096);
    let mut ptrs = Vec::new();
    for _ in 0..8 {
        ptrs.push(alloc.allocate(512).unwrap());
    }
    assert_eq!(alloc.allocated_bytes(), 4096);
    for p in ptrs {
        alloc.free(p);
    }
    assert_eq!(alloc.allocated_bytes(), 0);
    assert_eq!(alloc.leak_count(), 0);
}

#[test]
fn beyond_capacity_returns_out_of_memory() {
    let alloc = HostBackedAllocator::new(1024);
    let _a = alloc.allocate(512).unwrap();
    let result = alloc.allocate(1024);
    assert_eq!(
        result,
        Err(CacheError::OutOfMemory {
            requested: 1024,
            available: 512
        })
    );
}

#[test]
fn allocations_are_zeroed_and_aligned() {
    let alloc = HostBackedAllocator::new(4096);
    let ptr = alloc.allocate(100).unwrap();
    assert_eq!(ptr.addr() % DEVICE_ALIGNMENT, 0);
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 100) };
    assert!(bytes.iter().all(|&b| b == 0));
    alloc.free(ptr);
}

#[test]
fn zero_sized_allocations_get_distinct_addresses() {
    let alloc = HostBackedAllocator::new(16);
    let a = alloc.allocate(0).unwrap();
    let b = alloc.allocate(0).unwrap();
    assert_ne!(a, b);
    assert_eq!(alloc.allocated_bytes(), 0);
    assert_eq!(alloc.leak_count(), 2);
    alloc.free(a);
    alloc.free(b);
    assert_eq!(alloc.leak_count(), 0);
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_panics() {
    let alloc = HostBackedAllocator::new(4096);
    let ptr = alloc.allocate(256).unwrap();
    alloc.free(ptr);
    alloc.free(ptr);
}

#[test]
fn stress_1000_cycles_zero_drift() {
    let alloc = HostBackedAllocator::new(1024 * 1024);
    for _ in 0..1000 {
        let p = alloc.allocate(1024).unwrap();
        alloc.free(p);
    }
    assert_eq!(alloc.allocated_bytes(), 0);
    assert_eq!(alloc.leak_count(), 0);
}

#[test]
fn device_ptr_rejects_null() {
    assert!(DevicePtr::new(std::ptr::null_mut()).is_none());
}
