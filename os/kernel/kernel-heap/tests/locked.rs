mod common;

use common::{Pool, TrackingPager};
use kernel_heap::{FreeRangeAllocator, Heap, LockedHeap, PAGE_SIZE};
use std::alloc::{GlobalAlloc, Layout};
use std::ptr;
use std::sync::Arc;
use std::thread;

type Locked = LockedHeap<FreeRangeAllocator<1024>, TrackingPager>;

fn locked(pool: &Pool) -> Locked {
    let heap = Heap::new(
        FreeRangeAllocator::new(pool.base(), pool.len()),
        TrackingPager::unlimited(),
    );
    LockedHeap::new(heap)
}

#[test]
fn empty_heap_refuses_allocations() {
    let heap = Locked::empty();
    assert!(!heap.is_initialized());
    assert!(heap.allocate(16).is_null());
    assert!(heap.duplicate_string(b"x").is_null());
    assert!(unsafe { heap.alloc(Layout::new::<u64>()) }.is_null());
    assert!(heap.with_heap(|_| ()).is_none());
    unsafe { heap.free(ptr::null_mut()) };
}

#[test]
fn init_installs_the_heap() {
    let pool = Pool::new(8);
    let heap = Locked::default();
    heap.init(Heap::new(
        FreeRangeAllocator::new(pool.base(), pool.len()),
        TrackingPager::unlimited(),
    ));
    assert!(heap.is_initialized());

    let p = heap.allocate(32);
    assert!(!p.is_null());
    unsafe { heap.free(p) };

    let inner = heap.take().unwrap();
    assert!(inner.range().is_fully_reclaimed());
    assert!(!heap.is_initialized());
}

#[test]
#[should_panic(expected = "initialized twice")]
fn double_init_is_fatal() {
    let pool = Pool::new(8);
    let heap = locked(&pool);
    heap.init(Heap::new(
        FreeRangeAllocator::new(pool.base(), pool.len()),
        TrackingPager::unlimited(),
    ));
}

#[test]
fn global_alloc_roundtrip() {
    let pool = Pool::new(32);
    let heap = locked(&pool);

    let layout = Layout::from_size_align(200, 64).unwrap();
    let p = unsafe { heap.alloc_zeroed(layout) };
    assert!(!p.is_null());
    assert_eq!(p.addr() % 64, 0);
    assert!(unsafe { std::slice::from_raw_parts(p, 200) }.iter().all(|&b| b == 0));
    unsafe { p.write_bytes(7, 200) };

    // Over-aligned reallocation keeps the layout's alignment.
    let q = unsafe { heap.realloc(p, layout, 5000) };
    assert!(!q.is_null());
    assert_eq!(q.addr() % 64, 0);
    let moved = unsafe { std::slice::from_raw_parts(q, 5000) };
    assert!(moved[..200].iter().all(|&b| b == 7));
    assert!(moved[200..].iter().all(|&b| b == 0));

    unsafe { heap.dealloc(q, Layout::from_size_align(5000, 64).unwrap()) };
    heap.with_heap(|h| assert!(h.range().is_fully_reclaimed()));
}

#[test]
fn global_alloc_rejects_alignment_above_page() {
    let pool = Pool::new(8);
    let heap = locked(&pool);
    let layout = Layout::from_size_align(8, 2 * PAGE_SIZE).unwrap();
    assert!(unsafe { heap.alloc(layout) }.is_null());
    assert!(unsafe { heap.realloc(ptr::null_mut(), layout, 16) }.is_null());
    heap.with_heap(|h| assert_eq!(h.pager().map_calls, 0));
}

#[test]
fn concurrent_allocations_are_serialized() {
    let pool = Pool::new(1024);
    let heap = Arc::new(locked(&pool));

    let workers: Vec<_> = (0..4u8)
        .map(|t| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || {
                for round in 0..100 {
                    let size = 1 + (round * 37) % 3000;
                    let p = heap.allocate(size);
                    assert!(!p.is_null());
                    unsafe { p.write_bytes(t, size) };
                    let p = unsafe { heap.reallocate(p, size + 100) };
                    let data = unsafe { std::slice::from_raw_parts(p, size) };
                    assert!(data.iter().all(|&b| b == t));
                    unsafe { heap.free(p) };
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    heap.with_heap(|h| {
        assert!(h.range().is_fully_reclaimed());
        assert_eq!(h.pager().mapped_pages(), 0);
    });
}
