//! Observes the software interrupt flag; keep this the only test in the binary.

mod common;

use common::{Pool, TrackingPager};
use kernel_heap::{FreeRangeAllocator, Heap, LockedHeap};
use kernel_sync::irq;

#[test]
fn heap_runs_with_interrupts_masked() {
    let pool = Pool::new(8);
    let heap = LockedHeap::new(Heap::new(
        FreeRangeAllocator::<16>::new(pool.base(), pool.len()),
        TrackingPager::unlimited(),
    ));

    assert!(irq::interrupts_enabled());
    let seen = heap.with_heap(|_| irq::interrupts_enabled());
    assert_eq!(seen, Some(false));
    assert!(irq::interrupts_enabled());

    // Callers that already masked interrupts keep them masked.
    irq::disable_interrupts();
    let p = heap.allocate(64);
    assert!(!irq::interrupts_enabled());
    irq::enable_interrupts();

    unsafe { heap.free(p) };
    assert!(irq::interrupts_enabled());
}
