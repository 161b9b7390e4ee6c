//! Allocation tracking for queue teardown.
//!
//! A counting global allocator tracks live allocations of a marker size that
//! nothing but the test packets uses, so clearing a queue can be checked for
//! leaks without interference from the test harness.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::time::Duration;

use packet::{Packet, PacketQueue};

/// Payload size used only by the tracked packets.
const MARKER_LEN: usize = 3071;

static LIVE_MARKED: AtomicIsize = AtomicIsize::new(0);

struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() && layout.size() == MARKER_LEN {
            LIVE_MARKED.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == MARKER_LEN {
            LIVE_MARKED.fetch_sub(1, Ordering::SeqCst);
        }
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn live() -> isize {
    LIVE_MARKED.load(Ordering::SeqCst)
}

#[test]
fn test_clear_releases_every_packet() {
    let queue = PacketQueue::with_capacity(4);
    let baseline = live();

    for _ in 0..4 {
        let packet = Packet::new(MARKER_LEN).unwrap();
        queue.enqueue(packet, Duration::ZERO).unwrap();
    }
    assert_eq!(live() - baseline, 4);

    // A refused packet comes back to the caller and is released by it.
    let rejected = queue
        .enqueue(Packet::new(MARKER_LEN).unwrap(), Duration::ZERO)
        .unwrap_err();
    assert_eq!(live() - baseline, 5);
    drop(rejected);
    assert_eq!(live() - baseline, 4);

    assert_eq!(queue.clear(), 4);
    assert!(queue.is_empty());
    assert_eq!(live(), baseline);

    // Clearing an empty queue is a no-op.
    assert_eq!(queue.clear(), 0);
    assert_eq!(live(), baseline);
}
