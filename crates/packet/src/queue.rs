//! Bounded blocking queue of owned packets.
//!
//! The queue is the hand-off point between the transport's receiving path
//! and the bridging worker. Both ends block with a timeout: `enqueue` waits
//! for a free slot, `dequeue` waits for a packet. Ordering is strict FIFO.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::packet::Packet;

/// Default number of slots, matching the transport's receive window.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// A fixed-capacity FIFO of packets.
#[derive(Debug)]
pub struct PacketQueue {
    /// Queued packets, oldest first.
    slots: Mutex<VecDeque<Packet>>,
    /// Signalled when a packet is queued.
    not_empty: Condvar,
    /// Signalled when a slot is freed.
    not_full: Condvar,
    /// Maximum number of queued packets.
    capacity: usize,
}

impl PacketQueue {
    /// Creates a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a queue holding at most `capacity` packets.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the maximum number of queued packets.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of queued packets.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether no packet is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queues a packet, waiting up to `timeout` for a free slot.
    ///
    /// On timeout the packet is handed back in the error so the caller
    /// decides its fate.
    pub fn enqueue(&self, packet: Packet, timeout: Duration) -> Result<(), Packet> {
        let guard = self.lock();
        let (mut slots, _) = self
            .not_full
            .wait_timeout_while(guard, timeout, |slots| slots.len() >= self.capacity)
            .unwrap_or_else(PoisonError::into_inner);

        if slots.len() >= self.capacity {
            tracing::debug!(
                len = packet.capacity(),
                timeout_ms = timeout.as_millis() as u64,
                "Enqueue failed: queue full"
            );
            return Err(packet);
        }

        slots.push_back(packet);
        drop(slots);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Takes the oldest packet, waiting up to `timeout` for one to arrive.
    pub fn dequeue(&self, timeout: Duration) -> Option<Packet> {
        let guard = self.lock();
        let (mut slots, _) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |slots| slots.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        let packet = slots.pop_front();
        drop(slots);
        if packet.is_some() {
            self.not_full.notify_one();
        }
        packet
    }

    /// Drops every queued packet without blocking.
    ///
    /// Returns the number of packets destroyed.
    pub fn clear(&self) -> usize {
        let drained: Vec<Packet> = self.lock().drain(..).collect();
        let count = drained.len();
        drop(drained);

        if count > 0 {
            self.not_full.notify_all();
            tracing::debug!(count = count, "Cleared queued packets");
        }
        count
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
