//! # Shell Bridge Packet Library
//!
//! This crate provides the packet-level building blocks shared between the
//! transport and the shell bridge.
//!
//! ## Overview
//!
//! - **Packets**: Length-tagged payloads with a split offset so one packet
//!   can be drained across several scheduling turns
//! - **Packet Queue**: A small bounded FIFO with blocking-with-timeout
//!   enqueue and dequeue, the hand-off point between threads
//! - **Checksum**: The transport's byte-sum payload checksum
//!
//! ## Architecture
//!
//! ```text
//! transport receive ──► PacketQueue ──► bridging worker
//!                       (4 slots)       (drains via split offset)
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use packet::{Packet, PacketQueue};
//!
//! let queue = PacketQueue::new();
//! let packet = Packet::from_slice(b"ls\n").unwrap();
//! assert_eq!(packet.checksum(), 233);
//!
//! queue.enqueue(packet, Duration::ZERO).unwrap();
//! let mut packet = queue.dequeue(Duration::from_millis(20)).unwrap();
//! packet.consume(2);
//! assert_eq!(packet.unconsumed(), b"\n");
//! ```
//!
//! ## Modules
//!
//! - [`packet`]: Packet type and checksum
//! - [`queue`]: Bounded packet queue
//! - [`error`]: Error types

pub mod error;
pub mod packet;
pub mod queue;

pub use error::{PacketError, Result};
pub use packet::{checksum, Packet, MAX_PAYLOAD};
pub use queue::{PacketQueue, DEFAULT_QUEUE_CAPACITY};
