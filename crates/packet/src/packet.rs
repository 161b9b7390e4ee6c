//! Length-tagged packets with a built-in read cursor.
//!
//! # Layout
//!
//! A packet owns a payload of fixed capacity and a split offset marking the
//! next unconsumed byte. Draining a packet only moves the split offset
//! forward, so at any time:
//!
//! ```text
//! split_offset + remaining == capacity
//! ```
//!
//! The split offset is local bookkeeping. On the transport a packet is just
//! `{ length: u32, payload: [u8; length] }`.

use crate::error::{PacketError, Result};

/// Largest payload the transport carries in a single packet (256 KB).
pub const MAX_PAYLOAD: usize = 256 * 1024;

/// A single payload unit exchanged with the transport.
///
/// Packets are move-only: handing one to a queue or transport gives up
/// access to it, and every failed hand-off returns it to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet {
    /// The payload data, `capacity` bytes long.
    payload: Vec<u8>,
    /// Offset of the next unconsumed payload byte.
    split: usize,
}

impl Packet {
    /// Allocates a zero-filled packet with a payload of `len` bytes.
    ///
    /// Allocation failure is reported rather than aborting the process, so
    /// callers on the relay path can drop the offending data and carry on.
    pub fn new(len: usize) -> Result<Self> {
        if len > MAX_PAYLOAD {
            return Err(PacketError::TooLarge {
                len,
                max: MAX_PAYLOAD,
            });
        }

        let mut payload = Vec::new();
        if payload.try_reserve_exact(len).is_err() {
            tracing::error!(len = len, "No memory for new packet");
            return Err(PacketError::Allocation { len });
        }
        payload.resize(len, 0);

        Ok(Self { payload, split: 0 })
    }

    /// Allocates a packet holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut packet = Self::new(data.len())?;
        packet.payload.copy_from_slice(data);
        Ok(packet)
    }

    /// Returns the payload capacity fixed at creation.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    /// Returns the number of bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.split
    }

    /// Returns the offset of the next unconsumed byte.
    #[inline]
    pub fn split_offset(&self) -> usize {
        self.split
    }

    /// Returns whether every byte has been consumed.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.split == self.payload.len()
    }

    /// Returns the full payload, consumed bytes included.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the full payload for filling in place.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Returns the bytes from the split offset to the end.
    pub fn unconsumed(&self) -> &[u8] {
        &self.payload[self.split..]
    }

    /// Marks up to `n` bytes as consumed.
    ///
    /// Returns the number of bytes actually consumed, which is less than `n`
    /// only when fewer than `n` bytes remained.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.remaining());
        self.split += n;
        n
    }

    /// Sum of the unsigned byte values over the full payload.
    pub fn checksum(&self) -> u32 {
        checksum(&self.payload)
    }

    /// Consumes the packet and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Sum of the unsigned byte values of `data`, wrapping at 32 bits.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(u32::from(byte)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_packet_is_zeroed() {
        let packet = Packet::new(16).unwrap();
        assert_eq!(packet.capacity(), 16);
        assert_eq!(packet.remaining(), 16);
        assert_eq!(packet.split_offset(), 0);
        assert!(packet.payload().iter().all(|&b| b == 0));
        assert_eq!(packet.checksum(), 0);
    }

    #[test]
    fn test_zero_length_packet() {
        let packet = Packet::new(0).unwrap();
        assert_eq!(packet.capacity(), 0);
        assert!(packet.is_drained());
        assert_eq!(packet.checksum(), 0);
    }

    #[test]
    fn test_too_large() {
        let result = Packet::new(MAX_PAYLOAD + 1);
        assert_eq!(
            result.unwrap_err(),
            PacketError::TooLarge {
                len: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            }
        );
    }

    #[test]
    fn test_checksum_of_known_bytes() {
        let packet = Packet::from_slice(b"ls\n").unwrap();
        assert_eq!(packet.checksum(), 108 + 115 + 10);

        let packet = Packet::from_slice(&[0xff; 4]).unwrap();
        assert_eq!(packet.checksum(), 4 * 255);
    }

    #[test]
    fn test_checksum_covers_consumed_bytes() {
        let mut packet = Packet::from_slice(b"abc").unwrap();
        let before = packet.checksum();
        packet.consume(2);
        assert_eq!(packet.checksum(), before);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
    }

    #[test]
    fn test_payload_mut_fills_in_place() {
        let mut packet = Packet::new(3).unwrap();
        packet.payload_mut().copy_from_slice(b"xyz");
        assert_eq!(packet.unconsumed(), b"xyz");
        assert_eq!(packet.into_payload(), b"xyz".to_vec());
    }

    #[test]
    fn test_partial_drains_keep_split_invariant() {
        let data: Vec<u8> = (0..=99).collect();
        let mut packet = Packet::from_slice(&data).unwrap();
        let mut drained = Vec::new();

        for step in [7usize, 0, 13, 1, 40, 64] {
            let take = step.min(packet.remaining());
            drained.extend_from_slice(&packet.unconsumed()[..take]);
            assert_eq!(packet.consume(step), take);
            assert_eq!(packet.split_offset() + packet.remaining(), packet.capacity());
            assert_eq!(&drained[..], &data[..packet.split_offset()]);
        }

        assert!(packet.is_drained());
        assert_eq!(drained, data);
    }

    #[test]
    fn test_consume_clamps_to_remaining() {
        let mut packet = Packet::from_slice(b"hi").unwrap();
        assert_eq!(packet.consume(10), 2);
        assert_eq!(packet.consume(1), 0);
        assert_eq!(packet.remaining(), 0);
        assert_eq!(packet.split_offset(), 2);
    }
}
