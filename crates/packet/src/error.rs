//! Error types for the packet crate.

use thiserror::Error;

/// Packet error type covering packet creation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// The allocator refused the payload buffer.
    #[error("no memory for packet payload of {len} bytes")]
    Allocation {
        /// Requested payload length.
        len: usize,
    },

    /// Payload exceeds the largest payload the transport carries.
    #[error("packet too large: {len} bytes exceeds maximum of {max} bytes")]
    TooLarge {
        /// Requested payload length.
        len: usize,
        /// Maximum allowed payload length.
        max: usize,
    },
}

/// Result type alias for packet operations.
pub type Result<T> = std::result::Result<T, PacketError>;
