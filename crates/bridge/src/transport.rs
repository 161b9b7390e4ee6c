//! The transport side of a bridged session.
//!
//! The bridge needs only two things from the packet transport: a way to send
//! an outbound packet within a timeout, and a way to tell it the local side
//! ended the session. [`ChannelTransport`] implements both on top of tokio
//! channels so an async transport task can own the other end.

use std::time::Duration;

use packet::Packet;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Identifier the transport uses to route a session.
pub type SessionId = u32;

/// Default capacity of the outbound packet channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Operations the bridge consumes from the packet transport.
///
/// Both methods are called from the bridging worker thread.
pub trait Transport: Send + Sync {
    /// Delivers an outbound packet, waiting up to `timeout`.
    ///
    /// On failure the packet is handed back so the caller can drop it.
    fn send(&self, packet: Packet, timeout: Duration) -> Result<(), Packet>;

    /// Informs the transport the local side has ended the session.
    fn notify_closed(&self, session_id: SessionId);
}

/// Receiving ends of a [`ChannelTransport`].
#[derive(Debug)]
pub struct TransportReceiver {
    /// Outbound packets, in send order.
    pub packets: mpsc::Receiver<Packet>,
    /// Sessions the bridge has closed.
    pub closed: mpsc::UnboundedReceiver<SessionId>,
}

/// A transport backed by tokio channels.
///
/// `send` blocks the calling thread on the runtime `handle`, so it must be
/// called from a plain thread such as the bridging worker, never from inside
/// an async task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Packet>,
    closed_tx: mpsc::UnboundedSender<SessionId>,
    handle: Handle,
}

impl ChannelTransport {
    /// Creates a transport with the default channel capacity.
    pub fn new(handle: Handle) -> (Self, TransportReceiver) {
        Self::with_capacity(handle, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a transport whose outbound channel holds `capacity` packets.
    pub fn with_capacity(handle: Handle, capacity: usize) -> (Self, TransportReceiver) {
        let (tx, packets) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            tx,
            closed_tx,
            handle,
        };
        (transport, TransportReceiver { packets, closed })
    }
}

impl Transport for ChannelTransport {
    fn send(&self, packet: Packet, timeout: Duration) -> Result<(), Packet> {
        let packet = match self.tx.try_send(packet) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(packet)) => {
                tracing::debug!("Transport channel closed");
                return Err(packet);
            }
            Err(TrySendError::Full(packet)) => packet,
        };

        // Reserve first so a timeout never swallows the packet.
        let reserved = self
            .handle
            .block_on(async { tokio::time::timeout(timeout, self.tx.reserve()).await });

        match reserved {
            Ok(Ok(permit)) => {
                permit.send(packet);
                Ok(())
            }
            Ok(Err(_)) => Err(packet),
            Err(_) => {
                tracing::debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Transport send timed out"
                );
                Err(packet)
            }
        }
    }

    fn notify_closed(&self, session_id: SessionId) {
        if self.closed_tx.send(session_id).is_err() {
            tracing::trace!(session_id = session_id, "No receiver for close notice");
        }
    }
}
