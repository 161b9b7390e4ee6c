//! The bridging worker thread.
//!
//! One worker runs per session and alternates between two steps until the
//! session goes offline or idles out:
//!
//! 1. **Inbound**: take a packet from the queue (or keep draining the one in
//!    hand) and move as much of it as fits into the device's inbound buffer.
//!    A packet larger than the free space is split across iterations.
//! 2. **Outbound**: wait briefly for the shell to write; if it did, package
//!    the whole outbound buffer as one packet and send it to the transport.
//!
//! When neither side has anything to do and the session was primed with a
//! command, an idle countdown runs; reaching zero ends the session.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use packet::Packet;

use crate::config::TimingConfig;
use crate::events::Events;
use crate::session::SessionState;
use crate::transport::Transport;

/// Keeps a count of running workers, decremented when the worker is dropped.
#[derive(Debug)]
struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The per-session pump between the packet queue and the device.
pub(crate) struct BridgeWorker {
    state: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    /// Packet being drained into the inbound buffer, if any.
    current: Option<Packet>,
    idle_poll: Duration,
    send_timeout: Duration,
    idle_ticks: u32,
    idle_rearm_ticks: u32,
    live: LiveWorker,
}

impl BridgeWorker {
    pub(crate) fn new(
        state: Arc<SessionState>,
        transport: Arc<dyn Transport>,
        timing: &TimingConfig,
        live_workers: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            state,
            transport,
            current: None,
            idle_poll: timing.idle_poll(),
            send_timeout: timing.send_timeout(),
            idle_ticks: timing.idle_ticks.max(1),
            idle_rearm_ticks: timing.idle_rearm_ticks.max(1),
            live: LiveWorker::new(live_workers),
        }
    }

    /// Starts the worker on a named thread.
    pub(crate) fn spawn(self, name: &str) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let session_id = self.state.id();
        let mut idle = self.idle_ticks;
        tracing::debug!(session_id = session_id, "Bridging worker started");

        while self.state.is_online() {
            self.pump_inbound();

            let events = self
                .state
                .device()
                .events()
                .wait(Events::WRITE | Events::EXIT, self.idle_poll);

            if events.contains(Events::WRITE) {
                idle = self.idle_rearm_ticks;
                self.pump_outbound();
            } else if self.state.is_primed() {
                idle -= 1;
                if idle == 0 {
                    tracing::info!(session_id = session_id, "Shell session idle, closing");
                    break;
                }
            }
        }

        self.finish();
    }

    /// Moves inbound packet bytes into the device.
    fn pump_inbound(&mut self) {
        if self.current.is_none() {
            self.current = self.state.queue().dequeue(self.idle_poll);
            if self.current.is_none() {
                return;
            }
        }

        if let Some(packet) = self.current.as_mut() {
            let moved = self.state.device().fill_inbound(packet);
            tracing::trace!(
                session_id = self.state.id(),
                moved = moved,
                remaining = packet.remaining(),
                "Relayed inbound bytes"
            );
            if packet.is_drained() {
                self.current = None;
            }
        }

        self.state.device().events().send(Events::READ);
    }

    /// Sends everything the shell has written as one packet.
    fn pump_outbound(&mut self) {
        let packet = match self.state.device().take_outbound() {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    session_id = self.state.id(),
                    error = %e,
                    "Cannot allocate outbound packet"
                );
                return;
            }
        };

        let len = packet.capacity();
        match self.transport.send(packet, self.send_timeout) {
            Ok(()) => {
                tracing::trace!(session_id = self.state.id(), len = len, "Sent outbound packet");
            }
            Err(dropped) => {
                tracing::warn!(
                    session_id = self.state.id(),
                    len = dropped.capacity(),
                    "Transport refused outbound packet, dropping"
                );
            }
        }
    }

    /// Tears the session down from the worker side.
    fn finish(mut self) {
        let session_id = self.state.id();

        self.state.go_offline();
        self.state.device().detach();

        if let Some(packet) = self.current.take() {
            tracing::debug!(
                session_id = session_id,
                remaining = packet.remaining(),
                "Dropping partially relayed packet"
            );
        }
        let cleared = self.state.queue().clear();

        tracing::info!(session_id = session_id, cleared = cleared, "Shell session ended");
        self.transport.notify_closed(session_id);

        // Release the worker slot before waking anyone waiting on the close.
        drop(self.live);
        self.state.mark_finished();
    }
}
