//! The virtual stream device the interactive shell reads from and writes to.
//!
//! The device owns the session's two ring buffers behind a single mutex and
//! the event group used to wake blocked readers and writers:
//!
//! ```text
//!   worker ──put──► inbound ring ──get──► read()   (shell input)
//!   worker ◄─get─── outbound ring ◄─put── write()  (shell output)
//! ```
//!
//! Reads wait for [`Events::READ`] between attempts. Blocking writes push
//! with backpressure: whatever does not fit is retried after the worker
//! signals [`Events::SPACE`], for as long as the device stays attached.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use packet::{Packet, PacketError};
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::events::{EventGroup, Events};
use crate::ring::RingBuffer;

/// Errors returned by device reads and writes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// No data arrived within the read wait.
    #[error("no data available, try again")]
    WouldBlock,

    /// The device is no longer attached to a session.
    #[error("device detached from session")]
    Detached,
}

impl From<DeviceError> for io::Error {
    fn from(err: DeviceError) -> Self {
        let kind = match err {
            DeviceError::WouldBlock => io::ErrorKind::WouldBlock,
            DeviceError::Detached => io::ErrorKind::NotConnected,
        };
        io::Error::new(kind, err)
    }
}

/// Both directions of a session's byte stream.
#[derive(Debug)]
struct Buffers {
    /// Transport to shell.
    inbound: RingBuffer,
    /// Shell to transport.
    outbound: RingBuffer,
}

/// The session's virtual console device.
#[derive(Debug)]
pub struct SessionDevice {
    /// Device name the console is redirected to.
    name: String,
    /// Ring buffers, one lock for both directions.
    buffers: Mutex<Buffers>,
    /// Notification channel shared with the worker.
    events: EventGroup,
    /// Cleared once the session is torn down.
    attached: AtomicBool,
    /// How long a read waits for data before giving up.
    read_wait: Duration,
    /// How long a blocked write waits for space before re-checking.
    write_wait: Duration,
}

impl SessionDevice {
    /// Creates an attached device sized by `config`.
    pub fn new(name: impl Into<String>, config: &BridgeConfig) -> Self {
        Self {
            name: name.into(),
            buffers: Mutex::new(Buffers {
                inbound: RingBuffer::new(config.buffers.inbound_size),
                outbound: RingBuffer::new(config.buffers.outbound_size),
            }),
            events: EventGroup::new(),
            attached: AtomicBool::new(true),
            read_wait: config.timing.read_retry(),
            write_wait: config.timing.idle_poll(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the device still belongs to a live session.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Reads shell input into `buf`.
    ///
    /// Retries for as long as the worker keeps signalling [`Events::READ`];
    /// returns [`DeviceError::WouldBlock`] once a full read wait passes with
    /// no signal, or immediately when the device is detached.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if !self.is_attached() {
            return Err(DeviceError::WouldBlock);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let n = self.lock().inbound.get(buf);
            if n > 0 {
                return Ok(n);
            }

            let events = self.events.wait(Events::READ, self.read_wait);
            if !events.contains(Events::READ) || !self.is_attached() {
                return Err(DeviceError::WouldBlock);
            }
        }
    }

    /// Writes shell output, blocking until every byte is accepted.
    ///
    /// Returns fewer than `data.len()` bytes only when the session goes away
    /// mid-write; returns 0 on a detached device.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut written = 0;

        while written < data.len() && self.is_attached() {
            let n = self.lock().outbound.put(&data[written..]);
            self.events.send(Events::WRITE);

            if n > 0 {
                written += n;
            } else {
                self.events.wait(Events::SPACE, self.write_wait);
            }
        }

        written
    }

    /// Writes shell output without waiting.
    ///
    /// Performs a single best-effort `put`; returns 0 when the buffer lock is
    /// held elsewhere, the buffer is full, or the device is detached.
    pub fn write_nonblocking(&self, data: &[u8]) -> usize {
        if !self.is_attached() {
            return 0;
        }

        let n = match self.buffers.try_lock() {
            Ok(mut buffers) => buffers.outbound.put(data),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().outbound.put(data),
            Err(TryLockError::WouldBlock) => 0,
        };
        if n > 0 {
            self.events.send(Events::WRITE);
        }
        n
    }

    /// Moves as much of the packet's unconsumed payload as fits into the
    /// inbound buffer, advancing its split offset.
    pub(crate) fn fill_inbound(&self, packet: &mut Packet) -> usize {
        let mut buffers = self.lock();
        let n = buffers.inbound.put(packet.unconsumed());
        packet.consume(n)
    }

    /// Drains the whole outbound buffer into a new packet.
    ///
    /// Returns `Ok(None)` when nothing is buffered. On allocation failure the
    /// bytes stay buffered for the next attempt.
    pub(crate) fn take_outbound(&self) -> Result<Option<Packet>, PacketError> {
        let mut buffers = self.lock();
        let len = buffers.outbound.data_len();
        if len == 0 {
            return Ok(None);
        }

        let mut packet = Packet::new(len)?;
        buffers.outbound.get(packet.payload_mut());
        drop(buffers);

        self.events.send(Events::SPACE);
        Ok(Some(packet))
    }

    /// Returns the number of bytes waiting for the transport.
    pub fn outbound_len(&self) -> usize {
        self.lock().outbound.data_len()
    }

    pub(crate) fn events(&self) -> &EventGroup {
        &self.events
    }

    /// Detaches the device and wakes anyone blocked on it.
    pub(crate) fn detach(&self) {
        if self.attached.swap(false, Ordering::SeqCst) {
            tracing::debug!(device = %self.name, "Session device detached");
        }
        self.events.send(Events::READ | Events::SPACE);
    }
}

impl io::Read for &SessionDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        SessionDevice::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for &SessionDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match SessionDevice::write(self, buf) {
            0 => Err(DeviceError::Detached.into()),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
