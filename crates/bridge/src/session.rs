//! Shell session lifecycle.
//!
//! [`SessionManager`] admits at most one bridged session at a time. Opening
//! a session queues a priming packet carrying the initial command, redirects
//! the shell console onto a fresh [`SessionDevice`] and starts the bridging
//! worker. The returned [`ShellSession`] is the transport's handle: it feeds
//! inbound packets in and closes the session, and it holds the admission
//! slot until it is closed or dropped.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use packet::{Packet, PacketError, PacketQueue};

use crate::config::BridgeConfig;
use crate::console::Console;
use crate::device::SessionDevice;
use crate::error::{BridgeError, Result};
use crate::events::Events;
use crate::transport::{SessionId, Transport};
use crate::worker::BridgeWorker;

/// State shared between a session handle and its worker.
#[derive(Debug)]
pub(crate) struct SessionState {
    id: SessionId,
    queue: PacketQueue,
    device: Arc<SessionDevice>,
    /// Length of the priming command; zero for an interactive shell.
    mode: usize,
    online: AtomicBool,
    finished: Mutex<bool>,
    finished_cond: Condvar,
}

impl SessionState {
    pub(crate) fn new(
        id: SessionId,
        queue: PacketQueue,
        device: Arc<SessionDevice>,
        mode: usize,
    ) -> Self {
        Self {
            id,
            queue,
            device,
            mode,
            online: AtomicBool::new(true),
            finished: Mutex::new(false),
            finished_cond: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    pub(crate) fn device(&self) -> &Arc<SessionDevice> {
        &self.device
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether the session was primed with a command, which arms the idle
    /// timeout.
    pub(crate) fn is_primed(&self) -> bool {
        self.mode != 0
    }

    /// Marks the session offline and wakes the worker.
    pub(crate) fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.device.events().send(Events::EXIT);
    }

    fn lock_finished(&self) -> MutexGuard<'_, bool> {
        self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_finished(&self) {
        *self.lock_finished() = true;
        self.finished_cond.notify_all();
    }

    pub(crate) fn wait_finished(&self, timeout: Duration) -> bool {
        let guard = self.lock_finished();
        let (finished, _) = self
            .finished_cond
            .wait_timeout_while(guard, timeout, |finished| !*finished)
            .unwrap_or_else(PoisonError::into_inner);
        *finished
    }
}

/// Admission bookkeeping shared by a manager and the sessions it opened.
#[derive(Debug, Default)]
struct Registry {
    /// The admitted session, if any.
    active: Mutex<Option<Arc<SessionState>>>,
    /// Bridging worker threads still running.
    live_workers: Arc<AtomicUsize>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<SessionState>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the admission slot for `state`.
    ///
    /// Fails while another session holds the slot or a previous worker is
    /// still shutting down.
    fn reserve(&self, state: &Arc<SessionState>) -> Result<()> {
        let mut active = self.lock();
        if active.is_some() || self.live_workers.load(Ordering::SeqCst) > 0 {
            tracing::debug!("Refusing shell session: one is already active");
            return Err(BridgeError::AlreadyActive);
        }
        *active = Some(Arc::clone(state));
        Ok(())
    }

    /// Frees the admission slot if `state` still holds it.
    fn release(&self, state: &Arc<SessionState>) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|held| Arc::ptr_eq(held, state)) {
            *active = None;
        }
    }
}

/// Builds the priming packet: the command text followed by a newline.
pub fn priming_packet(args: &str) -> std::result::Result<Packet, PacketError> {
    let mut packet = Packet::new(args.len() + 1)?;
    let payload = packet.payload_mut();
    payload[..args.len()].copy_from_slice(args.as_bytes());
    payload[args.len()] = b'\n';
    Ok(packet)
}

/// Opens shell sessions, one at a time.
pub struct SessionManager {
    config: BridgeConfig,
    console: Arc<dyn Console>,
    registry: Arc<Registry>,
    next_id: AtomicU32,
}

impl SessionManager {
    /// Creates a manager bridging sessions onto `console`.
    pub fn new(config: BridgeConfig, console: Arc<dyn Console>) -> Self {
        Self {
            config,
            console,
            registry: Arc::new(Registry::default()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Returns whether a session currently holds the admission slot.
    pub fn is_active(&self) -> bool {
        self.registry.lock().is_some()
    }

    /// Returns the id of the admitted session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.registry.lock().as_ref().map(|state| state.id())
    }

    /// Opens a session primed with `args`.
    ///
    /// An empty `args` opens an interactive shell that never idles out; a
    /// command closes the session once its output goes quiet. Fails without
    /// side effects when a session is already active or its worker is still
    /// shutting down.
    pub fn open(&self, transport: Arc<dyn Transport>, args: &str) -> Result<ShellSession> {
        if !self.console.is_available() {
            tracing::error!("Refusing shell session: interactive shell not running");
            return Err(BridgeError::ShellUnavailable);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = &self.config.console.thread_name;
        let device = Arc::new(SessionDevice::new(name.as_str(), &self.config));
        let state = Arc::new(SessionState::new(
            id,
            PacketQueue::with_capacity(self.config.queue.capacity),
            Arc::clone(&device),
            args.len(),
        ));

        // Priming goes first so a failure leaves nothing to roll back.
        let priming = priming_packet(args).inspect_err(|e| {
            tracing::error!(session_id = id, error = %e, "Cannot build priming packet");
        })?;
        if state.queue().enqueue(priming, Duration::ZERO).is_err() {
            tracing::error!(session_id = id, "Cannot queue priming packet");
            return Err(BridgeError::PrimingRefused);
        }

        self.registry.reserve(&state)?;

        if let Err(e) = self.console.redirect(Arc::clone(&device)) {
            self.registry.release(&state);
            return Err(BridgeError::Console(e));
        }
        self.console.boost_priority();

        let settle = self.config.timing.console_settle();
        if !settle.is_zero() {
            thread::sleep(settle);
        }

        let worker = BridgeWorker::new(
            Arc::clone(&state),
            transport,
            &self.config.timing,
            Arc::clone(&self.registry.live_workers),
        );
        let handle = match worker.spawn(name) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(session_id = id, error = %e, "Cannot start bridging worker");
                self.console.restore();
                device.detach();
                self.registry.release(&state);
                return Err(BridgeError::WorkerSpawn(e));
            }
        };

        tracing::info!(
            session_id = id,
            device = %device.name(),
            primed = state.is_primed(),
            "Shell session opened"
        );

        Ok(ShellSession {
            state,
            console: Arc::clone(&self.console),
            registry: Arc::clone(&self.registry),
            worker: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Forces the active session offline.
    ///
    /// The worker notices within one poll interval and ends the session as
    /// if it had idled out. Returns false when no session is active.
    pub fn force_exit(&self) -> bool {
        match self.registry.lock().as_ref() {
            Some(state) => {
                tracing::info!(session_id = state.id(), "Forcing shell session offline");
                state.go_offline();
                true
            }
            None => {
                tracing::info!("No shell session running");
                false
            }
        }
    }
}

/// The transport's handle to an open shell session.
///
/// Dropping the handle closes the session.
pub struct ShellSession {
    state: Arc<SessionState>,
    console: Arc<dyn Console>,
    registry: Arc<Registry>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ShellSession {
    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.state.id()
    }

    /// Returns the device the shell console is redirected to.
    pub fn device(&self) -> &Arc<SessionDevice> {
        self.state.device()
    }

    /// Returns whether the session is still bridging.
    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    /// Returns whether the session is an interactive shell rather than a
    /// one-shot command.
    pub fn is_interactive(&self) -> bool {
        !self.state.is_primed()
    }

    /// Returns the number of inbound packets waiting for the worker.
    pub fn queued(&self) -> usize {
        self.state.queue().len()
    }

    /// Queues an inbound packet, waiting up to `timeout` for room.
    ///
    /// The packet is handed back when the session is offline or the queue
    /// stayed full.
    pub fn enqueue(&self, packet: Packet, timeout: Duration) -> std::result::Result<(), Packet> {
        if !self.is_online() {
            return Err(packet);
        }
        self.state.queue().enqueue(packet, timeout)
    }

    /// Waits up to `timeout` for the worker to finish.
    ///
    /// Returns true once the worker has torn the session down.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.state.wait_finished(timeout)
    }

    /// Closes the session and restores the shell console.
    ///
    /// Safe to call more than once and from the worker thread itself, such
    /// as from inside [`Transport::notify_closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.console.restore();
        self.state.go_offline();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!(session_id = self.id(), "Bridging worker panicked");
            }
        }

        self.state.device().detach();
        self.registry.release(&self.state);

        tracing::info!(session_id = self.id(), "Shell session closed");
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}
