//! The interactive shell collaborator.
//!
//! Opening a session hands the shell's console over to the session device;
//! closing it hands the console back. How that happens (a PTY, an in-process
//! shell, a test harness) is up to the [`Console`] implementation.

use std::io;
use std::sync::Arc;

use crate::device::SessionDevice;

/// An interactive shell whose input and output can be redirected.
pub trait Console: Send + Sync {
    /// Returns whether the shell exists and can take a session.
    fn is_available(&self) -> bool {
        true
    }

    /// Redirects the shell's input and output onto `device`.
    ///
    /// The shell must treat the device as non-blocking: a read may return
    /// `WouldBlock` and has to be retried.
    fn redirect(&self, device: Arc<SessionDevice>) -> io::Result<()>;

    /// Raises the shell's scheduling priority while it serves a session.
    fn boost_priority(&self) {}

    /// Restores the shell's original console. Called once per redirect.
    fn restore(&self);
}
