//! Event flags shared between the session device and the bridging worker.
//!
//! An [`EventGroup`] is a condition variable over a small set of named
//! flags. Senders OR flags in and wake every waiter; a waiter takes (and
//! clears) only the flags it asked for, so a reader waiting for
//! [`Events::READ`] never swallows a [`Events::WRITE`] meant for the worker.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// A set of event flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Events: u8 {
        /// Inbound bytes were made available to the device reader.
        const READ = 0b0001;
        /// Outbound bytes were written by the shell.
        const WRITE = 0b0010;
        /// The worker freed outbound buffer space.
        const SPACE = 0b0100;
        /// The session is shutting down.
        const EXIT = 0b1000;
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::empty()
    }
}

/// Flags plus the condition variable waiters block on.
#[derive(Debug, Default)]
pub struct EventGroup {
    pending: Mutex<Events>,
    cond: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Events> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raises `events` and wakes all waiters.
    pub fn send(&self, events: Events) {
        self.lock().insert(events);
        self.cond.notify_all();
    }

    /// Waits up to `timeout` for any flag in `mask`.
    ///
    /// Returns the matched flags and clears them; returns an empty set on
    /// timeout.
    pub fn wait(&self, mask: Events, timeout: Duration) -> Events {
        let guard = self.lock();
        let (mut pending, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |pending| !pending.intersects(mask))
            .unwrap_or_else(PoisonError::into_inner);

        let matched = *pending & mask;
        pending.remove(mask);
        matched
    }

    /// Returns the currently raised flags without clearing them.
    pub fn peek(&self) -> Events {
        *self.lock()
    }
}
