//! A console backed by a shell running in a pseudo-terminal.
//!
//! Redirecting the console spawns the shell in a fresh PTY and starts two
//! pump threads: one copies device reads into the PTY, the other copies PTY
//! output into device writes. Restoring the console kills the shell.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::watch;

use crate::console::Console;
use crate::device::{DeviceError, SessionDevice};

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// A running shell and the PTY it is attached to.
struct Attached {
    child: Box<dyn Child + Send + Sync>,
    /// Held so the PTY stays open while the shell runs.
    _master: Box<dyn MasterPty + Send>,
}

impl Attached {
    /// Kills the shell and reaps it, returning its exit code.
    fn shutdown(mut self) -> Option<u32> {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "Shell already exited");
        }
        match self.child.wait() {
            Ok(status) => Some(status.exit_code()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reap shell");
                None
            }
        }
    }
}

/// A [`Console`] that runs `shell` in a PTY per session.
pub struct PtyConsole {
    shell: String,
    cols: u16,
    rows: u16,
    attached: Mutex<Option<Attached>>,
    exited_tx: watch::Sender<bool>,
}

impl PtyConsole {
    /// Creates a console running `shell` on an 80x24 terminal.
    pub fn new(shell: impl Into<String>) -> Self {
        Self::with_size(shell, 80, 24)
    }

    /// Creates a console with an explicit terminal size.
    pub fn with_size(shell: impl Into<String>, cols: u16, rows: u16) -> Self {
        let (exited_tx, _) = watch::channel(false);
        Self {
            shell: shell.into(),
            cols,
            rows,
            attached: Mutex::new(None),
            exited_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Attached>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a receiver that turns true when the shell exits on its own.
    pub fn subscribe_exit(&self) -> watch::Receiver<bool> {
        self.exited_tx.subscribe()
    }

    fn spawn_pumps(
        &self,
        device: Arc<SessionDevice>,
        mut reader: Box<dyn Read + Send>,
        mut writer: Box<dyn Write + Send>,
    ) -> io::Result<()> {
        let input = Arc::clone(&device);
        thread::Builder::new()
            .name("pty-in".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                while input.is_attached() {
                    match input.read(&mut buf) {
                        Ok(n) => {
                            if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                                tracing::debug!(error = %e, "PTY input closed");
                                break;
                            }
                        }
                        Err(DeviceError::WouldBlock | DeviceError::Detached) => continue,
                    }
                }
                tracing::debug!("PTY input pump ended");
            })?;

        let exited_tx = self.exited_tx.clone();
        thread::Builder::new()
            .name("pty-out".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            tracing::info!("PTY EOF - shell exited");
                            exited_tx.send_replace(true);
                            break;
                        }
                        Ok(n) => {
                            if device.write(&buf[..n]) < n {
                                break;
                            }
                        }
                        Err(e) => {
                            if device.is_attached() {
                                tracing::error!(error = %e, "Error reading from PTY");
                                exited_tx.send_replace(true);
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("PTY output pump ended");
            })?;

        Ok(())
    }
}

impl Console for PtyConsole {
    fn is_available(&self) -> bool {
        let path = Path::new(&self.shell);
        if path.is_absolute() {
            path.exists()
        } else {
            which::which(&self.shell).is_ok()
        }
    }

    fn redirect(&self, device: Arc<SessionDevice>) -> io::Result<()> {
        let to_io = |e: anyhow::Error| io::Error::new(io::ErrorKind::Other, e.to_string());

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.rows,
                cols: self.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(to_io)?;

        let child = pair
            .slave
            .spawn_command(CommandBuilder::new(&self.shell))
            .map_err(to_io)?;
        let pid = child.process_id();
        let streams = pair
            .master
            .try_clone_reader()
            .and_then(|reader| pair.master.take_writer().map(|writer| (reader, writer)));
        let attached = Attached {
            child,
            _master: pair.master,
        };

        let (reader, writer) = match streams {
            Ok(streams) => streams,
            Err(e) => {
                tracing::error!(error = %e, "Cannot open PTY streams");
                attached.shutdown();
                return Err(to_io(e));
            }
        };

        self.exited_tx.send_replace(false);
        *self.lock() = Some(attached);
        if let Err(e) = self.spawn_pumps(Arc::clone(&device), reader, writer) {
            tracing::error!(error = %e, "Cannot start PTY pumps");
            self.restore();
            return Err(e);
        }

        tracing::info!(
            shell = %self.shell,
            pid = pid,
            device = %device.name(),
            "Shell console redirected"
        );
        Ok(())
    }

    fn restore(&self) {
        let Some(attached) = self.lock().take() else {
            return;
        };

        if let Some(code) = attached.shutdown() {
            tracing::info!(code = code, "Shell console restored");
        }
    }
}
