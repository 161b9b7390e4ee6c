//! Error types for session lifecycle operations.

use std::io;

use packet::PacketError;
use thiserror::Error;

/// Reasons a session could not be opened.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Another session is already bridged.
    #[error("a shell session is already active")]
    AlreadyActive,

    /// The interactive shell is not running.
    #[error("interactive shell is not available")]
    ShellUnavailable,

    /// Redirecting the shell console failed.
    #[error("failed to redirect console: {0}")]
    Console(#[source] io::Error),

    /// The priming packet could not be built or queued.
    #[error("failed to queue priming packet: {0}")]
    Priming(#[from] PacketError),

    /// The priming packet was refused by the session queue.
    #[error("session queue refused priming packet")]
    PrimingRefused,

    /// The bridging worker thread could not be started.
    #[error("failed to start bridging worker: {0}")]
    WorkerSpawn(#[source] io::Error),
}

/// Result type alias for session lifecycle operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
