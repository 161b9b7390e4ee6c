//! # Shell Bridge Library
//!
//! This crate bridges a packet-oriented transport session to an interactive
//! shell's byte-stream console.
//!
//! ## Overview
//!
//! Packets arrive from the transport at their own pace and must reach the
//! shell's input without loss or reordering; whatever the shell prints must
//! be repackaged and sent back. Neither side may block the other for long.
//!
//! - **Session Manager**: One-at-a-time admission, console redirection and
//!   guaranteed cleanup of queued packets
//! - **Session Device**: The shell's virtual console, two ring buffers and a
//!   notification channel
//! - **Bridging Worker**: A thread pumping packets into the device and shell
//!   output back out, with idle-timeout detection
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  enqueue   ┌─────────────┐         ┌──────────────────┐
//! │           │ ─────────► │ PacketQueue │ ──────► │                  │
//! │ Transport │            └─────────────┘         │  Bridging Worker │
//! │           │ ◄───────────── send ────────────── │                  │
//! └───────────┘                                    └──────────────────┘
//!                                                    │ put        ▲ get
//!                                                    ▼            │
//!                                       ┌───────────────────────────────┐
//!                                       │ SessionDevice                 │
//!                                       │  inbound ring   outbound ring │
//!                                       └───────────────────────────────┘
//!                                          read() │            ▲ write()
//!                                                 ▼            │
//!                                              interactive shell
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bridge::{BridgeConfig, ChannelTransport, Console, SessionManager};
//! # fn console() -> Arc<dyn Console> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = SessionManager::new(BridgeConfig::default(), console());
//!     let (transport, mut rx) = ChannelTransport::new(tokio::runtime::Handle::current());
//!
//!     let session = manager.open(Arc::new(transport), "ls")?;
//!     while let Some(packet) = rx.packets.recv().await {
//!         print!("{}", String::from_utf8_lossy(packet.payload()));
//!     }
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Session admission and lifecycle
//! - [`device`]: The shell-facing session device
//! - [`ring`]: Byte ring buffer
//! - [`events`]: Notification flags
//! - [`transport`]: Transport trait and channel-backed transport
//! - [`console`]: Interactive shell trait
//! - [`pty`]: PTY-backed shell console

pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod events;
pub mod pty;
pub mod ring;
pub mod session;
pub mod transport;
mod worker;

// Re-export packet for convenience
pub use packet;

pub use config::BridgeConfig;
pub use console::Console;
pub use device::{DeviceError, SessionDevice};
pub use error::{BridgeError, Result};
pub use events::{EventGroup, Events};
pub use pty::PtyConsole;
pub use ring::RingBuffer;
pub use session::{priming_packet, SessionManager, ShellSession};
pub use transport::{ChannelTransport, SessionId, Transport, TransportReceiver};
