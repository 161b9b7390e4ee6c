//! Shell Bridge
//!
//! Runs a shell behind a session device and bridges it to stdin/stdout as a
//! packet transport.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use bridge::config::{default_config_path, BridgeConfig};
use bridge::packet::{checksum, Packet};
use bridge::{ChannelTransport, PtyConsole, SessionManager, ShellSession};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Size of the chunks read from stdin and turned into inbound packets.
const STDIN_CHUNK_SIZE: usize = 1024;

/// How long a single inbound enqueue attempt waits for queue space.
const ENQUEUE_WAIT: Duration = Duration::from_millis(100);

/// Shell Bridge - bridges a packet transport to an interactive shell.
#[derive(Parser, Debug)]
#[command(name = "shell-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Open a shell session bridged to stdin/stdout
    Run {
        /// Command to prime the session with; omit for an interactive shell
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },

    /// Print the packet checksum of a file (stdin when omitted)
    Checksum {
        /// File to checksum
        file: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::load_default()?,
    };
    config.apply_env_overrides();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize tracing on stderr; stdout carries session data.
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { command } => run(config, command.join(" ")).await,
        Commands::Config { init } => {
            if init {
                let path = cli.config.clone().unwrap_or_else(default_config_path);
                BridgeConfig::default().save(&path)?;
                println!("Wrote default configuration to {}", path.display());
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
        Commands::Checksum { file } => {
            let data = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    tokio::io::stdin().read_to_end(&mut data).await?;
                    data
                }
            };
            let sum = checksum(&data);
            println!("{} ({:#010x}) over {} bytes", sum, sum, data.len());
            Ok(())
        }
    }
}

async fn run(config: BridgeConfig, args: String) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;

    let console = Arc::new(PtyConsole::new(config.console.shell.clone()));
    let mut shell_exit = console.subscribe_exit();
    let manager = Arc::new(SessionManager::new(config, console));
    let (transport, mut rx) = ChannelTransport::new(Handle::current());

    let session = {
        let manager = Arc::clone(&manager);
        tokio::task::spawn_blocking(move || manager.open(Arc::new(transport), &args))
            .await?
            .context("Failed to open shell session")?
    };
    let session = Arc::new(session);
    tracing::info!(session_id = session.id(), "Bridging shell session over stdio");

    let mut stdin_eof = spawn_stdin_pump(Arc::clone(&session))?;
    let mut stdin_open = true;
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            packet = rx.packets.recv() => match packet {
                Some(packet) => {
                    stdout.write_all(packet.payload()).await?;
                    stdout.flush().await?;
                }
                None => break,
            },
            closed = rx.closed.recv() => {
                tracing::info!(session_id = ?closed, "Session closed by bridge");
                break;
            }
            _ = &mut stdin_eof, if stdin_open => {
                stdin_open = false;
                // A one-shot command still runs until it idles out.
                if session.is_interactive() {
                    tracing::info!("stdin closed, ending interactive session");
                    manager.force_exit();
                }
            }
            changed = shell_exit.changed() => {
                if changed.is_err() || *shell_exit.borrow() {
                    manager.force_exit();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing session");
                manager.force_exit();
            }
        }
    }

    // Flush output the worker sent before it went offline.
    while let Ok(packet) = rx.packets.try_recv() {
        stdout.write_all(packet.payload()).await?;
    }
    stdout.flush().await?;

    tokio::task::spawn_blocking(move || session.close()).await?;
    Ok(())
}

/// Starts a detached thread feeding stdin into the session.
///
/// The returned receiver resolves once stdin reaches EOF. The thread is
/// never joined, so a read blocked on a quiet terminal cannot hold the
/// process open after the session ends.
fn spawn_stdin_pump(session: Arc<ShellSession>) -> io::Result<oneshot::Receiver<()>> {
    let (eof_tx, eof_rx) = oneshot::channel();
    thread::Builder::new()
        .name("stdin-pump".to_string())
        .spawn(move || {
            if let Err(e) = pump_stdin(&session) {
                tracing::warn!(error = %e, "Failed to relay stdin");
            }
            let _ = eof_tx.send(());
        })?;
    Ok(eof_rx)
}

/// Turns stdin chunks into inbound packets, waiting for queue space.
fn pump_stdin(session: &ShellSession) -> anyhow::Result<()> {
    let mut stdin = io::stdin().lock();
    let mut buf = vec![0u8; STDIN_CHUNK_SIZE];

    loop {
        let n = match stdin.read(&mut buf) {
            Ok(0) => {
                tracing::debug!("stdin EOF");
                return Ok(());
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let mut packet = Packet::from_slice(&buf[..n])?;
        while let Err(returned) = session.enqueue(packet, ENQUEUE_WAIT) {
            if !session.is_online() {
                tracing::debug!("Session offline, discarding input");
                return Ok(());
            }
            packet = returned;
        }
    }
}
