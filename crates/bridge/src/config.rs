//! Configuration management for the shell bridge.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/shell-bridge/config.toml`.
//! Every value has a default, so a missing file or a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ring::{DEFAULT_INBOUND_SIZE, DEFAULT_OUTBOUND_SIZE};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("queue capacity must be between 1 and 64, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("buffer sizes must be between 1 and 65536 bytes, got {0}")]
    InvalidBufferSize(usize),

    #[error("idle_poll_ms must be greater than 0")]
    InvalidIdlePoll,

    #[error("idle tick counts must be greater than 0")]
    InvalidIdleTicks,

    #[error("console thread_name must not be empty")]
    InvalidThreadName,

    #[error("console shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest ring buffer accepted by validation.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Largest queue capacity accepted by validation.
const MAX_QUEUE_CAPACITY: usize = 64;

/// Main configuration structure for the shell bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// General process configuration.
    pub daemon: DaemonConfig,

    /// Inbound packet queue.
    pub queue: QueueConfig,

    /// Ring buffer sizes.
    pub buffers: BufferConfig,

    /// Waits, timeouts and idle detection.
    pub timing: TimingConfig,

    /// The interactive shell.
    pub console: ConsoleConfig,
}

/// General process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Inbound packet queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of packets the transport may queue ahead of the worker.
    pub capacity: usize,
}

/// Ring buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// Transport to shell buffer size in bytes.
    pub inbound_size: usize,

    /// Shell to transport buffer size in bytes.
    pub outbound_size: usize,
}

/// Timing configuration. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a device read waits for data per retry.
    pub read_retry_ms: u64,

    /// Worker dequeue wait and write-available wait per iteration.
    pub idle_poll_ms: u64,

    /// Idle iterations allowed before any output was forwarded.
    pub idle_ticks: u32,

    /// Idle iterations allowed after output was forwarded.
    pub idle_rearm_ticks: u32,

    /// Timeout for handing an outbound packet to the transport.
    pub send_timeout_ms: u64,

    /// Pause after redirecting the console, letting the shell pick it up.
    pub console_settle_ms: u64,
}

/// Interactive shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Shell to run behind the session device.
    pub shell: String,

    /// Name of the session device and its worker thread.
    pub thread_name: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: packet::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            inbound_size: DEFAULT_INBOUND_SIZE,
            outbound_size: DEFAULT_OUTBOUND_SIZE,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            read_retry_ms: 100,
            idle_poll_ms: 20,
            idle_ticks: 50, // ~1s at 20ms per tick
            idle_rearm_ticks: 20,
            send_timeout_ms: 60,
            console_settle_ms: 50,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            thread_name: "as-sh".to_string(),
        }
    }
}

impl TimingConfig {
    pub fn read_retry(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn console_settle(&self) -> Duration {
        Duration::from_millis(self.console_settle_ms)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shell-bridge")
        .join("config.toml")
}

/// Returns the default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

impl BridgeConfig {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SHELL_BRIDGE_LOG_LEVEL: Override log level
    /// - SHELL_BRIDGE_IDLE_TICKS: Override the initial idle tick count
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SHELL_BRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(ticks) = std::env::var("SHELL_BRIDGE_IDLE_TICKS") {
            match ticks.parse::<u32>() {
                Ok(ticks) => {
                    tracing::info!("Overriding idle_ticks from environment: {}", ticks);
                    self.timing.idle_ticks = ticks;
                }
                Err(_) if ticks.is_empty() => {}
                Err(e) => {
                    tracing::warn!("Ignoring SHELL_BRIDGE_IDLE_TICKS={:?}: {}", ticks, e);
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.queue.capacity;
        if capacity < 1 || capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::InvalidQueueCapacity(capacity));
        }

        for size in [self.buffers.inbound_size, self.buffers.outbound_size] {
            if size < 1 || size > MAX_BUFFER_SIZE {
                return Err(ConfigError::InvalidBufferSize(size));
            }
        }

        if self.timing.idle_poll_ms == 0 {
            return Err(ConfigError::InvalidIdlePoll);
        }

        if self.timing.idle_ticks == 0 || self.timing.idle_rearm_ticks == 0 {
            return Err(ConfigError::InvalidIdleTicks);
        }

        if self.console.thread_name.is_empty() {
            return Err(ConfigError::InvalidThreadName);
        }

        let shell_path = Path::new(&self.console.shell);
        if shell_path.is_absolute() {
            if !shell_path.exists() {
                return Err(ConfigError::InvalidShellPath(self.console.shell.clone()));
            }
        } else if which::which(&self.console.shell).is_err() {
            return Err(ConfigError::InvalidShellPath(self.console.shell.clone()));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn valid_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.console.shell = "/bin/sh".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.queue.capacity, 4);
        assert_eq!(config.buffers.inbound_size, 32);
        assert_eq!(config.buffers.outbound_size, 64);
        assert_eq!(config.timing.read_retry_ms, 100);
        assert_eq!(config.timing.idle_poll_ms, 20);
        assert_eq!(config.timing.idle_ticks, 50);
        assert_eq!(config.timing.idle_rearm_ticks, 20);
        assert_eq!(config.timing.send_timeout_ms, 60);
        assert_eq!(config.console.thread_name, "as-sh");
    }

    #[test]
    fn test_duration_accessors() {
        let timing = TimingConfig::default();
        assert_eq!(timing.read_retry(), Duration::from_millis(100));
        assert_eq!(timing.idle_poll(), Duration::from_millis(20));
        assert_eq!(timing.send_timeout(), Duration::from_millis(60));
        assert_eq!(timing.console_settle(), Duration::from_millis(50));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = BridgeConfig::from_toml("").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[buffers]
outbound_size = 256

[timing]
idle_ticks = 10
"#;
        let config = BridgeConfig::from_toml(toml).unwrap();

        assert_eq!(config.buffers.outbound_size, 256);
        assert_eq!(config.buffers.inbound_size, 32);
        assert_eq!(config.timing.idle_ticks, 10);
        assert_eq!(config.timing.idle_poll_ms, 20);
        assert_eq!(config.queue.capacity, 4);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"

[queue]
capacity = 8

[buffers]
inbound_size = 128
outbound_size = 512

[timing]
read_retry_ms = 50
idle_poll_ms = 10
idle_ticks = 100
idle_rearm_ticks = 40
send_timeout_ms = 120
console_settle_ms = 0

[console]
shell = "/bin/bash"
thread_name = "bridge-sh"
"#;
        let config = BridgeConfig::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.buffers.inbound_size, 128);
        assert_eq!(config.buffers.outbound_size, 512);
        assert_eq!(config.timing.read_retry_ms, 50);
        assert_eq!(config.timing.idle_poll_ms, 10);
        assert_eq!(config.timing.idle_ticks, 100);
        assert_eq!(config.timing.idle_rearm_ticks, 40);
        assert_eq!(config.timing.send_timeout_ms, 120);
        assert_eq!(config.timing.console_settle_ms, 0);
        assert_eq!(config.console.shell, "/bin/bash");
        assert_eq!(config.console.thread_name, "bridge-sh");
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = BridgeConfig::from_toml("[queue\ncapacity = 4");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[queue]
capacity = "four"
"#;
        assert!(BridgeConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = BridgeConfig::default();
        config.timing.idle_ticks = 7;
        config.buffers.outbound_size = 1024;

        let toml = config.to_toml().unwrap();
        let parsed = BridgeConfig::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[queue]
capacity = 2
unknown_field = true

[unknown_section]
key = "value"
"#;
        let config = BridgeConfig::from_toml(toml).unwrap();
        assert_eq!(config.queue.capacity, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let config = BridgeConfig::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = BridgeConfig::default();
        config.queue.capacity = 6;
        config.daemon.log_level = "trace".to_string();
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("config.toml");

        BridgeConfig::default().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("shell-bridge/config.toml"));
    }

    #[test]
    fn test_validate_default() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn test_validate_queue_capacity() {
        let mut config = valid_config();
        config.queue.capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueCapacity(0)));

        config.queue.capacity = 65;
        assert_eq!(config.validate(), Err(ConfigError::InvalidQueueCapacity(65)));
    }

    #[test]
    fn test_validate_buffer_sizes() {
        let mut config = valid_config();
        config.buffers.outbound_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBufferSize(0)));

        let mut config = valid_config();
        config.buffers.inbound_size = MAX_BUFFER_SIZE + 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBufferSize(MAX_BUFFER_SIZE + 1))
        );
    }

    #[test]
    fn test_validate_timing() {
        let mut config = valid_config();
        config.timing.idle_poll_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdlePoll));

        let mut config = valid_config();
        config.timing.idle_rearm_ticks = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdleTicks));
    }

    #[test]
    fn test_validate_console() {
        let mut config = valid_config();
        config.console.thread_name.clear();
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreadName));

        let mut config = valid_config();
        config.console.shell = "/definitely/not/a/shell".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath("/definitely/not/a/shell".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = valid_config();
        config.daemon.log_level = "WARN".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("SHELL_BRIDGE_IDLE_TICKS");
        std::env::set_var("SHELL_BRIDGE_LOG_LEVEL", "debug");

        let mut config = BridgeConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.daemon.log_level, "debug");

        std::env::remove_var("SHELL_BRIDGE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("SHELL_BRIDGE_LOG_LEVEL", "");
        std::env::set_var("SHELL_BRIDGE_IDLE_TICKS", "");

        let mut config = BridgeConfig::default();
        config.apply_env_overrides();
        assert_eq!(config, BridgeConfig::default());

        std::env::remove_var("SHELL_BRIDGE_LOG_LEVEL");
        std::env::remove_var("SHELL_BRIDGE_IDLE_TICKS");
    }

    #[test]
    #[serial]
    fn test_env_override_idle_ticks() {
        std::env::remove_var("SHELL_BRIDGE_LOG_LEVEL");
        std::env::set_var("SHELL_BRIDGE_IDLE_TICKS", "5");

        let mut config = BridgeConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.timing.idle_ticks, 5);

        std::env::set_var("SHELL_BRIDGE_IDLE_TICKS", "soon");
        let mut config = BridgeConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.timing.idle_ticks, 50);

        std::env::remove_var("SHELL_BRIDGE_IDLE_TICKS");
    }
}
