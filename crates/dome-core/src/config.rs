//! Configuration system for Dome.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DOME_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/dome/config.toml
//!   3. ~/.config/dome/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_LISTEN_PORT, FRAME_TIMEOUT_MS, MAX_DATAGRAM, VIDEO_STREAM_ID};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomeConfig {
    pub network: NetworkConfig,
    pub receiver: ReceiverConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address to bind. `0.0.0.0` listens on every IPv4 interface.
    pub bind_addr: String,
    /// UDP port for chunk datagrams. Kept wide so out-of-range values
    /// survive parsing and fail validation instead of falling back silently.
    pub listen_port: i64,
    /// SO_RCVBUF size. Video bursts a whole frame at once. 0 = OS default.
    pub recv_buffer_bytes: usize,
    /// Size of the datagram read buffer. Longer datagrams are truncated.
    pub max_datagram_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Incomplete frames older than this are evicted.
    pub frame_timeout_ms: u64,
    /// Only chunks tagged with this stream id are assembled.
    pub stream_id_filter: u8,
    /// Upper bound on frames assembled concurrently.
    pub max_pending_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the daemon mirrors the latest completed frame. Unset = disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    /// Receive stats log period. 0 = disabled.
    pub stats_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            listen_port: i64::from(DEFAULT_LISTEN_PORT),
            recv_buffer_bytes: 4 * 1024 * 1024,
            max_datagram_bytes: MAX_DATAGRAM,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: FRAME_TIMEOUT_MS,
            stream_id_filter: VIDEO_STREAM_ID,
            max_pending_frames: 64,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            stats_interval_secs: 10,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("dome")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("{var}={value:?} is not a valid value")]
    InvalidEnv { var: &'static str, value: String },
    #[error("listen port {0} is outside 0..=65535")]
    InvalidPort(i64),
    #[error("bind address {0:?} is not an IP address")]
    InvalidBindAddr(String),
    #[error("frame timeout must be non-zero")]
    ZeroFrameTimeout,
    #[error("max_pending_frames must be non-zero")]
    ZeroPendingFrames,
    #[error("max_datagram_bytes {0} is below {}, datagrams would be truncated", MAX_DATAGRAM)]
    DatagramBufferTooSmall(usize),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DomeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DomeConfig::default()
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DOME_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DomeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DOME_* overrides read through `lookup`.
    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("DOME_NETWORK__BIND_ADDR") {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("DOME_NETWORK__LISTEN_PORT") {
            self.network.listen_port = parse_env("DOME_NETWORK__LISTEN_PORT", v)?;
        }
        if let Some(v) = lookup("DOME_RECEIVER__FRAME_TIMEOUT_MS") {
            self.receiver.frame_timeout_ms = parse_env("DOME_RECEIVER__FRAME_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("DOME_RECEIVER__STREAM_ID_FILTER") {
            self.receiver.stream_id_filter = parse_env("DOME_RECEIVER__STREAM_ID_FILTER", v)?;
        }
        if let Some(v) = lookup("DOME_OUTPUT__SNAPSHOT_PATH") {
            self.output.snapshot_path = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        Ok(())
    }

    /// Check every value the receiver depends on before anything is bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.receiver.frame_timeout_ms == 0 {
            return Err(ConfigError::ZeroFrameTimeout);
        }
        if self.receiver.max_pending_frames == 0 {
            return Err(ConfigError::ZeroPendingFrames);
        }
        if self.network.max_datagram_bytes < MAX_DATAGRAM {
            return Err(ConfigError::DatagramBufferTooSmall(
                self.network.max_datagram_bytes,
            ));
        }
        Ok(())
    }

    /// The socket address the receiver binds.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = u16::try_from(self.network.listen_port)
            .map_err(|_| ConfigError::InvalidPort(self.network.listen_port))?;
        let ip: IpAddr = self
            .network
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.network.bind_addr.clone()))?;
        Ok(SocketAddr::new(ip, port))
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver.frame_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
