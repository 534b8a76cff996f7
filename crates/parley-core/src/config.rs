//! Configuration system for Parley.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PARLEY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/parley/config.toml
//!   3. ~/.config/parley/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::identity::Identity;
use crate::wire::{
    Channel, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CHANNEL, DEFAULT_REORDER_WINDOW,
    MAX_MESSAGE_SIZE,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub sessions: SessionConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Local identity, 16 hex digits. All zeros = derive one at startup.
    pub local_id: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP bind address.
    pub bind: String,
    /// How often the host runs the maintenance tick.
    pub tick_interval_ms: u64,
    /// Statically known peers. Others are learned from inbound datagrams.
    pub peers: Vec<PeerAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub identity: Identity,
    pub addr: String,
}

/// Limits and timers for the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions with no traffic for this many seconds are marked broken.
    pub idle_timeout_secs: u64,
    /// Largest payload accepted by a single send.
    pub max_message_size: usize,
    /// Highest channel number accepted by send.
    pub max_channel: Channel,
    /// Early reliable arrivals held per channel before skipping a gap.
    pub reorder_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Accept every incoming session request.
    pub auto_accept: bool,
    /// Send every message received on `echo_channel` back to its sender.
    pub echo: bool,
    pub echo_channel: Channel,
    /// Log a session table snapshot this often. 0 = never.
    pub snapshot_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:27100".to_string(),
            tick_interval_ms: 50,
            peers: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            max_message_size: MAX_MESSAGE_SIZE,
            max_channel: DEFAULT_MAX_CHANNEL,
            reorder_window: DEFAULT_REORDER_WINDOW,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            auto_accept: true,
            echo: true,
            echo_channel: 0,
            snapshot_interval_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl NetworkConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("parley")
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ParleyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ParleyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PARLEY_CONFIG")
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
            let text = toml::to_string_pretty(&ParleyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PARLEY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PARLEY_IDENTITY__LOCAL_ID") {
            if let Ok(id) = v.parse() {
                self.identity.local_id = id;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_NETWORK__BIND") {
            self.network.bind = v;
        }
        if let Ok(v) = std::env::var("PARLEY_NETWORK__TICK_INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.network.tick_interval_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_SESSIONS__IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.sessions.idle_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("PARLEY_DAEMON__AUTO_ACCEPT") {
            self.daemon.auto_accept = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("PARLEY_DAEMON__ECHO") {
            self.daemon.echo = v == "true" || v == "1";
        }
    }
}
