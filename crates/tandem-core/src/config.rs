//! Runtime configuration
//!
//! [`TandemConfig`] groups the coordinator, driver, backup, recovery and
//! logging settings. Values come from defaults, an optional TOML file and
//! `TANDEM_<SECTION>_<FIELD>` environment overrides, in that order.

use crate::backup::{BackupOptions, DEFAULT_SHARE_COUNT, DEFAULT_THRESHOLD};
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TANDEM_";

/// Storage key of the wallet key-id pointer
pub const DEFAULT_METADATA_KEY: &str = "tandem:wallet:key-id";

/// Coordinator server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
    /// Time allowed for a socket to send its hello
    pub handshake_timeout_ms: u64,
    /// Time the standard policy waits for a backup fragment after DKG
    pub backup_wait_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            handshake_timeout_ms: 10_000,
            backup_wait_ms: 15_000,
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        SocketAddr::from_str(&self.bind_addr)
            .map_err(|e| CoreError::config(format!("invalid bind_addr {}: {e}", self.bind_addr)))
    }

    /// Handshake timeout as a duration
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Backup wait as a duration
    pub fn backup_wait(&self) -> Duration {
        Duration::from_millis(self.backup_wait_ms)
    }
}

/// Round-trip driver limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Round bound when both roles are local
    pub dual_max_rounds: u32,
    /// Round bound for the coordinator role
    pub server_max_rounds: u32,
    /// Round bound for the device role
    pub device_max_rounds: u32,
    /// Sleep between empty transport polls
    pub poll_interval_ms: u64,
    /// Give up waiting for a peer frame after this long; 0 waits forever
    pub peer_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            dual_max_rounds: 128,
            server_max_rounds: 256,
            device_max_rounds: 512,
            poll_interval_ms: 5,
            peer_timeout_ms: 60_000,
        }
    }
}

impl DriverConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Peer timeout, `None` when disabled
    pub fn peer_timeout(&self) -> Option<Duration> {
        (self.peer_timeout_ms > 0).then(|| Duration::from_millis(self.peer_timeout_ms))
    }
}

/// Backup fragment distribution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// How long a device waits for the coordinator's ack
    pub ack_timeout_ms: u64,
    /// Sleep between ack polls
    pub ack_poll_interval_ms: u64,
    /// Fragment index held by the coordinator
    pub coordinator_share_index: usize,
    /// Fragment index held by the third-party host
    pub third_party_share_index: usize,
    /// Restore threshold when the caller does not choose one
    pub default_threshold: u32,
    /// Fragment count when the caller does not choose one
    pub default_share_count: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 15_000,
            ack_poll_interval_ms: 50,
            coordinator_share_index: 0,
            third_party_share_index: 1,
            default_threshold: DEFAULT_THRESHOLD,
            default_share_count: DEFAULT_SHARE_COUNT,
        }
    }
}

impl BackupConfig {
    /// Ack timeout as a duration
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Ack poll interval as a duration
    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    /// Fallback options used to fill gaps in caller-supplied ones
    pub fn default_options(&self) -> BackupOptions {
        BackupOptions {
            enabled: Some(true),
            threshold: Some(self.default_threshold),
            share_count: Some(self.default_share_count),
            label: None,
        }
    }
}

/// Endpoints used during recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Coordinator HTTP API base URL
    pub api_base_url: Option<String>,
    /// Third-party fragment host base URL
    pub fragment_host_url: Option<String>,
    /// Bearer token for the fragment host
    pub fragment_host_token: Option<String>,
    /// Storage key of the wallet key-id pointer
    pub metadata_key: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            fragment_host_url: None,
            fragment_host_token: None,
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    /// Coordinator server
    pub server: ServerConfig,
    /// Round-trip driver
    pub driver: DriverConfig,
    /// Backup distribution
    pub backup: BackupConfig,
    /// Recovery endpoints
    pub recovery: RecoveryConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl TandemConfig {
    /// Parse a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::config(format!("Failed to read config file: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CoreError::config(format!("Invalid TOML: {e}")))
    }

    /// Apply `TANDEM_<SECTION>_<FIELD>` variables from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_from_vars(std::env::vars())
    }

    /// Apply `TANDEM_`-prefixed overrides from `vars`; other names are ignored
    pub fn merge_from_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_ascii_lowercase();
            let Some((section, field)) = rest.split_once('_') else {
                continue;
            };
            self.set_from_string(&format!("{section}.{field}"), value.as_ref())?;
        }
        Ok(())
    }

    /// Set one value addressed as `section.field`
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| CoreError::config(format!("expected section.field, got {key}")))?;

        match (section, field) {
            ("server", "bind_addr") => self.server.bind_addr = value.to_string(),
            ("server", "handshake_timeout_ms") => {
                self.server.handshake_timeout_ms = parse(key, value)?
            }
            ("server", "backup_wait_ms") => self.server.backup_wait_ms = parse(key, value)?,
            ("driver", "dual_max_rounds") => self.driver.dual_max_rounds = parse(key, value)?,
            ("driver", "server_max_rounds") => self.driver.server_max_rounds = parse(key, value)?,
            ("driver", "device_max_rounds") => self.driver.device_max_rounds = parse(key, value)?,
            ("driver", "poll_interval_ms") => self.driver.poll_interval_ms = parse(key, value)?,
            ("driver", "peer_timeout_ms") => self.driver.peer_timeout_ms = parse(key, value)?,
            ("backup", "ack_timeout_ms") => self.backup.ack_timeout_ms = parse(key, value)?,
            ("backup", "ack_poll_interval_ms") => {
                self.backup.ack_poll_interval_ms = parse(key, value)?
            }
            ("backup", "coordinator_share_index") => {
                self.backup.coordinator_share_index = parse(key, value)?
            }
            ("backup", "third_party_share_index") => {
                self.backup.third_party_share_index = parse(key, value)?
            }
            ("backup", "default_threshold") => self.backup.default_threshold = parse(key, value)?,
            ("backup", "default_share_count") => {
                self.backup.default_share_count = parse(key, value)?
            }
            ("recovery", "api_base_url") => self.recovery.api_base_url = optional(value),
            ("recovery", "fragment_host_url") => self.recovery.fragment_host_url = optional(value),
            ("recovery", "fragment_host_token") => {
                self.recovery.fragment_host_token = optional(value)
            }
            ("recovery", "metadata_key") => self.recovery.metadata_key = value.to_string(),
            ("logging", "level") => self.logging.level = value.to_string(),
            ("logging", "json") => self.logging.json = parse(key, value)?,
            ("logging", "with_target") => self.logging.with_target = parse(key, value)?,
            _ => return Err(CoreError::config(format!("unknown config key {key}"))),
        }
        Ok(())
    }

    /// Reject settings the coordination layer cannot run with
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;

        let driver = &self.driver;
        if driver.dual_max_rounds == 0
            || driver.server_max_rounds == 0
            || driver.device_max_rounds == 0
        {
            return Err(CoreError::config("round bounds must be positive"));
        }
        if driver.poll_interval_ms == 0 {
            return Err(CoreError::config("driver.poll_interval_ms must be positive"));
        }

        let backup = &self.backup;
        if backup.ack_poll_interval_ms == 0 {
            return Err(CoreError::config("backup.ack_poll_interval_ms must be positive"));
        }
        if backup.default_threshold == 0 {
            return Err(CoreError::config("backup.default_threshold must be positive"));
        }
        if backup.default_threshold > backup.default_share_count {
            return Err(CoreError::config(format!(
                "backup.default_threshold {} exceeds default_share_count {}",
                backup.default_threshold, backup.default_share_count
            )));
        }
        if self.recovery.metadata_key.is_empty() {
            return Err(CoreError::config("recovery.metadata_key must not be empty"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CoreError::config(format!("invalid value for {key}: {e}")))
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
