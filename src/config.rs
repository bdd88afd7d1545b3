//! Dashboard configuration store.
//!
//! The dashboard's display filters, bind address, and refresh interval live
//! in a small JSON file (`config.json` by default):
//!
//! ```json
//! {
//!   "filters": {
//!     "hideSystemBeads": true,
//!     "hideEvents": true,
//!     "hideRigIdentity": true,
//!     "hideMaintenanceWisps": true,
//!     "hideHQBeads": true
//!   },
//!   "server": { "port": 9292, "host": "localhost" },
//!   "refreshInterval": 30000
//! }
//! ```
//!
//! The file is read on every access and never cached. A missing or
//! unparsable file is not an error: it reads as [`Config::default`].
//!
//! # Partial updates
//!
//! [`ConfigStore::update`] merges a [`ConfigUpdate`] into the stored config.
//! Scalars (`port`, `host`, `refreshInterval`) only change when the update
//! carries a non-zero / non-empty value. Filters are replaced as a group
//! whenever the update contains a `filters` object, since an omitted flag
//! cannot be told apart from an explicit `false`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const DEFAULT_PORT: u16 = 9292;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub filters: Filters,
    pub server: ServerConfig,
    /// Dashboard polling interval in milliseconds.
    pub refresh_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filters: Filters::default(),
            server: ServerConfig::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

/// Which bead categories the dashboard hides. All hidden by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    pub hide_system_beads: bool,
    pub hide_events: bool,
    pub hide_rig_identity: bool,
    pub hide_maintenance_wisps: bool,
    #[serde(rename = "hideHQBeads")]
    pub hide_hq_beads: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            hide_system_beads: true,
            hide_events: true,
            hide_rig_identity: true,
            hide_maintenance_wisps: true,
            hide_hq_beads: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Incoming partial config. Absent scalars deserialize to zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub filters: Option<FilterUpdate>,
    pub server: ServerUpdate,
    pub refresh_interval: u64,
}

/// Replacement filter set. Flags missing from the payload read as `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterUpdate {
    pub hide_system_beads: bool,
    pub hide_events: bool,
    pub hide_rig_identity: bool,
    pub hide_maintenance_wisps: bool,
    #[serde(rename = "hideHQBeads")]
    pub hide_hq_beads: bool,
}

impl From<FilterUpdate> for Filters {
    fn from(u: FilterUpdate) -> Self {
        Self {
            hide_system_beads: u.hide_system_beads,
            hide_events: u.hide_events,
            hide_rig_identity: u.hide_rig_identity,
            hide_maintenance_wisps: u.hide_maintenance_wisps,
            hide_hq_beads: u.hide_hq_beads,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerUpdate {
    pub port: u16,
    pub host: String,
}

impl ConfigUpdate {
    /// Parse an update payload. The payload must be a JSON object.
    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "config update must be a JSON object",
            ));
        }
        serde_json::from_value(value)
    }
}

impl Config {
    /// Apply a partial update in place.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if update.server.port != 0 {
            self.server.port = update.server.port;
        }
        if !update.server.host.is_empty() {
            self.server.host = update.server.host;
        }
        if update.refresh_interval != 0 {
            self.refresh_interval = update.refresh_interval;
        }
        if let Some(filters) = update.filters {
            self.filters = filters.into();
        }
    }
}

/// Read config from `path`, falling back to defaults on any failure.
pub fn read_config(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Config::default(),
    };
    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            Config::default()
        }
    }
}

/// Write config to `path` atomically (temp file in the same directory, then rename).
pub fn write_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let mut data = serde_json::to_vec_pretty(config)?;
    data.push(b'\n');

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("Failed to write config file: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace config file: {}", path.display()))?;
    Ok(())
}

/// Durable config with serialized updates.
///
/// Reads share the lock; an update holds it exclusively for the whole
/// read-merge-write, so concurrent updates never lose each other's fields.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Current config, or defaults if none is stored.
    pub async fn load(&self) -> Config {
        let _guard = self.lock.read().await;
        read_config(&self.path)
    }

    /// Merge `update` into the stored config, persist it, and return the result.
    pub async fn update(&self, update: ConfigUpdate) -> Result<Config> {
        let _guard = self.lock.write().await;
        let mut config = read_config(&self.path);
        config.merge(update);
        write_config(&self.path, &config)?;
        tracing::info!(path = %self.path.display(), "config updated");
        Ok(config)
    }
}
