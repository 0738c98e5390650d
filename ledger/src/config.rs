//! Configuration for the ledger.
//!
//! LEDGER_ROOT resolution order:
//! 1. Explicit path passed to Config::with_root() / Config::load_from()
//! 2. LEDGER_ROOT environment variable
//! 3. Platform data directory (e.g. ~/.local/share/clinic-ledger)
//!
//! Remote credentials may also come from `LEDGER_REMOTE_URL` and
//! `LEDGER_REMOTE_KEY`, which override the config file when set. The
//! environment is only consulted by [`Config::load`]; the store itself works
//! from the `Config` it is handed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::store::atomic;
use crate::table::{TableSpec, BUILTIN_TABLES};
use crate::{Error, Result};

pub const ROOT_VAR: &str = "LEDGER_ROOT";
pub const REMOTE_URL_VAR: &str = "LEDGER_REMOTE_URL";
pub const REMOTE_KEY_VAR: &str = "LEDGER_REMOTE_KEY";

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for all ledger data.
    pub ledger_root: PathBuf,

    /// Directory holding table files (default: `<root>/data`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Remote database connection.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Table overrides and additional tables, keyed by table name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tables: BTreeMap<String, TableSpec>,
}

/// Remote database connection settings.
///
/// The remote tier is used only when both `endpoint` and `key` are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// API key sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Endpoint and key, if both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let endpoint = self.endpoint.as_deref().filter(|s| !s.trim().is_empty())?;
        let key = self.key.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((endpoint, key))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    /// Create a new config with the given LEDGER_ROOT.
    pub fn with_root(ledger_root: impl Into<PathBuf>) -> Self {
        Self {
            ledger_root: ledger_root.into(),
            data_dir: None,
            remote: RemoteConfig::default(),
            tables: BTreeMap::new(),
        }
    }

    /// Create a config using default LEDGER_ROOT resolution.
    pub fn default_location() -> Result<Self> {
        let ledger_root = resolve_ledger_root()?;
        Ok(Self::with_root(ledger_root))
    }

    /// Load config from LEDGER_ROOT/config.toml, with environment overrides.
    pub fn load() -> Result<Self> {
        let ledger_root = resolve_ledger_root()?;
        let mut config = Self::load_from(&ledger_root)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load config from a specific LEDGER_ROOT, or defaults if no file exists.
    pub fn load_from(ledger_root: &Path) -> Result<Self> {
        let config_path = ledger_root.join("config.toml");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
            // Ensure ledger_root matches the actual location
            config.ledger_root = ledger_root.to_path_buf();
            Ok(config)
        } else {
            Ok(Self::with_root(ledger_root))
        }
    }

    /// Overlay remote settings from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(REMOTE_URL_VAR).filter(|v| !v.is_empty()) {
            self.remote.endpoint = Some(url);
        }
        if let Some(key) = lookup(REMOTE_KEY_VAR).filter(|v| !v.is_empty()) {
            self.remote.key = Some(key);
        }
    }

    /// Save config to LEDGER_ROOT/config.toml.
    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        atomic::replace_file(&self.config_path(), contents.as_bytes())?;
        Ok(())
    }

    // Path helpers

    /// Path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.ledger_root.join("config.toml")
    }

    /// Path to the directory holding table files.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.ledger_root.join(dir),
            None => self.ledger_root.join("data"),
        }
    }

    /// Path to a table's sheet file.
    pub fn table_path(&self, spec: &TableSpec) -> PathBuf {
        self.data_dir().join(spec.file_name())
    }

    // Tables

    /// Resolve a table by name: configured entries first, then built-ins.
    pub fn table_spec(&self, name: &str) -> Result<TableSpec> {
        if let Some(spec) = self.tables.get(name) {
            let mut spec = spec.clone();
            spec.name = name.to_string();
            return Ok(spec);
        }
        TableSpec::builtin(name).ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Every known table name: built-ins first, then configured extras.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_TABLES.iter().map(|s| s.to_string()).collect();
        for name in self.tables.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

/// Resolve LEDGER_ROOT using the standard resolution order.
fn resolve_ledger_root() -> Result<PathBuf> {
    // 1. Environment variable
    if let Ok(path) = std::env::var(ROOT_VAR) {
        return Ok(PathBuf::from(path));
    }

    // 2. Platform data directory (via directories crate)
    if let Some(proj_dirs) = ProjectDirs::from("", "", "clinic-ledger") {
        return Ok(proj_dirs.data_dir().to_path_buf());
    }

    // 3. Fallback to ~/.local/share/clinic-ledger
    let home = std::env::var("HOME")
        .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;
    Ok(PathBuf::from(home).join(".local/share/clinic-ledger"))
}
