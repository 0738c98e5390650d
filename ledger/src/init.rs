//! Ledger initialization - creates the directory structure and config.
//!
//! Layout under LEDGER_ROOT:
//!
//! ```text
//! config.toml
//! data/
//!   labs.json
//!   patients.json
//!   ...
//! ```
//!
//! Table files are not created here; each one appears on first access.

use std::fs;

use tracing::info;

use crate::{Config, Error, Result};

/// Initialize a new ledger.
pub fn initialize(config: &Config) -> Result<()> {
    if is_initialized(config) {
        return Err(Error::AlreadyInitialized(config.ledger_root.clone()));
    }

    fs::create_dir_all(&config.ledger_root)?;
    fs::create_dir_all(config.data_dir())?;
    config.save()?;

    info!(root = %config.ledger_root.display(), "initialized ledger");
    Ok(())
}

/// Check if a ledger has been initialized at this location.
pub fn is_initialized(config: &Config) -> bool {
    config.config_path().exists() && config.data_dir().is_dir()
}
