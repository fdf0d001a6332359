//! # CLI Configuration
//!
//! Optional YAML file passed with `--config`:
//!
//! ```yaml
//! engine:
//!   code_utc_offset_minutes: 420
//!   invalidate_cache: true
//! database:
//!   url: postgres://eqtrack@localhost/eqtrack
//!   max_connections: 10
//! ```
//!
//! Environment variables win over the file: `EQTRACK_*` for the engine
//! section, `DATABASE_URL` for the database URL.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use eqtrack_db::DbConfig;
use eqtrack_lifecycle::EngineConfig;

/// Top-level configuration of the `eqtrack` binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub database: Option<DbConfig>,
}

impl CliConfig {
    /// Load `path` (if given) and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Load `path` (if given) and apply overrides from `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };

        config.engine = config
            .engine
            .with_env_overrides(&lookup)
            .context("engine configuration")?;

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            config.database = Some(match config.database.take() {
                Some(db) => DbConfig { url, ..db },
                None => DbConfig::new(url),
            });
        }
        Ok(config)
    }

    /// The database section, required by every command.
    pub fn database(&self) -> Result<&DbConfig> {
        self.database
            .as_ref()
            .context("no database configured: set DATABASE_URL or `database.url` in --config")
    }
}
