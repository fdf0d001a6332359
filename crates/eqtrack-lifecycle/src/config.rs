//! # Engine Configuration
//!
//! | Field | Env var | Default |
//! |---|---|---|
//! | `code_utc_offset_minutes` | `EQTRACK_CODE_UTC_OFFSET_MINUTES` | `0` |
//! | `invalidate_cache` | `EQTRACK_INVALIDATE_CACHE` | `true` |
//!
//! The offset decides which calendar day a document code belongs to. It must
//! lie within ±14 hours.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use eqtrack_core::offset_from_minutes;

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The code offset is outside ±14h.
    #[error("code utc offset {minutes} minutes is outside ±14h")]
    OffsetOutOfRange {
        /// Rejected value.
        minutes: i32,
    },

    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Lifecycle engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minutes east of UTC used to date document codes.
    pub code_utc_offset_minutes: i32,
    /// Whether committed operations emit cache-invalidation signals.
    pub invalidate_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            code_utc_offset_minutes: 0,
            invalidate_cache: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the `EQTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value when set.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        const OFFSET: &str = "EQTRACK_CODE_UTC_OFFSET_MINUTES";
        const INVALIDATE: &str = "EQTRACK_INVALIDATE_CACHE";

        if let Some(raw) = lookup(OFFSET) {
            self.code_utc_offset_minutes =
                raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                    name: OFFSET,
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup(INVALIDATE) {
            self.invalidate_cache = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: INVALIDATE,
                        value: raw,
                    })
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ConfigError::OffsetOutOfRange {
                minutes: self.code_utc_offset_minutes,
            });
        }
        Ok(())
    }

    /// The code offset as a `FixedOffset`.
    pub fn code_offset(&self) -> Result<FixedOffset, ConfigError> {
        self.validate()?;
        offset_from_minutes(self.code_utc_offset_minutes).map_err(|_| {
            ConfigError::OffsetOutOfRange {
                minutes: self.code_utc_offset_minutes,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.code_utc_offset_minutes, 0);
        assert!(config.invalidate_cache);
        assert_eq!(config.code_offset().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .with_env_overrides(env(&[
                ("EQTRACK_CODE_UTC_OFFSET_MINUTES", "420"),
                ("EQTRACK_INVALIDATE_CACHE", "off"),
            ]))
            .unwrap();
        assert_eq!(config.code_utc_offset_minutes, 420);
        assert!(!config.invalidate_cache);
        assert_eq!(config.code_offset().unwrap().local_minus_utc(), 420 * 60);
    }

    #[test]
    fn test_offset_range() {
        let err = EngineConfig::default()
            .with_env_overrides(env(&[("EQTRACK_CODE_UTC_OFFSET_MINUTES", "900")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::OffsetOutOfRange { minutes: 900 });
        assert!(EngineConfig {
            code_utc_offset_minutes: -840,
            invalidate_cache: true
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_malformed_vars() {
        assert!(matches!(
            EngineConfig::default()
                .with_env_overrides(env(&[("EQTRACK_CODE_UTC_OFFSET_MINUTES", "seven")])),
            Err(ConfigError::InvalidVar { .. })
        ));
        assert!(matches!(
            EngineConfig::default().with_env_overrides(env(&[("EQTRACK_INVALIDATE_CACHE", "maybe")])),
            Err(ConfigError::InvalidVar { .. })
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"code_utc_offset_minutes": -300}"#).unwrap();
        assert_eq!(config.code_utc_offset_minutes, -300);
        assert!(config.invalidate_cache);
    }
}
