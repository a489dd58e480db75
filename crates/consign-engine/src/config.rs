//! Engine configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                     | Default      |
//! |------------------------------|--------------|
//! | `CONSIGN_DATABASE_PATH`      | `consign.db` |
//! | `CONSIGN_DB_MAX_CONNECTIONS` | `5`          |
//! | `CONSIGN_DEFAULT_PAGE_SIZE`  | `20`         |
//! | `CONSIGN_MAX_PAGE_SIZE`      | `100`        |
//! | `CONSIGN_EVENT_BUFFER`       | `256`        |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use consign_db::DbConfig;

/// Settlement engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub db_max_connections: u32,

    /// Page size when a listing does not ask for one
    pub default_page_size: u32,

    /// Upper bound on any requested page size
    pub max_page_size: u32,

    /// Capacity of the channel event publisher
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("consign.db"),
            db_max_connections: 5,
            default_page_size: 20,
            max_page_size: 100,
            event_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            database_path: lookup("CONSIGN_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            db_max_connections: parse_or(&lookup, "CONSIGN_DB_MAX_CONNECTIONS", defaults.db_max_connections)?,

            default_page_size: parse_or(&lookup, "CONSIGN_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,

            max_page_size: parse_or(&lookup, "CONSIGN_MAX_PAGE_SIZE", defaults.max_page_size)?,

            event_buffer: parse_or(&lookup, "CONSIGN_EVENT_BUFFER", defaults.event_buffer)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("CONSIGN_DB_MAX_CONNECTIONS".to_string()));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue("CONSIGN_DEFAULT_PAGE_SIZE".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::InvalidValue("CONSIGN_EVENT_BUFFER".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Inconsistent(format!(
                "default page size {} exceeds max page size {}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    /// Database settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, PathBuf::from("consign.db"));
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CONSIGN_DATABASE_PATH", "/var/lib/consign/prod.db"),
            ("CONSIGN_MAX_PAGE_SIZE", "250"),
            ("CONSIGN_DEFAULT_PAGE_SIZE", " 50 "),
        ]))
        .unwrap();

        assert_eq!(config.max_page_size, 250);
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.db_config().database_path, PathBuf::from("/var/lib/consign/prod.db"));
    }

    #[test]
    fn test_invalid_number() {
        let err = EngineConfig::from_lookup(lookup(&[("CONSIGN_EVENT_BUFFER", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key) if key == "CONSIGN_EVENT_BUFFER"));
    }

    #[test]
    fn test_default_page_above_max() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("CONSIGN_DEFAULT_PAGE_SIZE", "200"),
            ("CONSIGN_MAX_PAGE_SIZE", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }
}
