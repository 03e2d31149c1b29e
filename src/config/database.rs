//! Storage configuration.
//!
//! The backend is selected HERE, once, at process start; everything
//! downstream receives injected repository trait objects and never
//! branches on the storage choice.

use serde::Deserialize;

use super::error::ValidationError;

/// Which repository implementation set to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL via sqlx (production).
    Postgres,
    /// In-process maps (tests, single-node development).
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::Memory
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Storage backend to use.
    #[serde(default)]
    pub backend: StorageBackend,

    /// PostgreSQL connection URL (required for the postgres backend).
    pub url: Option<String>,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == StorageBackend::Postgres {
            match &self.url {
                None => return Err(ValidationError::DatabaseUrlRequired),
                Some(url) if !url.starts_with("postgres") => {
                    return Err(ValidationError::invalid(
                        "DATABASE__URL",
                        "expected a postgresql:// URL",
                    ))
                }
                Some(_) => {}
            }
        }
        if self.max_connections == 0 {
            return Err(ValidationError::invalid(
                "DATABASE__MAX_CONNECTIONS",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_needs_no_url() {
        assert!(DatabaseConfig::default().validate().is_ok());
    }

    #[test]
    fn postgres_backend_requires_url() {
        let config = DatabaseConfig {
            backend: StorageBackend::Postgres,
            url: None,
            max_connections: 10,
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::DatabaseUrlRequired)
        );
    }

    #[test]
    fn postgres_url_scheme_is_checked() {
        let config = DatabaseConfig {
            backend: StorageBackend::Postgres,
            url: Some("mysql://nope".to_string()),
            max_connections: 10,
        };
        assert!(config.validate().is_err());
    }
}
