//! Catalog service configuration.

use std::env;

use common::DatabaseConfig;
use domain::SYSTEM_CALLER;

/// Catalog service configuration.
#[derive(Debug, Clone)]
pub struct CatalogServiceConfig {
    /// Connection pool settings
    pub database: DatabaseConfig,
    /// Caller identity used when the CLI stamps audit fields
    pub actor: String,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

impl CatalogServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = DatabaseConfig::default();

        Self {
            database: DatabaseConfig {
                url: env::var("CATALOG_DATABASE_URL")
                    .or_else(|_| env::var("DATABASE_URL"))
                    .unwrap_or(defaults.url),
                max_connections: env_parse("CATALOG_DB_MAX_CONNECTIONS")
                    .unwrap_or(defaults.max_connections),
                min_connections: env_parse("CATALOG_DB_MIN_CONNECTIONS")
                    .unwrap_or(defaults.min_connections),
                connect_timeout_secs: env_parse("CATALOG_DB_CONNECT_TIMEOUT_SECS")
                    .unwrap_or(defaults.connect_timeout_secs),
                sql_logging: env_parse("CATALOG_DB_SQL_LOGGING").unwrap_or(defaults.sql_logging),
            },
            actor: env::var("CATALOG_ACTOR").unwrap_or_else(|_| SYSTEM_CALLER.to_string()),
        }
    }
}

impl Default for CatalogServiceConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            actor: SYSTEM_CALLER.to_string(),
        }
    }
}
