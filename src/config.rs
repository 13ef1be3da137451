//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub instance: InstanceConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "events.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://events.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Federation tuning
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Per-recipient delivery timeout in seconds
    pub delivery_timeout_seconds: u64,
    /// Concurrent delivery ceiling for one broadcast
    pub max_parallel_deliveries: usize,
    /// TTL for cached remote public keys in seconds
    pub key_cache_ttl_seconds: u64,
    /// Allow key fetches to loopback/private destinations.
    /// Only for local development and tests; never enable in production.
    #[serde(default)]
    pub allow_private_destinations: bool,
    /// Inbox requests allowed per remote domain per window
    pub inbox_rate_limit: u32,
    /// Rate limit window in seconds
    pub inbox_rate_window_seconds: u64,
    /// Interval between expiry sweeps in seconds
    pub expiry_sweep_interval_seconds: u64,
}

/// Instance metadata
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub title: String,
    pub description: String,
    pub contact_email: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format ("pretty" or "json")
    pub format: String,
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// # Precedence (lowest to highest)
    /// 1. Built-in defaults
    /// 2. config/default.toml
    /// 3. config/local.toml
    /// 4. CONVENE__* environment variables
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "convene.db")?
            .set_default("federation.delivery_timeout_seconds", 10)?
            .set_default("federation.max_parallel_deliveries", 10)?
            .set_default("federation.key_cache_ttl_seconds", 3600)?
            .set_default("federation.allow_private_destinations", false)?
            .set_default("federation.inbox_rate_limit", 100)?
            .set_default("federation.inbox_rate_window_seconds", 60)?
            .set_default("federation.expiry_sweep_interval_seconds", 3600)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (CONVENE_*)
            .add_source(
                Environment::with_prefix("CONVENE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate loaded configuration
    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.server.domain.is_empty() {
            return Err(crate::error::AppError::Config(
                "server.domain must not be empty".to_string(),
            ));
        }

        match self.server.protocol.as_str() {
            "http" | "https" => {}
            other => {
                return Err(crate::error::AppError::Config(format!(
                    "server.protocol must be http or https, got: {}",
                    other
                )));
            }
        }

        if self.federation.max_parallel_deliveries == 0 {
            return Err(crate::error::AppError::Config(
                "federation.max_parallel_deliveries must be at least 1".to_string(),
            ));
        }

        if self.federation.delivery_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "federation.delivery_timeout_seconds must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(protocol: &str, domain: &str) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: domain.to_string(),
                protocol: protocol.to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("test.db"),
            },
            federation: FederationConfig {
                delivery_timeout_seconds: 10,
                max_parallel_deliveries: 10,
                key_cache_ttl_seconds: 3600,
                allow_private_destinations: false,
                inbox_rate_limit: 100,
                inbox_rate_window_seconds: 60,
                expiry_sweep_interval_seconds: 3600,
            },
            instance: InstanceConfig {
                title: "Test".to_string(),
                description: "Test instance".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn base_url_joins_protocol_and_domain() {
        let config = test_config("https", "events.example.com");
        assert_eq!(config.server.base_url(), "https://events.example.com");
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let config = test_config("gopher", "events.example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_domain() {
        let config = test_config("https", "");
        assert!(config.validate().is_err());
    }
}
