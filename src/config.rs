//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::factory::PaymentFactoryConfig;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub providers: PaymentFactoryConfig,
    pub bin_lookup: BinLookupConfig,
    pub reconciliation: ReconciliationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Master key material for credential encryption.
#[derive(Clone)]
pub struct SecurityConfig {
    pub encryption_key: String,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("encryption_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BinLookupConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub stale_after_secs: u64,
    pub batch_size: i64,
    pub per_payment_timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            stale_after_secs: 900,
            batch_size: 100,
            per_payment_timeout_secs: 20,
            concurrency: 8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

fn var_or<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            security: SecurityConfig::from_env()?,
            providers: PaymentFactoryConfig::from_env()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            bin_lookup: BinLookupConfig::from_env()?,
            reconciliation: ReconciliationConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.security.validate()?;
        self.bin_lookup.validate()?;
        self.reconciliation.validate()?;
        self.logging.validate()?;

        if self.providers.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PROVIDER_TIMEOUT_SECS must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var_or("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            _ => return Err(ConfigError::InvalidValue("STORE_BACKEND".to_string())),
        };

        Ok(DatabaseConfig {
            backend,
            url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            max_connections: var_or("DB_MAX_CONNECTIONS", "20")?,
            min_connections: var_or("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: var_or("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Postgres && self.url.is_none() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SecurityConfig {
            encryption_key: env::var("ENCRYPTION_KEY")
                .map_err(|_| ConfigError::MissingVariable("ENCRYPTION_KEY".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.encryption_key.trim();
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidValue(
                "ENCRYPTION_KEY must be 64 hex characters".to_string(),
            ));
        }
        Ok(())
    }
}

impl BinLookupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(BinLookupConfig {
            url: env::var("BIN_LOOKUP_URL")
                .unwrap_or_else(|_| "https://lookup.binlist.net".to_string()),
            timeout_secs: var_or("BIN_LOOKUP_TIMEOUT_SECS", "3")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "BIN_LOOKUP_URL must be a valid URL".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "BIN_LOOKUP_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(())
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ReconciliationConfig {
            enabled: var_or("RECON_ENABLED", "true")?,
            interval_secs: var_or("RECON_INTERVAL_SECS", "300")?,
            stale_after_secs: var_or("RECON_STALE_AFTER_SECS", "900")?,
            batch_size: var_or("RECON_BATCH_SIZE", "100")?,
            per_payment_timeout_secs: var_or("RECON_PER_PAYMENT_TIMEOUT_SECS", "20")?,
            concurrency: var_or("RECON_CONCURRENCY", "8")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue("RECON_INTERVAL_SECS".to_string()));
        }
        if self.batch_size <= 0 {
            return Err(ConfigError::InvalidValue("RECON_BATCH_SIZE".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue("RECON_CONCURRENCY".to_string()));
        }
        if self.per_payment_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RECON_PER_PAYMENT_TIMEOUT_SECS".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let mut config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            url: None,
            max_connections: 20,
            min_connections: 5,
            connection_timeout: 30,
            idle_timeout: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(_))
        ));

        config.backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_encryption_key_must_be_hex() {
        let short = SecurityConfig {
            encryption_key: "abcd".to_string(),
        };
        assert!(short.validate().is_err());

        let valid = SecurityConfig {
            encryption_key: "ab".repeat(32),
        };
        assert!(valid.validate().is_ok());
        assert!(!format!("{:?}", valid).contains("abab"));
    }

    #[test]
    fn test_reconciliation_defaults_are_valid() {
        let config = ReconciliationConfig::default();
        assert_eq!(config.stale_after_secs, 15 * 60);
        assert!(config.validate().is_ok());
    }
}
