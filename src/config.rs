//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Which durable backend holds receipts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStoreKind {
    Sqlite,
    Postgres,
}

impl FromStr for ReceiptStoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(ReceiptStoreKind::Sqlite),
            "postgres" | "postgresql" => Ok(ReceiptStoreKind::Postgres),
            _ => Err(ConfigError::InvalidValue("RECEIPT_STORE_TYPE")),
        }
    }
}

/// Receipt system configuration
#[derive(Debug, Clone)]
pub struct ReceiptStoreConfig {
    pub kind: ReceiptStoreKind,

    /// SQLite database file (`:memory:` for a throwaway store)
    pub path: String,

    /// Postgres connection URL
    pub url: Option<String>,

    /// Maximum connections in the store's pool
    pub max_connections: u32,

    /// Prefix for the receipt table, for instances sharing a database
    pub table_prefix: String,

    /// Create the table on startup if missing
    pub auto_install: bool,
}

impl Default for ReceiptStoreConfig {
    fn default() -> Self {
        Self {
            kind: ReceiptStoreKind::Sqlite,
            path: "receipts.db".to_string(),
            url: None,
            max_connections: 5,
            table_prefix: String::new(),
            auto_install: true,
        }
    }
}

/// Longest accepted confirm code lifetime (one week)
pub const MAX_CODE_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

/// Where confirm codes are held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmCodeKind {
    #[default]
    InMemory,
}

impl FromStr for ConfirmCodeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-memory" => Ok(ConfirmCodeKind::InMemory),
            _ => Err(ConfigError::InvalidValue("CONFIRM_CODE_TYPE")),
        }
    }
}

/// Confirm code manager configuration
#[derive(Debug, Clone)]
pub struct ConfirmCodeConfig {
    pub kind: ConfirmCodeKind,
    /// Code lifetime, 1..=MAX_CODE_TIMEOUT_MINUTES
    pub default_timeout_minutes: i64,
    pub code_length: usize,
    /// Wrong guesses allowed before the code is burned; 0 disables the limit
    pub max_attempts: u32,
}

impl Default for ConfirmCodeConfig {
    fn default() -> Self {
        Self {
            kind: ConfirmCodeKind::InMemory,
            default_timeout_minutes: 5,
            code_length: 6,
            max_attempts: 5,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub receipt_store: ReceiptStoreConfig,
    pub confirm_code: ConfirmCodeConfig,

    /// Seconds between purge runs in the maintenance daemon
    pub purge_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReceiptStoreConfig::default();

        let kind = match lookup("RECEIPT_STORE_TYPE") {
            Some(value) => value.trim().parse()?,
            None => defaults.kind,
        };

        let url = lookup("RECEIPT_STORE_URL").filter(|v| !v.trim().is_empty());
        if kind == ReceiptStoreKind::Postgres && url.is_none() {
            return Err(ConfigError::MissingEnv("RECEIPT_STORE_URL"));
        }

        let table_prefix = lookup("RECEIPT_TABLE_PREFIX").unwrap_or_default();
        if !table_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue("RECEIPT_TABLE_PREFIX"));
        }

        let receipt_store = ReceiptStoreConfig {
            kind,
            path: lookup("RECEIPT_STORE_PATH").unwrap_or(defaults.path),
            url,
            max_connections: parse_or(
                &lookup,
                "RECEIPT_STORE_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            table_prefix,
            auto_install: parse_or(&lookup, "RECEIPT_STORE_AUTO_INSTALL", defaults.auto_install)?,
        };

        let code_defaults = ConfirmCodeConfig::default();
        let confirm_code = ConfirmCodeConfig {
            kind: match lookup("CONFIRM_CODE_TYPE") {
                Some(value) => value.trim().parse()?,
                None => code_defaults.kind,
            },
            default_timeout_minutes: parse_or(
                &lookup,
                "CONFIRM_CODE_TIMEOUT_MINUTES",
                code_defaults.default_timeout_minutes,
            )?,
            code_length: parse_or(&lookup, "CONFIRM_CODE_LENGTH", code_defaults.code_length)?,
            max_attempts: parse_or(&lookup, "CONFIRM_CODE_MAX_ATTEMPTS", code_defaults.max_attempts)?,
        };
        if !(1..=MAX_CODE_TIMEOUT_MINUTES).contains(&confirm_code.default_timeout_minutes) {
            return Err(ConfigError::InvalidValue("CONFIRM_CODE_TIMEOUT_MINUTES"));
        }

        let purge_interval_secs = parse_or(&lookup, "PURGE_INTERVAL_SECS", 300u64)?;
        if purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("PURGE_INTERVAL_SECS"));
        }

        Ok(Self {
            receipt_store,
            confirm_code,
            purge_interval_secs,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.receipt_store.kind, ReceiptStoreKind::Sqlite);
        assert_eq!(config.receipt_store.path, "receipts.db");
        assert!(config.receipt_store.auto_install);
        assert_eq!(config.confirm_code.kind, ConfirmCodeKind::InMemory);
        assert_eq!(config.confirm_code.default_timeout_minutes, 5);
        assert_eq!(config.receipt_store.table_prefix, "");
        assert_eq!(config.purge_interval_secs, 300);
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = load(&[("RECEIPT_STORE_TYPE", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("RECEIPT_STORE_URL")));

        let config = load(&[
            ("RECEIPT_STORE_TYPE", "postgres"),
            ("RECEIPT_STORE_URL", "postgres://localhost/gitus"),
            ("RECEIPT_TABLE_PREFIX", "gitus_"),
        ])
        .unwrap();
        assert_eq!(config.receipt_store.kind, ReceiptStoreKind::Postgres);
        assert_eq!(config.receipt_store.table_prefix, "gitus_");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("RECEIPT_STORE_TYPE", "redis")]),
            Err(ConfigError::InvalidValue("RECEIPT_STORE_TYPE"))
        ));
        assert!(matches!(
            load(&[("RECEIPT_TABLE_PREFIX", "a-b")]),
            Err(ConfigError::InvalidValue("RECEIPT_TABLE_PREFIX"))
        ));
        assert!(matches!(
            load(&[("CONFIRM_CODE_TIMEOUT_MINUTES", "0")]),
            Err(ConfigError::InvalidValue("CONFIRM_CODE_TIMEOUT_MINUTES"))
        ));
        assert!(matches!(
            load(&[("CONFIRM_CODE_MAX_ATTEMPTS", "many")]),
            Err(ConfigError::InvalidValue("CONFIRM_CODE_MAX_ATTEMPTS"))
        ));
        assert!(matches!(
            load(&[("CONFIRM_CODE_TYPE", "redis")]),
            Err(ConfigError::InvalidValue("CONFIRM_CODE_TYPE"))
        ));
    }

    #[test]
    fn test_code_timeout_is_bounded() {
        for value in ["1000000000000", "10081"] {
            assert!(matches!(
                load(&[("CONFIRM_CODE_TIMEOUT_MINUTES", value)]),
                Err(ConfigError::InvalidValue("CONFIRM_CODE_TIMEOUT_MINUTES"))
            ));
        }

        let config = load(&[("CONFIRM_CODE_TIMEOUT_MINUTES", "10080")]).unwrap();
        assert_eq!(config.confirm_code.default_timeout_minutes, MAX_CODE_TIMEOUT_MINUTES);
    }
}
