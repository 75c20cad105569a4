//! Application configuration loaded from environment variables.

use std::str::FromStr;

use crate::errors::{Result, ServiceError};

/// Where campaign records and transactions go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    /// JSON-RPC gateway at the given URL.
    Rpc(String),
    /// Process-local ledger; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database holding the user directory
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    pub ledger: LedgerBackend,
    /// Upper bound on a single ledger call
    pub ledger_timeout_secs: u64,
    /// Lifetime of a cached campaign view
    pub cache_ttl_secs: u64,
    /// Upper bound on cached campaign views
    pub cache_max_entries: u64,
    /// Directory of `{username}.key` signing keys
    pub keystore_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ledger = match get("LEDGER_BACKEND").as_deref().unwrap_or("rpc") {
            "rpc" => LedgerBackend::Rpc(get("LEDGER_RPC_URL").ok_or_else(|| {
                ServiceError::Config(
                    "LEDGER_RPC_URL environment variable is required".to_string(),
                )
            })?),
            "memory" => LedgerBackend::Memory,
            other => {
                return Err(ServiceError::Config(format!(
                    "Unknown LEDGER_BACKEND {other:?}"
                )))
            }
        };

        Ok(Config {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./campaigns.db".to_string()),
            api_port: parsed(&get, "API_PORT", 3001)?,
            ledger,
            ledger_timeout_secs: parsed(&get, "LEDGER_TIMEOUT_SECS", 30)?,
            cache_ttl_secs: parsed(&get, "CACHE_TTL_SECS", 600)?,
            cache_max_entries: parsed(&get, "CACHE_MAX_ENTRIES", 10_000)?,
            keystore_dir: get("KEYSTORE_DIR").unwrap_or_else(|| "./keystore".to_string()),
        })
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServiceError::Config(format!("Invalid {key}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("LEDGER_RPC_URL", "http://ledger:8545")]).unwrap();
        assert_eq!(config.database_url, "sqlite:./campaigns.db");
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.ledger, LedgerBackend::Rpc("http://ledger:8545".into()));
        assert_eq!(config.ledger_timeout_secs, 30);
        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.cache_max_entries, 10_000);
        assert_eq!(config.keystore_dir, "./keystore");
    }

    #[test]
    fn rpc_backend_needs_a_url() {
        assert!(matches!(load(&[]), Err(ServiceError::Config(_))));
    }

    #[test]
    fn memory_backend_needs_nothing_else() {
        let config = load(&[("LEDGER_BACKEND", "memory"), ("CACHE_TTL_SECS", "5")]).unwrap();
        assert_eq!(config.ledger, LedgerBackend::Memory);
        assert_eq!(config.cache_ttl_secs, 5);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(load(&[("LEDGER_BACKEND", "carrier-pigeon")]).is_err());
        assert!(load(&[("LEDGER_BACKEND", "memory"), ("API_PORT", "http")]).is_err());
        assert!(load(&[("LEDGER_BACKEND", "memory"), ("CACHE_MAX_ENTRIES", "-1")]).is_err());
    }
}
