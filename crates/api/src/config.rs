//! Process configuration, read from the environment (and `.env` if present).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use branchpos_infra::command_dispatcher::DEFAULT_MAX_ATTEMPTS;
use branchpos_observability::{LogFormat, LogSettings};

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Where events are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub store: StoreBackend,
    /// `None` disables the background sweep (`POST /reservations/expire` still works).
    pub reservation_sweep_interval: Option<Duration>,
    pub transaction_max_attempts: u32,
    pub log: LogSettings,
}

impl AppConfig {
    /// In-memory configuration with background sweeping off. Used by tests
    /// and local tooling.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            store: StoreBackend::InMemory,
            reservation_sweep_interval: None,
            transaction_max_attempts: DEFAULT_MAX_ATTEMPTS,
            log: LogSettings::default(),
        }
    }

    /// Load `.env` (if any), then read the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// | key | default |
    /// |-----|---------|
    /// | `BIND_ADDR` | `0.0.0.0:8080` |
    /// | `JWT_SECRET` | insecure dev secret (warns) |
    /// | `USE_PERSISTENT_STORES` | `false` |
    /// | `DATABASE_URL` | required when persistent |
    /// | `RESERVATION_SWEEP_INTERVAL_SECS` | `60` (`0` disables) |
    /// | `TRANSACTION_MAX_ATTEMPTS` | `5` |
    /// | `LOG_FORMAT` | `json` (`pretty` for humans) |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let persistent = parse_or(&lookup, "USE_PERSISTENT_STORES", false)?;
        let store = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        let sweep_secs: u64 = parse_or(&lookup, "RESERVATION_SWEEP_INTERVAL_SECS", 60)?;
        let reservation_sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let transaction_max_attempts: u32 = parse_or(&lookup, "TRANSACTION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if transaction_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "TRANSACTION_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let log = LogSettings {
            format: lookup("LOG_FORMAT").map(|v| LogFormat::parse(&v)).unwrap_or_default(),
            ..LogSettings::default()
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            store,
            reservation_sweep_interval,
            transaction_max_attempts,
            log,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
