//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/fabrik";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default import worker poll interval in seconds.
pub const DEFAULT_IMPORT_POLL_INTERVAL_SECS: u64 = 5;

/// Default inter-batch throttle in milliseconds.
pub const DEFAULT_IMPORT_BATCH_THROTTLE_MS: u64 = 50;

/// Default stale-job cutoff in seconds (10 minutes).
pub const DEFAULT_IMPORT_STALE_CUTOFF_SECS: u64 = 600;

/// Default hard per-job runtime bound in seconds (6 hours).
pub const DEFAULT_IMPORT_MAX_RUNTIME_SECS: u64 = 6 * 3600;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub import: ImportConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Import-engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    pub poll_interval_secs: u64,
    pub batch_throttle_ms: u64,
    pub stale_cutoff_secs: u64,
    pub max_runtime_secs: u64,
}

impl ImportConfig {
    pub fn to_worker_config(&self) -> crate::import::WorkerConfig {
        crate::import::WorkerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            batch_throttle: Duration::from_millis(self.batch_throttle_ms),
            stale_cutoff: Duration::from_secs(self.stale_cutoff_secs),
            max_runtime: Duration::from_secs(self.max_runtime_secs),
            ..Default::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("FABRIK_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parsed("FABRIK_PORT", DEFAULT_SERVER_PORT),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parsed(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_parsed(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            import: ImportConfig {
                poll_interval_secs: env_parsed(
                    "IMPORT_POLL_INTERVAL_SECS",
                    DEFAULT_IMPORT_POLL_INTERVAL_SECS,
                ),
                batch_throttle_ms: env_parsed(
                    "IMPORT_BATCH_THROTTLE_MS",
                    DEFAULT_IMPORT_BATCH_THROTTLE_MS,
                ),
                stale_cutoff_secs: env_parsed(
                    "IMPORT_STALE_CUTOFF_SECS",
                    DEFAULT_IMPORT_STALE_CUTOFF_SECS,
                ),
                max_runtime_secs: env_parsed(
                    "IMPORT_MAX_RUNTIME_SECS",
                    DEFAULT_IMPORT_MAX_RUNTIME_SECS,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("FABRIK_PORT must be non-zero");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be non-zero");
        }
        if self.import.poll_interval_secs == 0 {
            anyhow::bail!("IMPORT_POLL_INTERVAL_SECS must be non-zero");
        }
        if self.import.max_runtime_secs == 0 {
            anyhow::bail!("IMPORT_MAX_RUNTIME_SECS must be non-zero");
        }
        Ok(())
    }
}
