//! Environment configuration.

use std::env;

use arbor_db::DbConfig;
use arbor_engine::EngineConfig;
use tracing::warn;

/// Everything the server reads at startup.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub engine: EngineConfig,
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

impl ServerConfig {
    /// Load `.env` if present, then read `ARBOR_*` variables over the
    /// defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let db = DbConfig {
            url: env_or("ARBOR_DB_URL", defaults.db.url),
            namespace: env_or("ARBOR_DB_NAMESPACE", defaults.db.namespace),
            database: env_or("ARBOR_DB_DATABASE", defaults.db.database),
            username: env_or("ARBOR_DB_USERNAME", defaults.db.username),
            password: env_or("ARBOR_DB_PASSWORD", defaults.db.password),
        };

        let mut engine = defaults.engine;
        if let Ok(raw) = env::var("ARBOR_REFRESH_QUEUE_CAPACITY") {
            match raw.parse::<usize>() {
                Ok(capacity) if capacity > 0 => engine.refresh_queue_capacity = capacity,
                _ => warn!(
                    value = %raw,
                    default = engine.refresh_queue_capacity,
                    "Invalid ARBOR_REFRESH_QUEUE_CAPACITY, using default"
                ),
            }
        }

        Self { db, engine }
    }
}
