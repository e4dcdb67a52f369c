//! Core configuration
//!
//! Loaded once from environment variables (and `.env` in the binary).

use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consistency core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Pool size for the relational mirror and ledger
    pub db_max_connections: u32,
    /// Max wait for a pooled connection
    pub db_acquire_timeout_secs: u64,
    /// CouchDB base URL, e.g. `http://localhost:5984`
    pub couchdb_url: String,
    pub couchdb_user: String,
    pub couchdb_password: String,
    pub couchdb_events_db: String,
    pub couchdb_photos_db: String,
    /// Fixed per-request timeout for the document store
    pub couchdb_timeout_secs: u64,
    /// Tokens granted to a synthesized legacy account
    pub default_token_allotment: i64,
    /// Bound on waiting for a ledger row lock
    pub ledger_lock_timeout_ms: u64,
    /// Mirror reconciliation interval; 0 disables the worker
    pub reconcile_interval_secs: u64,
    /// Event documents per reconciliation page
    pub reconcile_batch_size: usize,
    pub log_level: String,
    pub log_json: bool,
    /// Directory for rotated log files; console only when unset
    pub log_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".into(),
            database_url: "postgres://localhost/pictureme".into(),
            db_max_connections: 10,
            db_acquire_timeout_secs: 5,
            couchdb_url: "http://localhost:5984".into(),
            couchdb_user: "admin".into(),
            couchdb_password: String::new(),
            couchdb_events_db: "pictureme_events".into(),
            couchdb_photos_db: "pictureme_photos".into(),
            couchdb_timeout_secs: 10,
            default_token_allotment: 1000,
            ledger_lock_timeout_ms: 5000,
            reconcile_interval_secs: 0,
            reconcile_batch_size: 100,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                String::new()
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let defaults = Self::default();
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            db_max_connections: Self::parsed("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            db_acquire_timeout_secs: Self::parsed(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.db_acquire_timeout_secs,
            ),
            couchdb_url: std::env::var("COUCHDB_URL").unwrap_or(defaults.couchdb_url),
            couchdb_user: std::env::var("COUCHDB_USER").unwrap_or(defaults.couchdb_user),
            couchdb_password: Self::require_secret("COUCHDB_PASSWORD", &environment)?,
            couchdb_events_db: std::env::var("COUCHDB_DB_EVENTS")
                .unwrap_or(defaults.couchdb_events_db),
            couchdb_photos_db: std::env::var("COUCHDB_DB_PHOTOS")
                .unwrap_or(defaults.couchdb_photos_db),
            couchdb_timeout_secs: Self::parsed("COUCHDB_TIMEOUT_SECS", defaults.couchdb_timeout_secs),
            default_token_allotment: Self::parsed(
                "DEFAULT_TOKEN_ALLOTMENT",
                defaults.default_token_allotment,
            ),
            ledger_lock_timeout_ms: Self::parsed(
                "LEDGER_LOCK_TIMEOUT_MS",
                defaults.ledger_lock_timeout_ms,
            ),
            reconcile_interval_secs: Self::parsed(
                "RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
            reconcile_batch_size: Self::parsed("RECONCILE_BATCH_SIZE", defaults.reconcile_batch_size)
                .max(1),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: Self::parsed("LOG_JSON", defaults.log_json),
            log_dir: std::env::var("LOG_DIR").ok().filter(|s| !s.is_empty()),
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn couchdb_timeout(&self) -> Duration {
        Duration::from_secs(self.couchdb_timeout_secs)
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.db_acquire_timeout_secs)
    }

    pub fn ledger_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_lock_timeout_ms)
    }

    /// `None` when reconciliation is disabled
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.couchdb_events_db, "pictureme_events");
        assert_eq!(config.couchdb_photos_db, "pictureme_photos");
        assert_eq!(config.default_token_allotment, 1000);
        assert_eq!(config.ledger_lock_timeout(), Duration::from_millis(5000));
        assert!(config.reconcile_interval().is_none());
        assert!(config.is_development());
    }

    #[test]
    fn test_reconcile_interval_enabled() {
        let config = Config {
            reconcile_interval_secs: 30,
            ..Config::default()
        };
        assert_eq!(config.reconcile_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_require_secret_outside_development() {
        let result = Config::require_secret("BOOTH_CORE_TEST_UNSET_SECRET", "production");
        assert!(result.is_err());

        let dev = Config::require_secret("BOOTH_CORE_TEST_UNSET_SECRET", "development").unwrap();
        assert!(dev.is_empty());
    }
}
