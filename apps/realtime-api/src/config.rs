use std::time::Duration;

/// Real-time service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. When unset the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Snowflake worker id for this instance (0-1023).
    pub worker_id: u16,
    /// Heartbeat interval advertised to gateway clients.
    pub heartbeat_interval_ms: u64,
    /// How long a typing indicator lives without a refresh.
    pub typing_ttl_ms: u64,
    pub typing_sweep_interval_ms: u64,
    /// How long an offline user's last-seen entry stays in memory.
    pub presence_retention_secs: u64,
    pub store_retry_attempts: u32,
    pub store_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 4010,
            worker_id: 0,
            heartbeat_interval_ms: 41_250,
            typing_ttl_ms: 5_000,
            typing_sweep_interval_ms: 1_000,
            presence_retention_secs: 300,
            store_retry_attempts: 3,
            store_retry_backoff_ms: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset.
    ///
    /// Panics with a descriptive message if a variable is set but malformed.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            port: parsed_var("PORT", defaults.port),
            worker_id: parsed_var("WORKER_ID", defaults.worker_id),
            heartbeat_interval_ms: parsed_var("HEARTBEAT_INTERVAL_MS", defaults.heartbeat_interval_ms),
            typing_ttl_ms: parsed_var("TYPING_TTL_MS", defaults.typing_ttl_ms),
            typing_sweep_interval_ms: parsed_var(
                "TYPING_SWEEP_INTERVAL_MS",
                defaults.typing_sweep_interval_ms,
            ),
            presence_retention_secs: parsed_var(
                "PRESENCE_RETENTION_SECS",
                defaults.presence_retention_secs,
            ),
            store_retry_attempts: parsed_var("STORE_RETRY_ATTEMPTS", defaults.store_retry_attempts),
            store_retry_backoff_ms: parsed_var(
                "STORE_RETRY_BACKOFF_MS",
                defaults.store_retry_backoff_ms,
            ),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_interval_ms)
    }

    pub fn presence_retention(&self) -> Duration {
        Duration::from_secs(self.presence_retention_secs)
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .unwrap_or_else(|_| panic!("{name} env var is malformed: {v:?}")),
        _ => default,
    }
}
