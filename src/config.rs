//! Environment-driven configuration for the store connection and the
//! dual-channel timing knobs.

use std::time::Duration;

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote store endpoint. None disables all remote features.
    pub store_url: Option<String>,
    /// Remote store access key. None disables all remote features.
    pub store_key: Option<String>,
    /// Table holding participant and round rows.
    pub store_table: String,
    /// Upper bound for any single store call.
    pub request_timeout: Duration,
    /// Retries for transient store failures, on top of the first attempt.
    pub retry_attempts: u32,
    /// Base backoff between retries, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Polling cadence for the roster when the push feed is not delivering.
    pub roster_poll_interval: Duration,
    /// Polling cadence for the round row.
    pub round_poll_interval: Duration,
    /// How long after a successful subscribe to wait for a first event
    /// before arming the polling fallback anyway.
    pub subscribe_watchdog: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `IMPOSTOR_STORE_URL` and `IMPOSTOR_STORE_KEY` must both be set for
    /// remote mode; otherwise the engine runs against the in-memory store
    /// in local-only degraded mode.
    pub fn from_env() -> Self {
        let store_url = env_trimmed("IMPOSTOR_STORE_URL");
        let store_key = env_trimmed("IMPOSTOR_STORE_KEY");

        if store_url.is_some() != store_key.is_some() {
            tracing::warn!(
                "IMPOSTOR_STORE_URL and IMPOSTOR_STORE_KEY must both be set \
                 to enable the remote store"
            );
        }
        let (store_url, store_key) = match (store_url, store_key) {
            (Some(url), Some(key)) => (Some(url), Some(key)),
            _ => {
                tracing::warn!(
                    "remote store not configured, running in local-only degraded mode"
                );
                (None, None)
            }
        };

        Self {
            store_url,
            store_key,
            store_table: env_trimmed("IMPOSTOR_STORE_TABLE")
                .unwrap_or_else(|| "codes".to_string()),
            ..Self::default()
        }
    }

    /// Whether a remote store is fully configured.
    pub fn is_remote(&self) -> bool {
        self.store_url.is_some() && self.store_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: None,
            store_key: None,
            store_table: "codes".to_string(),
            request_timeout: Duration::from_secs(10),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(500),
            roster_poll_interval: Duration::from_secs(3),
            round_poll_interval: Duration::from_secs(2),
            subscribe_watchdog: Duration::from_secs(5),
        }
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
