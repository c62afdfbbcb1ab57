//! Sync configuration.

use std::str::FromStr;
use std::time::Duration;

use report_core::{UnknownTypePolicy, DEFAULT_HISTORY_LIMIT, QUIESCENCE_WINDOW_MS};

/// Environment variable overriding the interval save period, in seconds.
pub const ENV_SYNC_INTERVAL_SECS: &str = "REPORT_SYNC_INTERVAL_SECS";

/// Environment variable overriding the undo depth.
pub const ENV_HISTORY_LIMIT: &str = "REPORT_HISTORY_LIMIT";

/// Default interval between background saves.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        }
    }

    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, 0, 0, 1.0)
    }

    /// Calculate delay for a given attempt number (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let base_delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64) as u64;
        // Fixed 12.5% padding on top of the capped delay
        let padding = (capped_delay / 8).max(1);
        capped_delay.saturating_add(padding)
    }
}

/// Settings for [`PersistenceSync`](crate::PersistenceSync).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Period of the background save.
    pub interval: Duration,
    /// Incremental edits closer together than this share one undo entry.
    pub quiescence_window_ms: u64,
    /// Maximum undo depth.
    pub history_limit: usize,
    /// Backoff for transient backend failures.
    pub retry: RetryConfig,
    /// What to do with elements the wire format cannot express.
    pub unknown_types: UnknownTypePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            quiescence_window_ms: QUIESCENCE_WINDOW_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry: RetryConfig::default(),
            unknown_types: UnknownTypePolicy::Drop,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by [`ENV_SYNC_INTERVAL_SECS`] and [`ENV_HISTORY_LIMIT`].
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`SyncConfig::from_env`] with a custom variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_SYNC_INTERVAL_SECS) {
            if secs == 0 {
                tracing::warn!("{ENV_SYNC_INTERVAL_SECS}=0 ignored");
            } else {
                config.interval = Duration::from_secs(secs);
            }
        }
        if let Some(limit) = parse_var::<usize>(&lookup, ENV_HISTORY_LIMIT) {
            config.history_limit = limit.max(1);
        }
        config
    }

    /// Set the background save period.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {name}={raw:?}");
            None
        }
    }
}
