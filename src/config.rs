//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    20
}

fn default_max_backoff_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Bounded exponential backoff for replaying conflicted transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds (default: 20ms)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay in milliseconds (default: 1000ms)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Factor applied to the delay after every conflict (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the transaction exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Delay before attempt `attempt + 1`, where the first retry is attempt 1
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exp);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Options shared by every transaction opened from a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Decode array columns into dense native arrays by default
    ///
    /// Numeric and Json arrays keep nullable elements regardless.
    #[serde(default)]
    pub decode_to_native_arrays: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration, missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::Construction(format!("invalid session config: {}", err)))
    }

    pub fn decode_to_native_arrays(mut self, enabled: bool) -> Self {
        self.decode_to_native_arrays = enabled;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-read overrides of the session configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub decode_to_native_arrays: Option<bool>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_to_native_arrays(mut self, enabled: bool) -> Self {
        self.decode_to_native_arrays = Some(enabled);
        self
    }
}
