/*!
 * Ring Configuration
 *
 * Runtime configuration for ring sizing and the drain loop
 */

use super::errors::{RingError, RingResult};
use super::limits::{DEFAULT_BATCH_LIMIT, DEFAULT_CQ_ENTRIES, MAX_CQ_ENTRIES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completion ring configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Completion ring entries (power of two)
    pub cq_entries: u32,
    /// Maximum completions handed out per drain call
    pub batch_limit: usize,
    /// Event loop poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Completions the simulated producer publishes per tail update
    pub producer_batch: u32,
    /// Total completions the demo producer generates
    pub total_completions: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            cq_entries: DEFAULT_CQ_ENTRIES,
            batch_limit: DEFAULT_BATCH_LIMIT,
            poll_interval_ms: 1,
            producer_batch: 32,
            total_completions: 100_000,
        }
    }
}

impl RingConfig {
    /// Small ring with single-record publishes and short drain batches
    pub const fn small() -> Self {
        Self {
            cq_entries: 8,
            batch_limit: 4,
            poll_interval_ms: 1,
            producer_batch: 1,
            total_completions: 64,
        }
    }

    /// Load configuration from a JSON document, then validate it
    pub fn from_json(input: &str) -> RingResult<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the defaults
    ///
    /// Environment variables:
    /// - URING_CQ_ENTRIES: completion ring entries
    /// - URING_BATCH_LIMIT: completions per drain call
    /// - URING_POLL_INTERVAL_MS: event loop poll interval
    pub fn from_env() -> RingResult<Self> {
        let mut config = Self::default();

        if let Some(entries) = env_parse("URING_CQ_ENTRIES")? {
            config.cq_entries = entries;
        }
        if let Some(limit) = env_parse("URING_BATCH_LIMIT")? {
            config.batch_limit = limit;
        }
        if let Some(interval) = env_parse("URING_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check sizing constraints
    pub fn validate(&self) -> RingResult<()> {
        if self.cq_entries == 0 || !self.cq_entries.is_power_of_two() {
            return Err(RingError::Config(format!(
                "cq_entries must be a non-zero power of two, got {}",
                self.cq_entries
            )));
        }
        if self.cq_entries > MAX_CQ_ENTRIES {
            return Err(RingError::Config(format!(
                "cq_entries {} exceeds maximum {}",
                self.cq_entries, MAX_CQ_ENTRIES
            )));
        }
        if self.batch_limit == 0 {
            return Err(RingError::Config("batch_limit must be at least 1".into()));
        }
        if self.producer_batch == 0 || self.producer_batch > self.cq_entries {
            return Err(RingError::Config(format!(
                "producer_batch must be within 1..={}, got {}",
                self.cq_entries, self.producer_batch
            )));
        }
        Ok(())
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> RingResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RingError::Config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
