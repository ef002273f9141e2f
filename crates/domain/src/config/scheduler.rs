use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schedule::SchedulerStrategy;

/// Scheduler tuning, re-readable via `Reload` (§4.2's "safe subset").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub strategy: SchedulerStrategy,

    #[serde(with = "humantime_serde", default = "default_base_interval")]
    pub base_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_failed_retry_interval")]
    pub failed_retry_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_min_interval")]
    pub min_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_max_interval")]
    pub max_interval: Duration,

    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u8,

    /// Defaults to `test_interval` (the cycle tick) if unset — applied by
    /// `Config::validate`/`Config::apply_defaults`, not here, since this
    /// struct alone doesn't know the top-level `test_interval`.
    #[serde(with = "humantime_serde::option", default)]
    pub stale_test_threshold: Option<Duration>,

    #[serde(default = "default_max_backoff_level")]
    pub max_backoff_level: u32,

    #[serde(default = "default_priority_boost")]
    pub priority_boost: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulerStrategy::default(),
            base_interval: default_base_interval(),
            failed_retry_interval: default_failed_retry_interval(),
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            jitter_percent: default_jitter_percent(),
            stale_test_threshold: None,
            max_backoff_level: default_max_backoff_level(),
            priority_boost: default_priority_boost(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval > self.max_interval {
            return Err("scheduler.min_interval must be <= scheduler.max_interval".to_string());
        }
        if self.jitter_percent > 100 {
            return Err("scheduler.jitter_percent must be in [0, 100]".to_string());
        }
        Ok(())
    }
}

fn default_base_interval() -> Duration {
    Duration::from_secs(72 * 3600)
}

fn default_failed_retry_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_min_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_interval() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_jitter_percent() -> u8 {
    10
}

fn default_max_backoff_level() -> u32 {
    5
}

fn default_priority_boost() -> u8 {
    10
}
