use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;

/// A human-readable tag explaining why the Scheduler selected a node this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestReason {
    New,
    Stale,
    Scheduled,
    FailedRetry,
    ConfigChanged,
    OutsideCallWindow,
}

impl TestReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestReason::New => "new",
            TestReason::Stale => "stale",
            TestReason::Scheduled => "scheduled",
            TestReason::FailedRetry => "failed_retry",
            TestReason::ConfigChanged => "config_changed",
            TestReason::OutsideCallWindow => "outside_call_window",
        }
    }
}

/// Scheduling strategy, `scheduler.strategy` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStrategy {
    #[default]
    Regular,
    Adaptive,
    Priority,
}

/// The Scheduler's per-node bookkeeping. Owned exclusively by the Scheduler;
/// mutated only under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSchedule {
    pub address: NodeAddress,
    pub last_test_time: Option<DateTime<Utc>>,
    pub last_test_success: bool,
    pub consecutive_fails: u32,
    pub next_test_time: DateTime<Utc>,
    pub priority: u8,
    pub backoff_level: u32,
    pub test_reason: TestReason,
}

impl NodeSchedule {
    /// A freshly discovered node: `last_test_time = zero` (represented as
    /// `None`), eligible immediately (with small jitter per §9's adopted variant).
    pub fn new(address: NodeAddress, priority: u8, next_test_time: DateTime<Utc>) -> Self {
        Self {
            address,
            last_test_time: None,
            last_test_success: false,
            consecutive_fails: 0,
            next_test_time,
            priority,
            backoff_level: 0,
            test_reason: TestReason::New,
        }
    }

    pub fn is_new(&self) -> bool {
        self.last_test_time.is_none()
    }
}

/// `backoff_level = clamp(⌊log₂(consecutive_fails)⌋ + 1, 0, max_backoff)`.
pub fn backoff_level_for(consecutive_fails: u32, max_backoff: u32) -> u32 {
    if consecutive_fails == 0 {
        return 0;
    }
    let level = (32 - consecutive_fails.leading_zeros()) as u32; // floor(log2(n)) + 1
    level.min(max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_progression_matches_scenario_4() {
        // consecutive_fails: 1,2,3,4,5 -> backoff_level: 1,2,2,3,3 with max_backoff=5
        let expected = [1, 2, 2, 3, 3];
        for (fails, exp) in (1u32..=5).zip(expected) {
            assert_eq!(backoff_level_for(fails, 5), exp, "fails={fails}");
        }
    }

    #[test]
    fn backoff_is_clamped() {
        assert_eq!(backoff_level_for(1000, 5), 5);
        assert_eq!(backoff_level_for(0, 5), 0);
    }
}
