use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One cycle-day's aggregate, persisted once per cycle by the Cycle Controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub computed_at: DateTime<Utc>,
    pub nodes_tested: usize,
    pub nodes_operational: usize,
    pub nodes_with_connectivity_issues: usize,
    pub dual_stack: usize,
    pub v4_only: usize,
    pub v6_only: usize,
    pub failed: usize,
}

impl DailyStats {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            computed_at: Utc::now(),
            nodes_tested: 0,
            nodes_operational: 0,
            nodes_with_connectivity_issues: 0,
            dual_stack: 0,
            v4_only: 0,
            v6_only: 0,
            failed: 0,
        }
    }
}
