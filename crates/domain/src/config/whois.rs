use std::time::Duration;

use serde::{Deserialize, Serialize};

/// WHOIS worker params, `whois.*` in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoisConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    #[serde(with = "humantime_serde", default = "default_seen_ttl")]
    pub seen_ttl: Duration,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            seen_ttl: default_seen_ttl(),
        }
    }
}

fn default_queue_size() -> usize {
    512
}

fn default_seen_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}
