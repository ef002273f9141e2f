use std::time::Duration;

use serde::{Deserialize, Serialize};

/// DNS resolver pool params, `dns.*` in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: default_timeout(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}
