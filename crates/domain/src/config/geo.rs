use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Geolocation service params, `geolocation.*` in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    /// Maximum lookups per second against the provider.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            cache_ttl: default_cache_ttl(),
            rate_limit: default_rate_limit(),
        }
    }
}

fn default_provider() -> String {
    "https://ipapi.example/lookup".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_rate_limit() -> u32 {
    5
}
