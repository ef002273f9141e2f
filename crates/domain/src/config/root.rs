use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::dns::DnsConfig;
use super::errors::ConfigError;
use super::geo::GeoConfig;
use super::logging::LoggingConfig;
use super::protocols::ProtocolsConfig;
use super::scheduler::SchedulerConfig;
use super::storage::StorageConfig;
use super::whois::WhoisConfig;

/// CLI flag overrides applied on top of the loaded file, the way the
/// teacher's `Config::load(path, CliOverrides)` signature does.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub run_once: Option<bool>,
    pub cli_only: Option<bool>,
    pub dry_run: Option<bool>,
    pub test_limit: Option<String>,
}

/// Top-level configuration, loaded once at startup and re-read on `Reload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde", default = "default_test_interval")]
    pub test_interval: Duration,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub cli_only: bool,

    #[serde(default)]
    pub test_limit: String,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub protocols: ProtocolsConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub geolocation: GeoConfig,

    #[serde(default)]
    pub whois: WhoisConfig,

    #[serde(default)]
    pub cli: CliConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            test_interval: default_test_interval(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            dry_run: false,
            run_once: false,
            cli_only: false,
            test_limit: String::new(),
            scheduler: SchedulerConfig::default(),
            protocols: ProtocolsConfig::default(),
            dns: DnsConfig::default(),
            geolocation: GeoConfig::default(),
            whois: WhoisConfig::default(),
            cli: CliConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>, overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            None => Config::default(),
        };

        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(run_once) = overrides.run_once {
            self.run_once = run_once;
        }
        if let Some(cli_only) = overrides.cli_only {
            self.cli_only = cli_only;
        }
        if let Some(dry_run) = overrides.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(test_limit) = overrides.test_limit {
            self.test_limit = test_limit;
        }
    }

    /// `stale_test_threshold` defaults to `test_interval` when unset, per the
    /// configuration table (§6). See DESIGN.md for why this reading was
    /// preferred over §4.5's "defaults to base_interval" phrasing.
    pub fn stale_test_threshold(&self) -> Duration {
        self.scheduler
            .stale_test_threshold
            .unwrap_or(self.test_interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        self.scheduler
            .validate()
            .map_err(ConfigError::Invalid)?;
        for settings in self.protocols.0.values() {
            if settings.enabled && settings.timeout.is_zero() {
                return Err(ConfigError::Invalid(
                    "protocols.<tag>.timeout must be non-zero when enabled".to_string(),
                ));
            }
        }
        if self.dns.timeout.is_zero() {
            return Err(ConfigError::Invalid("dns.timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Applies the "safe subset" of `other` that `Reload` is allowed to
    /// change live: test interval, batch size, dry-run, protocol-prober
    /// params, DNS/geo/WHOIS params, scheduler thresholds, logging. Never
    /// touches `workers` (Worker Pool is fixed-size at startup) or `storage`
    /// (never swapped); the control surface's own bind address is likewise
    /// left alone since its listener is already bound.
    pub fn apply_safe_reload(&mut self, other: Config) {
        self.test_interval = other.test_interval;
        self.batch_size = other.batch_size;
        self.dry_run = other.dry_run;
        self.test_limit = other.test_limit;
        self.scheduler = other.scheduler;
        self.protocols = other.protocols;
        self.dns = other.dns;
        self.geolocation = other.geolocation;
        self.whois = other.whois;
        self.logging = other.logging;
    }
}

fn default_test_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_workers() -> usize {
    16
}

fn default_batch_size() -> usize {
    32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_invalid() {
        let mut cfg = Config::default();
        cfg.workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn stale_threshold_defaults_to_test_interval() {
        let cfg = Config::default();
        assert_eq!(cfg.stale_test_threshold(), cfg.test_interval);
    }

    #[test]
    fn reload_never_touches_workers_or_storage() {
        let mut running = Config::default();
        running.workers = 7;
        running.storage.database_url = "sqlite://keep-me.db".to_string();

        let mut incoming = Config::default();
        incoming.workers = 99;
        incoming.storage.database_url = "sqlite://ignored.db".to_string();
        incoming.batch_size = 64;

        running.apply_safe_reload(incoming);

        assert_eq!(running.workers, 7);
        assert_eq!(running.storage.database_url, "sqlite://keep-me.db");
        assert_eq!(running.batch_size, 64);
    }
}
