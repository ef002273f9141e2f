//! Configuration for nodewatch.
//!
//! Organized by concern, the way the teacher splits its config module:
//! - `root`: top-level `Config` and CLI overrides.
//! - `scheduler`: Scheduler tuning.
//! - `protocols`: per-protocol-tag toggle and wire params.
//! - `dns` / `geo` / `whois`: collaborator params.
//! - `cli`: control-surface exposure.
//! - `logging` / `storage`: ambient concerns.
//! - `errors`: configuration errors.

pub mod cli;
pub mod dns;
pub mod errors;
pub mod geo;
pub mod logging;
pub mod protocols;
pub mod root;
pub mod scheduler;
pub mod storage;
pub mod whois;

pub use cli::CliConfig;
pub use dns::DnsConfig;
pub use errors::ConfigError;
pub use geo::GeoConfig;
pub use logging::LoggingConfig;
pub use protocols::{ProtocolSettings, ProtocolsConfig};
pub use root::{CliOverrides, Config};
pub use scheduler::SchedulerConfig;
pub use storage::StorageConfig;
pub use whois::WhoisConfig;
