//! nodewatch domain layer: plain data types, configuration, and errors.
//! No I/O lives here — collaborators and the core engine depend on it, not
//! the other way around.

pub mod address;
pub mod config;
pub mod errors;
pub mod node;
pub mod protocol;
pub mod result;
pub mod schedule;
pub mod stats;
pub mod test_limit;
pub mod whois;

pub use address::NodeAddress;
pub use config::{CliOverrides, Config, ConfigError};
pub use errors::DomainError;
pub use node::{CallWindow, InternetConfigFingerprint, Node};
pub use protocol::ProtocolTag;
pub use result::{
    AggregatedResult, ConnectivityType, FamilySlot, GeoRecord, PerHostnameResult, ProtocolResult,
};
pub use schedule::{backoff_level_for, NodeSchedule, SchedulerStrategy, TestReason};
pub use stats::DailyStats;
pub use test_limit::{FlagSlice, TestLimit};
pub use whois::{registrable_domain, WhoisOutcome};
