pub mod clock;
pub mod control_surface;
pub mod dns_lookup;
pub mod geo_locator;
pub mod prober;
pub mod storage_gateway;
pub mod whois_service;

pub use clock::Clock;
pub use control_surface::{ControlSurface, NodeInfo, StatusReport, WorkerStatus};
pub use dns_lookup::{DnsLookup, DnsLookupResult};
pub use geo_locator::GeoLocator;
pub use prober::{ProbeOutcome, ProbeTarget, Prober};
pub use storage_gateway::StorageGateway;
pub use whois_service::{WhoisLookup, WhoisService};
