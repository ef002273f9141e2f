//! Collaborator implementations behind the `nodewatch-application` ports:
//! the sqlx-backed Storage Gateway, a hickory-based DNS resolver, an HTTP
//! geolocation client, a raw WHOIS TCP client, and the four protocol
//! probers. No core orchestration logic lives here.

pub mod database;
pub mod dns;
pub mod geo;
pub mod probers;
pub mod storage;
pub mod whois;

pub use dns::HickoryDnsResolverAdapter;
pub use geo::HttpGeoLocator;
pub use probers::{BinkpProber, FtpProber, IfcicoProber, TelnetProber};
pub use storage::SqliteStorageGateway;
pub use whois::WhoisClient;
