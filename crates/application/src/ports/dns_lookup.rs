use std::net::{Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use nodewatch_domain::DomainError;

/// Resolved A/AAAA sets for one hostname, kept separate per family the way
/// the Test Executor needs them (IPv6 walked before IPv4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsLookupResult {
    pub v4: Vec<Ipv4Addr>,
    pub v6: Vec<Ipv6Addr>,
}

impl DnsLookupResult {
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Pure function from hostname to resolved addresses. A hostname that is
/// itself a parseable IP literal is handled by the caller, not the resolver.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn resolve(&self, hostname: &str) -> Result<DnsLookupResult, DomainError>;
}
