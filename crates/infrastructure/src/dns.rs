use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use nodewatch_application::ports::{DnsLookup, DnsLookupResult};
use nodewatch_domain::DomainError;
use tracing::debug;

/// Resolves A/AAAA records via `hickory-resolver`'s system-configured
/// upstream, the same resolver family the teacher already depends on for
/// DNS message parsing.
pub struct HickoryDnsResolverAdapter {
    resolver: Resolver<TokioConnectionProvider>,
}

impl HickoryDnsResolverAdapter {
    pub fn new(timeout: Duration) -> Result<Self, DomainError> {
        let mut builder = Resolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        );
        builder.options_mut().timeout = timeout;
        let resolver = builder.build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsLookup for HickoryDnsResolverAdapter {
    async fn resolve(&self, hostname: &str) -> Result<DnsLookupResult, DomainError> {
        let mut result = DnsLookupResult::default();

        match self.resolver.ipv4_lookup(hostname).await {
            Ok(lookup) => {
                result.v4 = lookup.iter().map(|r| Ipv4Addr::from(r.0)).collect();
            }
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => {}
            Err(err) => return Err(DomainError::Dns(err.to_string())),
        }

        match self.resolver.ipv6_lookup(hostname).await {
            Ok(lookup) => {
                result.v6 = lookup.iter().map(|r| Ipv6Addr::from(r.0)).collect();
            }
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => {}
            Err(err) => debug!(%err, hostname, "AAAA lookup failed, continuing with A-only"),
        }

        if result.is_empty() {
            return Err(DomainError::Dns(format!("no A/AAAA records for {hostname}")));
        }

        Ok(result)
    }
}
