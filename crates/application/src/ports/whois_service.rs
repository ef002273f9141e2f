use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodewatch_domain::DomainError;

/// The raw outcome of a single WHOIS query, before the WHOIS Worker decides
/// whether it is complete enough to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum WhoisLookup {
    NotFound,
    Found {
        registrar: Option<String>,
        expiration: Option<DateTime<Utc>>,
    },
}

/// WHOIS lookup on a registrable domain. Transient failures (timeouts,
/// unknown TLD referral) are `Err(DomainError::Whois)` and are never fatal —
/// the WHOIS Worker drops and retries later.
#[async_trait]
pub trait WhoisService: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<WhoisLookup, DomainError>;
}
