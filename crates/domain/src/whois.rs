use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The outcome of one WHOIS lookup, as persisted by the Storage Gateway.
/// Intentionally thin — wire-level WHOIS parsing is a collaborator concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhoisOutcome {
    pub domain: String,
    pub looked_up_at: DateTime<Utc>,
    pub registered: bool,
    pub registrar: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl WhoisOutcome {
    /// Whether this outcome is complete enough to be worth persisting.
    /// A successful lookup without an expiration date is incomplete; the
    /// WHOIS Worker marks the domain seen but does not persist it.
    pub fn is_complete(&self) -> bool {
        !self.registered || self.expiration.is_some()
    }
}

/// Reduces a hostname to the domain WHOIS is queried against: the last two
/// labels (`a.b.example.com` -> `example.com`). Not public-suffix-list aware;
/// good enough for the common `.com`/`.net`/`.org` case this directory uses.
pub fn registrable_domain(hostname: &str) -> Option<String> {
    let hostname = hostname.trim_end_matches('.');
    let labels: Vec<&str> = hostname.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_two_labels() {
        assert_eq!(
            registrable_domain("node1.fido.example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(registrable_domain("example.com"), Some("example.com".to_string()));
        assert_eq!(registrable_domain("localhost"), None);
    }
}
