use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use nodewatch_domain::{DomainError, NodeAddress, ProtocolTag};
use tokio_util::sync::CancellationToken;

/// One address + port to probe, with the identity the peer is expected to
/// claim during handshake (used for `address_validated`).
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub address: IpAddr,
    pub port: u16,
    pub expected_identity: Option<NodeAddress>,
    pub timeout: Duration,
}

/// The outcome of one `Probe(ctx, addr, port, expected_identity)` call.
/// Transport and handshake failures are carried here, not as an `Err` —
/// only cancellation propagates as an error.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub success: bool,
    pub response_ms: u32,
    pub peer_identity: Option<NodeAddress>,
    pub identity_matches_expected: bool,
    pub error: String,
}

impl ProbeOutcome {
    pub fn success(response_ms: u32, peer_identity: Option<NodeAddress>, matches: bool) -> Self {
        Self {
            success: true,
            response_ms,
            peer_identity,
            identity_matches_expected: matches,
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response_ms: 0,
            peer_identity: None,
            identity_matches_expected: false,
            error: error.into(),
        }
    }
}

/// A protocol-specific reachability+handshake client. One implementation per
/// `ProtocolTag` other than the ones with no registered prober.
#[async_trait]
pub trait Prober: Send + Sync {
    fn tag(&self) -> ProtocolTag;

    /// Never returns `Err` for transport/handshake failures — those are
    /// carried in the returned `ProbeOutcome`. `Err(DomainError::Cancelled)`
    /// is the only propagated failure, when `cancel` fires mid-probe.
    async fn probe(
        &self,
        target: &ProbeTarget,
        cancel: &CancellationToken,
    ) -> Result<ProbeOutcome, DomainError>;
}
