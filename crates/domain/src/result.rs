use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;
use crate::protocol::ProtocolTag;

/// Geographic record attached to a resolved address. Opaque beyond what the
/// core needs to carry; the real schema lives with the geolocation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<u32>,
}

/// The outcome of probing one address family (IPv4 or IPv6) for one protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilySlot {
    pub tested: bool,
    pub success: bool,
    pub response_ms: u32,
    pub peer_identity: Option<NodeAddress>,
    pub error: String,
    pub address: Option<IpAddr>,
}

impl FamilySlot {
    pub fn untested() -> Self {
        Self::default()
    }

    pub fn success(address: IpAddr, response_ms: u32, peer_identity: Option<NodeAddress>) -> Self {
        Self {
            tested: true,
            success: true,
            response_ms,
            peer_identity,
            error: String::new(),
            address: Some(address),
        }
    }

    pub fn failure(address: IpAddr, error: impl Into<String>) -> Self {
        Self {
            tested: true,
            success: false,
            response_ms: 0,
            peer_identity: None,
            error: error.into(),
            address: Some(address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityType {
    DualStack,
    V4Only,
    V6Only,
    Failed,
}

/// Per-protocol outcome across both address families.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolResult {
    pub v4: FamilySlot,
    pub v6: FamilySlot,
    pub address_validated: bool,
}

impl ProtocolResult {
    pub fn success(&self) -> bool {
        self.v4.success || self.v6.success
    }

    pub fn connectivity_type(&self) -> ConnectivityType {
        match (self.v4.success, self.v6.success) {
            (true, true) => ConnectivityType::DualStack,
            (true, false) => ConnectivityType::V4Only,
            (false, true) => ConnectivityType::V6Only,
            (false, false) => ConnectivityType::Failed,
        }
    }
}

/// The result of testing one hostname of a node. `is_aggregated` is always
/// `false` here; see [`AggregatedResult`] for the multi-hostname rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerHostnameResult {
    pub address: NodeAddress,
    pub test_time: DateTime<Utc>,
    pub tested_hostname: Arc<str>,
    pub hostname_index: usize,
    pub resolved_v4: Vec<IpAddr>,
    pub resolved_v6: Vec<IpAddr>,
    pub dns_error: String,
    pub geo: Option<GeoRecord>,
    pub protocols: HashMap<ProtocolTag, ProtocolResult>,
    pub is_operational: bool,
    pub is_aggregated: bool,
}

impl PerHostnameResult {
    pub fn new(address: NodeAddress, hostname: Arc<str>, hostname_index: usize) -> Self {
        Self {
            address,
            test_time: Utc::now(),
            tested_hostname: hostname,
            hostname_index,
            resolved_v4: Vec::new(),
            resolved_v6: Vec::new(),
            dns_error: String::new(),
            geo: None,
            protocols: HashMap::new(),
            is_operational: false,
            is_aggregated: false,
        }
    }

    pub fn dns_succeeded(&self) -> bool {
        self.dns_error.is_empty() && (!self.resolved_v4.is_empty() || !self.resolved_v6.is_empty())
    }

    /// `is_operational = OR over all tested protocols of (v4.success ∨ v6.success)`.
    pub fn recompute_operational(&mut self) {
        self.is_operational = self
            .protocols
            .values()
            .any(|p| p.v4.tested || p.v6.tested)
            && self.protocols.values().any(|p| p.success());
    }
}

/// The single authoritative verdict for a multi-homed node, combining
/// per-hostname outcomes. See `ResultAggregator` in `nodewatch-engine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub address: NodeAddress,
    pub test_time: DateTime<Utc>,
    pub tested_hostname: Arc<str>,
    pub resolved_v4: Vec<IpAddr>,
    pub resolved_v6: Vec<IpAddr>,
    pub dns_error: String,
    pub geo: Option<GeoRecord>,
    pub protocols: HashMap<ProtocolTag, ProtocolResult>,
    pub is_operational: bool,
    pub is_aggregated: bool,
    pub total_hostnames: usize,
    pub hostnames_tested: usize,
    pub hostnames_operational: usize,
    pub has_connectivity_issues: bool,
}
