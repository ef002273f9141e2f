use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use nodewatch_application::ports::{DnsLookup, GeoLocator, ProbeTarget, Prober};
use nodewatch_domain::{
    registrable_domain, DomainError, FamilySlot, Node, PerHostnameResult, ProtocolResult,
    ProtocolsConfig,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum pause the Executor observes between two hostnames of the same
/// multi-homed node, per §4.3.
const INTER_HOSTNAME_DELAY: Duration = Duration::from_millis(100);

/// Runs one node's probe plan: resolve, geolocate, probe each applicable
/// protocol, produce one result per hostname. Never returns `Err` for a
/// node's own reachability failures — those live inside the result.
pub struct TestExecutor {
    dns: Arc<dyn DnsLookup>,
    geo: Arc<dyn GeoLocator>,
    probers: Vec<Arc<dyn Prober>>,
    whois_queue: mpsc::Sender<String>,
    protocols: ProtocolsConfig,
}

impl TestExecutor {
    pub fn new(
        dns: Arc<dyn DnsLookup>,
        geo: Arc<dyn GeoLocator>,
        probers: Vec<Arc<dyn Prober>>,
        whois_queue: mpsc::Sender<String>,
        protocols: ProtocolsConfig,
    ) -> Self {
        Self {
            dns,
            geo,
            probers,
            whois_queue,
            protocols,
        }
    }

    pub fn set_protocols(&mut self, protocols: ProtocolsConfig) {
        self.protocols = protocols;
    }

    /// Runs every hostname of `node` in order, persisting nothing itself —
    /// the Cycle Controller hands each result to the Storage Gateway and the
    /// full list to the Result Aggregator. Empty only when `node` carried no
    /// hostname and none could be promoted, or cancellation fired before the
    /// first hostname started.
    pub async fn run(
        &self,
        node: &mut Node,
        cancel: &CancellationToken,
    ) -> Vec<PerHostnameResult> {
        node.ensure_hostname();
        let mut results = Vec::with_capacity(node.hostnames.len());

        for (index, hostname) in node.hostnames.clone().into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            results.push(self.perform_test(node, hostname, index, cancel).await);

            if index + 1 < node.hostnames.len() {
                tokio::select! {
                    _ = tokio::time::sleep(INTER_HOSTNAME_DELAY) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }

        results
    }

    async fn perform_test(
        &self,
        node: &Node,
        hostname: Arc<str>,
        hostname_index: usize,
        cancel: &CancellationToken,
    ) -> PerHostnameResult {
        let mut result = PerHostnameResult::new(node.address, hostname.clone(), hostname_index);

        if hostname.is_empty() {
            return result;
        }

        self.enqueue_whois(&hostname);

        if let Ok(literal) = hostname.parse::<IpAddr>() {
            match literal {
                IpAddr::V4(addr) => result.resolved_v4 = vec![IpAddr::V4(addr)],
                IpAddr::V6(addr) => result.resolved_v6 = vec![IpAddr::V6(addr)],
            }
        } else {
            let resolution = match self.dns.resolve(&hostname).await {
                Ok(resolution) => resolution,
                Err(err) => {
                    result.dns_error = err.to_string();
                    return result;
                }
            };

            result.resolved_v4 = resolution.v4.into_iter().map(IpAddr::V4).collect();
            result.resolved_v6 = resolution.v6.into_iter().map(IpAddr::V6).collect();
        }

        if let Some(&first) = result.resolved_v4.first().or(result.resolved_v6.first()) {
            match self.geo.locate(first).await {
                Ok(geo) => result.geo = geo,
                Err(err) => debug!(%err, hostname = %hostname, "geolocation lookup failed"),
            }
        }

        for tag in nodewatch_domain::ProtocolTag::ALL {
            if !node.protocols.contains(&tag) {
                continue;
            }
            let Some(prober) = self.probers.iter().find(|p| p.tag() == tag) else {
                continue;
            };
            let settings = self.protocols.get(tag);
            if !settings.enabled {
                continue;
            }
            let port = node
                .protocol_ports
                .get(&tag)
                .copied()
                .or(settings.port)
                .unwrap_or_else(|| tag.default_port());

            let protocol_result = self
                .probe_protocol(
                    prober.as_ref(),
                    node,
                    port,
                    settings.timeout,
                    &result.resolved_v6,
                    &result.resolved_v4,
                    cancel,
                )
                .await;
            result.protocols.insert(tag, protocol_result);
        }

        result.recompute_operational();
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn probe_protocol(
        &self,
        prober: &dyn Prober,
        node: &Node,
        port: u16,
        timeout: Duration,
        v6_addresses: &[IpAddr],
        v4_addresses: &[IpAddr],
        cancel: &CancellationToken,
    ) -> ProtocolResult {
        let mut protocol_result = ProtocolResult::default();

        let (v6, v6_validated) = self
            .probe_family(prober, node, port, timeout, v6_addresses, cancel)
            .await;
        let (v4, v4_validated) = self
            .probe_family(prober, node, port, timeout, v4_addresses, cancel)
            .await;

        protocol_result.v6 = v6;
        protocol_result.v4 = v4;
        protocol_result.address_validated = v6_validated || v4_validated;

        protocol_result
    }

    async fn probe_family(
        &self,
        prober: &dyn Prober,
        node: &Node,
        port: u16,
        timeout: Duration,
        addresses: &[IpAddr],
        cancel: &CancellationToken,
    ) -> (FamilySlot, bool) {
        let mut last_failure: Option<FamilySlot> = None;

        for &address in addresses {
            if cancel.is_cancelled() {
                break;
            }
            let target = ProbeTarget {
                address,
                port,
                expected_identity: Some(node.address),
                timeout,
            };

            match prober.probe(&target, cancel).await {
                Ok(outcome) => {
                    if outcome.success {
                        let slot =
                            FamilySlot::success(address, outcome.response_ms, outcome.peer_identity);
                        return (slot, outcome.identity_matches_expected);
                    }
                    last_failure = Some(FamilySlot::failure(address, outcome.error));
                }
                Err(DomainError::Cancelled) => break,
                Err(err) => {
                    warn!(%err, %address, "prober returned an unexpected error");
                    last_failure = Some(FamilySlot::failure(address, err.to_string()));
                }
            }
        }

        (last_failure.unwrap_or_default(), false)
    }

    fn enqueue_whois(&self, hostname: &str) {
        let Some(domain) = registrable_domain(hostname) else {
            return;
        };
        if self.whois_queue.try_send(domain).is_err() {
            debug!(hostname, "whois queue full or closed, dropping lookup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodewatch_application::ports::{DnsLookupResult, ProbeOutcome};
    use nodewatch_domain::{GeoRecord, NodeAddress, ProtocolTag};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubDns(DnsLookupResult);
    #[async_trait]
    impl DnsLookup for StubDns {
        async fn resolve(&self, _hostname: &str) -> Result<DnsLookupResult, DomainError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDns;
    #[async_trait]
    impl DnsLookup for FailingDns {
        async fn resolve(&self, _hostname: &str) -> Result<DnsLookupResult, DomainError> {
            Err(DomainError::Dns("nxdomain".to_string()))
        }
    }

    struct StubGeo;
    #[async_trait]
    impl GeoLocator for StubGeo {
        async fn locate(&self, _address: IpAddr) -> Result<Option<GeoRecord>, DomainError> {
            Ok(Some(GeoRecord {
                country: Some("US".to_string()),
                city: None,
                asn: None,
            }))
        }
    }

    struct AlwaysSucceedsProber {
        tag: ProtocolTag,
        calls: AtomicUsize,
    }
    #[async_trait]
    impl Prober for AlwaysSucceedsProber {
        fn tag(&self) -> ProtocolTag {
            self.tag
        }
        async fn probe(
            &self,
            target: &ProbeTarget,
            _cancel: &CancellationToken,
        ) -> Result<ProbeOutcome, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeOutcome::success(42, target.expected_identity, true))
        }
    }

    fn test_node(hostnames: &[&str], protocols: &[ProtocolTag]) -> Node {
        let mut node = Node::new(NodeAddress::new(2, 5001, 100));
        node.hostnames = hostnames.iter().map(|h| Arc::from(*h)).collect();
        node.protocols = protocols.iter().copied().collect();
        node
    }

    #[tokio::test]
    async fn dns_failure_skips_geo_and_probes() {
        let (tx, _rx) = mpsc::channel(8);
        let executor = TestExecutor::new(
            Arc::new(FailingDns),
            Arc::new(StubGeo),
            vec![],
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(&["a.example.com"], &[ProtocolTag::Ibn]);

        let results = executor.run(&mut node, &CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].dns_error.is_empty());
        assert!(results[0].geo.is_none());
        assert!(!results[0].is_operational);
    }

    #[tokio::test]
    async fn successful_probe_marks_operational_and_validated() {
        let (tx, _rx) = mpsc::channel(8);
        let dns = DnsLookupResult {
            v4: vec![Ipv4Addr::new(1, 2, 3, 4)],
            v6: vec![],
        };
        let prober = Arc::new(AlwaysSucceedsProber {
            tag: ProtocolTag::Ibn,
            calls: AtomicUsize::new(0),
        });
        let executor = TestExecutor::new(
            Arc::new(StubDns(dns)),
            Arc::new(StubGeo),
            vec![prober],
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(&["a.example.com"], &[ProtocolTag::Ibn]);

        let results = executor.run(&mut node, &CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.is_operational);
        assert!(result.geo.is_some());
        let ibn = result.protocols.get(&ProtocolTag::Ibn).unwrap();
        assert!(ibn.v4.success);
        assert!(ibn.address_validated);
    }

    #[tokio::test]
    async fn multiple_hostnames_are_tested_in_order() {
        let (tx, _rx) = mpsc::channel(8);
        let executor = TestExecutor::new(
            Arc::new(FailingDns),
            Arc::new(StubGeo),
            vec![],
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(&["a.example.com", "b.example.com"], &[]);

        let results = executor.run(&mut node, &CancellationToken::new()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(&*results[0].tested_hostname, "a.example.com");
        assert_eq!(&*results[1].tested_hostname, "b.example.com");
        assert_eq!(results[0].hostname_index, 0);
        assert_eq!(results[1].hostname_index, 1);
    }

    #[tokio::test]
    async fn protocols_are_probed_in_fixed_tag_order() {
        let (tx, _rx) = mpsc::channel(8);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct RecordingProber {
            tag: ProtocolTag,
            order: Arc<std::sync::Mutex<Vec<ProtocolTag>>>,
        }
        #[async_trait]
        impl Prober for RecordingProber {
            fn tag(&self) -> ProtocolTag {
                self.tag
            }
            async fn probe(
                &self,
                target: &ProbeTarget,
                _cancel: &CancellationToken,
            ) -> Result<ProbeOutcome, DomainError> {
                self.order.lock().unwrap().push(self.tag);
                Ok(ProbeOutcome::success(1, target.expected_identity, true))
            }
        }

        let dns = DnsLookupResult {
            v4: vec![Ipv4Addr::new(1, 2, 3, 4)],
            v6: vec![],
        };
        // Node declares protocols in reverse of the fixed tag order; the
        // executor must still probe them IBN, IFC, ITN regardless of this
        // `HashSet`'s arbitrary iteration order.
        let probers: Vec<Arc<dyn Prober>> = vec![
            Arc::new(RecordingProber { tag: ProtocolTag::Itn, order: order.clone() }),
            Arc::new(RecordingProber { tag: ProtocolTag::Ifc, order: order.clone() }),
            Arc::new(RecordingProber { tag: ProtocolTag::Ibn, order: order.clone() }),
        ];
        let executor = TestExecutor::new(
            Arc::new(StubDns(dns)),
            Arc::new(StubGeo),
            probers,
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(
            &["a.example.com"],
            &[ProtocolTag::Itn, ProtocolTag::Ibn, ProtocolTag::Ifc],
        );

        executor.run(&mut node, &CancellationToken::new()).await;
        assert_eq!(
            order.lock().unwrap().as_slice(),
            &[ProtocolTag::Ibn, ProtocolTag::Ifc, ProtocolTag::Itn]
        );
    }

    #[tokio::test]
    async fn pre_cancelled_token_produces_no_results() {
        let (tx, _rx) = mpsc::channel(8);
        let executor = TestExecutor::new(
            Arc::new(FailingDns),
            Arc::new(StubGeo),
            vec![],
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(&["a.example.com", "b.example.com"], &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = executor.run(&mut node, &cancel).await;
        assert!(results.is_empty());
    }

    /// Cancels once the first hostname's DNS lookup runs, so the inter-hostname
    /// wait must observe it and skip the second hostname entirely.
    struct CancelAfterFirstDns {
        cancel: CancellationToken,
    }
    #[async_trait]
    impl DnsLookup for CancelAfterFirstDns {
        async fn resolve(&self, hostname: &str) -> Result<DnsLookupResult, DomainError> {
            if hostname == "a.example.com" {
                self.cancel.cancel();
            }
            Err(DomainError::Dns("nxdomain".to_string()))
        }
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_hostname() {
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let executor = TestExecutor::new(
            Arc::new(CancelAfterFirstDns { cancel: cancel.clone() }),
            Arc::new(StubGeo),
            vec![],
            tx,
            ProtocolsConfig::default(),
        );
        let mut node = test_node(&["a.example.com", "b.example.com"], &[]);

        let results = executor.run(&mut node, &cancel).await;
        assert_eq!(results.len(), 1);
    }
}
