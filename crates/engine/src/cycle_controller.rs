use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodewatch_application::ports::{
    Clock, ControlSurface, DnsLookup, GeoLocator, NodeInfo, Prober, StatusReport, StorageGateway,
    WorkerStatus,
};
use nodewatch_domain::{
    AggregatedResult, Config, DailyStats, DomainError, FlagSlice, Node, NodeAddress, ProtocolTag,
    TestLimit,
};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator;
use crate::executor::TestExecutor;
use crate::scheduler::Scheduler;
use crate::whois_worker::WhoisWorker;
use crate::worker_pool::WorkerPool;

const DIRECTORY_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Owns the main periodic loop: pause/resume, live reconfiguration, and
/// directory-refresh detection. The only component that talks to every
/// other one.
pub struct CycleController {
    config: RwLock<Config>,
    storage: Arc<dyn StorageGateway>,
    scheduler: Arc<Scheduler>,
    pool: Arc<WorkerPool>,
    executor: RwLock<TestExecutor>,
    whois_worker: Arc<WhoisWorker>,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,

    paused: RwLock<bool>,
    debug: AtomicBool,
    cycle_count: AtomicU64,
    last_cycle_at: RwLock<Option<DateTime<Utc>>>,
    last_directory_revision: Mutex<u64>,
}

impl CycleController {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: Config,
        storage: Arc<dyn StorageGateway>,
        dns: Arc<dyn DnsLookup>,
        geo: Arc<dyn GeoLocator>,
        probers: Vec<Arc<dyn Prober>>,
        whois_worker: Arc<WhoisWorker>,
        clock: Arc<dyn Clock>,
        cancellation: CancellationToken,
    ) -> Result<Arc<Self>, DomainError> {
        config
            .validate()
            .map_err(|err| DomainError::Configuration(err.to_string()))?;

        let scheduler = Arc::new(Scheduler::new(clock.clone(), &config));
        let nodes = storage.read_directory().await?;
        scheduler.initialize_schedules(nodes).await;
        let revision = storage.read_directory_revision().await?;

        let pool = WorkerPool::new(
            config.workers,
            config.workers * 2,
            cancellation.child_token(),
        );

        let executor = TestExecutor::new(
            dns,
            geo,
            probers,
            whois_sender(&whois_worker),
            config.protocols.clone(),
        );

        Ok(Arc::new(Self {
            config: RwLock::new(config),
            storage,
            scheduler,
            pool,
            executor: RwLock::new(executor),
            whois_worker,
            clock,
            cancellation,
            paused: RwLock::new(false),
            debug: AtomicBool::new(false),
            cycle_count: AtomicU64::new(0),
            last_cycle_at: RwLock::new(None),
            last_directory_revision: Mutex::new(revision),
        }))
    }

    /// The main loop per §4.2. Consumes the `Arc` since it runs for the
    /// daemon's lifetime; returns once cancellation fires or (in `run_once`
    /// mode) after one cycle.
    pub async fn run(self: Arc<Self>) {
        let run_once = self.config.read().await.run_once;
        let cli_only = self.config.read().await.cli_only;

        if run_once {
            Self::run_cycle(&self).await;
            self.pool.stop().await;
            return;
        }

        if cli_only {
            self.cancellation.cancelled().await;
            self.pool.stop().await;
            return;
        }

        let mut test_interval = tokio::time::interval(self.config.read().await.test_interval);
        let mut directory_poll = tokio::time::interval(DIRECTORY_POLL_INTERVAL);
        test_interval.tick().await;
        directory_poll.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                _ = test_interval.tick() => {
                    if *self.paused.read().await {
                        debug!("cycle tick skipped: paused");
                    } else {
                        Self::run_cycle(&self).await;
                    }
                }
                _ = directory_poll.tick() => self.poll_directory().await,
            }
        }

        self.pool.stop().await;
        self.whois_worker.stop().await;
        info!("cycle controller stopped");
    }

    async fn poll_directory(&self) {
        let revision = match self.storage.read_directory_revision().await {
            Ok(revision) => revision,
            Err(err) => {
                warn!(%err, "failed to read directory revision");
                return;
            }
        };

        let mut last_seen = self.last_directory_revision.lock().await;
        if revision <= *last_seen {
            return;
        }

        match self.storage.read_directory().await {
            Ok(nodes) => {
                self.scheduler.refresh_nodes(nodes).await;
                *last_seen = revision;
                info!(revision, "directory refreshed");
            }
            Err(err) => warn!(%err, "failed to re-read directory during refresh"),
        }
    }

    /// §4.2's `RunCycle`.
    async fn run_cycle(self: &Arc<Self>) {
        let (batch_size, workers, test_limit, dry_run) = {
            let config = self.config.read().await;
            (
                config.batch_size,
                config.workers,
                config.test_limit.clone(),
                config.dry_run,
            )
        };

        let max = batch_size * workers;
        let mut candidates = self.scheduler.get_nodes_for_testing(max).await;
        if candidates.is_empty() {
            debug!("scheduler returned no ready nodes this cycle");
            return;
        }

        let limit = TestLimit::parse(&test_limit);
        if !matches!(limit, TestLimit::All) {
            candidates = apply_test_limit(&limit, candidates, self.clock.as_ref());
        }
        if candidates.is_empty() {
            debug!(test_limit, "test-limit filter excluded every ready node");
            return;
        }

        let mut cycle_results: Vec<AggregatedResult> = Vec::new();

        for batch in candidates.chunks(batch_size.max(1)) {
            let batch_results = Arc::new(Mutex::new(Vec::with_capacity(batch.len())));
            // Completion barrier: the Worker Pool's `submit` only confirms a
            // job was queued, not that it ran, so each job reports done()
            // here once it has pushed its result.
            let (done_tx, mut done_rx) = tokio::sync::mpsc::channel::<()>(batch.len().max(1));
            let mut submitted = 0usize;

            for (node, _reason) in batch {
                let node = node.clone();
                let controller = self.clone();
                let batch_results = batch_results.clone();
                let cancellation = self.cancellation.child_token();
                let address = node.address;
                let done_tx = done_tx.clone();

                let submit_result = self
                    .pool
                    .submit(async move {
                        if let Some(result) = controller.run_one_node(node, cancellation).await {
                            batch_results.lock().await.push(result);
                        } else {
                            debug!(%address, "node test produced no result (cancelled)");
                        }
                        let _ = done_tx.send(()).await;
                    })
                    .await;

                match submit_result {
                    Ok(()) => submitted += 1,
                    Err(err) => warn!(%err, %address, "failed to submit node test to worker pool"),
                }
            }
            drop(done_tx);

            for _ in 0..submitted {
                if done_rx.recv().await.is_none() {
                    break;
                }
            }

            let batch_results = Arc::try_unwrap(batch_results)
                .map(|m| m.into_inner())
                .unwrap_or_default();
            cycle_results.extend(batch_results);
        }

        if !dry_run {
            if let Err(err) = self.storage.append_results(&cycle_results).await {
                warn!(%err, count = cycle_results.len(), "bulk append of cycle results failed");
            }
        }

        self.cycle_count.fetch_add(1, Ordering::SeqCst);
        *self.last_cycle_at.write().await = Some(self.clock.now());

        self.persist_daily_stats(&cycle_results, dry_run).await;
    }

    async fn run_one_node(
        &self,
        mut node: Node,
        cancellation: CancellationToken,
    ) -> Option<AggregatedResult> {
        if cancellation.is_cancelled() {
            return None;
        }

        let per_hostname = {
            let executor = self.executor.read().await;
            executor.run(&mut node, &cancellation).await
        };
        if per_hostname.is_empty() {
            return None;
        }

        let dry_run = self.config.read().await.dry_run;
        if !dry_run {
            for result in &per_hostname {
                if let Err(err) = self.storage.append_result(result).await {
                    warn!(%err, address = %node.address, "failed to persist per-hostname result");
                }
            }
        }

        let aggregated = aggregator::aggregate(&node, &per_hostname);

        self.scheduler
            .update_test_result(node.address, aggregated.is_operational)
            .await;

        Some(aggregated)
    }

    async fn persist_daily_stats(&self, results: &[AggregatedResult], dry_run: bool) {
        if results.is_empty() || dry_run {
            return;
        }

        let today = self.clock.now().date_naive();
        let mut stats = DailyStats::new(today);
        stats.nodes_tested = results.len();
        for result in results {
            if result.is_operational {
                stats.nodes_operational += 1;
            }
            if result.has_connectivity_issues {
                stats.nodes_with_connectivity_issues += 1;
            }
            if !result.is_operational && !result.has_connectivity_issues {
                stats.failed += 1;
            }
            match (
                results_any_success(result, true),
                results_any_success(result, false),
            ) {
                (true, true) => stats.dual_stack += 1,
                (true, false) => stats.v4_only += 1,
                (false, true) => stats.v6_only += 1,
                (false, false) => {}
            }
        }

        if let Err(err) = self.storage.append_daily_stats(&stats).await {
            warn!(%err, "failed to persist daily stats");
        }
    }

    pub async fn reload_config(&self, path: Option<&str>) -> Result<(), DomainError> {
        let candidate = Config::load(path, nodewatch_domain::CliOverrides::default())
            .map_err(|err| DomainError::Configuration(err.to_string()))?;
        candidate
            .validate()
            .map_err(|err| DomainError::Configuration(err.to_string()))?;

        let mut config = self.config.write().await;
        config.apply_safe_reload(candidate);

        self.scheduler.set_config(&config).await;
        self.executor.write().await.set_protocols(config.protocols.clone());

        info!("configuration reloaded");
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), DomainError> {
        let mut paused = self.paused.write().await;
        if *paused {
            return Err(DomainError::Control("already paused".to_string()));
        }
        *paused = true;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), DomainError> {
        let mut paused = self.paused.write().await;
        if !*paused {
            return Err(DomainError::Control("not paused".to_string()));
        }
        *paused = false;
        Ok(())
    }

    pub async fn set_debug_mode(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::SeqCst);
    }

    pub async fn test_single_node(
        &self,
        spec: &str,
        protocol: Option<ProtocolTag>,
    ) -> Result<AggregatedResult, DomainError> {
        if let Ok(address) = NodeAddress::from_str(spec) {
            if let Some(node) = self.scheduler.get_node(address).await {
                let cancellation = self.cancellation.child_token();
                let executor = self.executor.read().await;
                let mut node = node;
                let results = executor.run(&mut node, &cancellation).await;
                if results.is_empty() {
                    return Err(DomainError::Cancelled);
                }
                return Ok(aggregator::aggregate(&node, &results));
            }
            return Err(DomainError::NotFound(spec.to_string()));
        }

        let (host, port) = parse_host_port(spec, protocol)?;
        let mut node = Node::new(NodeAddress::new(0, 0, 0));
        if let Some(tag) = protocol {
            node.protocols.insert(tag);
            node.protocol_ports.insert(tag, port);
        }
        node.hostnames.push(Arc::from(host.as_str()));

        let cancellation = self.cancellation.child_token();
        let executor = self.executor.read().await;
        let results = executor.run(&mut node, &cancellation).await;
        if results.is_empty() {
            return Err(DomainError::Cancelled);
        }
        Ok(aggregator::aggregate(&node, &results))
    }

    pub async fn get_node_info(&self, address: &str) -> Result<NodeInfo, DomainError> {
        let address = NodeAddress::from_str(address)
            .map_err(|_| DomainError::InvalidAddress(address.to_string()))?;
        let node = self
            .scheduler
            .get_node(address)
            .await
            .ok_or_else(|| DomainError::NotFound(address.to_string()))?;
        let schedule = self
            .scheduler
            .get_schedule(address)
            .await
            .ok_or_else(|| DomainError::NotFound(address.to_string()))?;
        Ok(NodeInfo { node, schedule })
    }
}

#[async_trait]
impl ControlSurface for CycleController {
    async fn get_status(&self) -> StatusReport {
        StatusReport {
            paused: *self.paused.read().await,
            dry_run: self.config.read().await.dry_run,
            debug: self.debug.load(Ordering::SeqCst),
            cycle_count: self.cycle_count.load(Ordering::SeqCst),
            last_cycle_at: *self.last_cycle_at.read().await,
            nodes_scheduled: self.scheduler.schedule_count().await,
        }
    }

    async fn get_worker_status(&self) -> WorkerStatus {
        WorkerStatus {
            workers: self.pool.workers(),
            active: self.pool.active_count(),
            queue_size: self.pool.queue_size(),
        }
    }

    async fn pause(&self) -> Result<(), DomainError> {
        CycleController::pause(self).await
    }

    async fn resume(&self) -> Result<(), DomainError> {
        CycleController::resume(self).await
    }

    async fn reload_config(&self, path: Option<&str>) -> Result<(), DomainError> {
        CycleController::reload_config(self, path).await
    }

    async fn test_single_node(
        &self,
        spec: &str,
        protocol: Option<ProtocolTag>,
    ) -> Result<AggregatedResult, DomainError> {
        CycleController::test_single_node(self, spec, protocol).await
    }

    async fn get_node_info(&self, address: &str) -> Result<NodeInfo, DomainError> {
        CycleController::get_node_info(self, address).await
    }

    async fn set_debug_mode(&self, enabled: bool) {
        CycleController::set_debug_mode(self, enabled).await
    }
}

fn results_any_success(result: &AggregatedResult, v4: bool) -> bool {
    result.protocols.values().any(|p| if v4 { p.v4.success } else { p.v6.success })
}

/// Bridges the Executor's queue-based WHOIS fire-and-forget interface onto
/// the `WhoisWorker`'s dedup-aware `enqueue`. A tiny forwarding task keeps
/// the Executor decoupled from `WhoisWorker` itself.
fn whois_sender(worker: &Arc<WhoisWorker>) -> tokio::sync::mpsc::Sender<String> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(256);
    let worker = worker.clone();
    tokio::spawn(async move {
        while let Some(domain) = rx.recv().await {
            worker.enqueue(domain);
        }
    });
    tx
}

fn parse_host_port(spec: &str, protocol: Option<ProtocolTag>) -> Result<(String, u16), DomainError> {
    let default_port = protocol.map(|tag| tag.default_port()).unwrap_or(0);

    if let Some(rest) = spec.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| DomainError::InvalidAddress(spec.to_string()))?;
        let port = match rest.strip_prefix(':') {
            Some(port_str) => port_str
                .parse()
                .map_err(|_| DomainError::InvalidAddress(spec.to_string()))?,
            None => default_port,
        };
        return Ok((host.to_string(), port));
    }

    if spec.parse::<IpAddr>().is_ok() {
        return Ok((spec.to_string(), default_port));
    }

    match spec.rsplit_once(':') {
        Some((host, port_str)) if port_str.chars().all(|c| c.is_ascii_digit()) => {
            let port = port_str
                .parse()
                .map_err(|_| DomainError::InvalidAddress(spec.to_string()))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((spec.to_string(), default_port)),
    }
}

fn apply_test_limit(
    limit: &TestLimit,
    candidates: Vec<(Node, nodewatch_domain::TestReason)>,
    clock: &dyn Clock,
) -> Vec<(Node, nodewatch_domain::TestReason)> {
    match limit {
        TestLimit::All => candidates,
        TestLimit::Single(address) => candidates
            .into_iter()
            .filter(|(node, _)| node.address == *address)
            .collect(),
        TestLimit::Zone(zone) => candidates
            .into_iter()
            .filter(|(node, _)| node.address.zone == *zone)
            .collect(),
        TestLimit::Net(zone, net) => candidates
            .into_iter()
            .filter(|(node, _)| node.address.zone == *zone && node.address.net == *net)
            .collect(),
        TestLimit::Protocol(tag) => candidates
            .into_iter()
            .filter(|(node, _)| node.protocols.contains(tag))
            .collect(),
        TestLimit::FlagSlice(slice) => candidates
            .into_iter()
            .filter(|(node, _)| matches_flag_slice(node, *slice))
            .collect(),
        TestLimit::Count(n) => shuffled_take(candidates, *n, clock),
        TestLimit::Percent(pct) => {
            let take = ((candidates.len() * (*pct as usize)) / 100).max(1);
            shuffled_take(candidates, take, clock)
        }
        TestLimit::Unrecognized(raw) => {
            warn!(test_limit = raw, "unrecognized test-limit selector, running unfiltered");
            candidates
        }
    }
}

fn matches_flag_slice(node: &Node, slice: FlagSlice) -> bool {
    match slice {
        FlagSlice::Online => node.has_internet,
        FlagSlice::Hubs => node.flags.iter().any(|f| f.eq_ignore_ascii_case("hub")),
        FlagSlice::Hosts => node.flags.iter().any(|f| f.eq_ignore_ascii_case("host")),
        FlagSlice::Multi => node.hostnames.len() > 1,
    }
}

/// Fisher-Yates, seeded from the clock per §6's grammar note.
fn shuffled_take(
    mut candidates: Vec<(Node, nodewatch_domain::TestReason)>,
    n: usize,
    clock: &dyn Clock,
) -> Vec<(Node, nodewatch_domain::TestReason)> {
    let seed = clock.now().timestamp_nanos_opt().unwrap_or(0) as u64;
    fastrand::seed(seed);
    fastrand::shuffle(&mut candidates);
    candidates.truncate(n);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodewatch_application::ports::{DnsLookupResult, GeoRecord, ProbeOutcome, WhoisLookup, WhoisService};
    use nodewatch_domain::{DailyStats, Node, PerHostnameResult};
    use std::net::Ipv4Addr;
    use std::sync::Mutex as StdMutex;

    struct StubDns;
    #[async_trait]
    impl DnsLookup for StubDns {
        async fn resolve(&self, _hostname: &str) -> Result<DnsLookupResult, DomainError> {
            Ok(DnsLookupResult {
                v4: vec![Ipv4Addr::new(1, 2, 3, 4)],
                v6: vec![],
            })
        }
    }

    struct StubGeo;
    #[async_trait]
    impl GeoLocator for StubGeo {
        async fn locate(&self, _address: IpAddr) -> Result<Option<GeoRecord>, DomainError> {
            Ok(None)
        }
    }

    struct AlwaysSucceedsProber;
    #[async_trait]
    impl Prober for AlwaysSucceedsProber {
        fn tag(&self) -> ProtocolTag {
            ProtocolTag::Ibn
        }
        async fn probe(
            &self,
            target: &ProbeTarget,
            _cancel: &CancellationToken,
        ) -> Result<ProbeOutcome, DomainError> {
            Ok(ProbeOutcome::success(10, target.expected_identity, true))
        }
    }

    struct StubWhois;
    #[async_trait]
    impl WhoisService for StubWhois {
        async fn lookup(&self, _domain: &str) -> Result<WhoisLookup, DomainError> {
            Ok(WhoisLookup::NotFound)
        }
    }

    struct InMemoryStorage {
        nodes: Vec<Node>,
        revision: u64,
        results: StdMutex<Vec<AggregatedResult>>,
        daily: StdMutex<Vec<DailyStats>>,
    }

    #[async_trait]
    impl StorageGateway for InMemoryStorage {
        async fn read_directory(&self) -> Result<Vec<Node>, DomainError> {
            Ok(self.nodes.clone())
        }
        async fn read_directory_revision(&self) -> Result<u64, DomainError> {
            Ok(self.revision)
        }
        async fn read_history(
            &self,
            _address: NodeAddress,
            _limit: usize,
        ) -> Result<Vec<AggregatedResult>, DomainError> {
            Ok(vec![])
        }
        async fn append_result(&self, _result: &PerHostnameResult) -> Result<(), DomainError> {
            Ok(())
        }
        async fn append_results(&self, results: &[AggregatedResult]) -> Result<(), DomainError> {
            self.results.lock().unwrap().extend_from_slice(results);
            Ok(())
        }
        async fn append_daily_stats(&self, stats: &DailyStats) -> Result<(), DomainError> {
            self.daily.lock().unwrap().push(stats.clone());
            Ok(())
        }
        async fn store_whois_result(
            &self,
            _outcome: &nodewatch_domain::WhoisOutcome,
        ) -> Result<(), DomainError> {
            Ok(())
        }
        async fn read_recent_whois(
            &self,
            _domain: &str,
        ) -> Result<Option<nodewatch_domain::WhoisOutcome>, DomainError> {
            Ok(None)
        }
    }

    fn test_node() -> Node {
        let mut node = Node::new(NodeAddress::new(2, 5001, 100));
        node.hostnames = vec![Arc::from("a.example.com")];
        node.protocols.insert(ProtocolTag::Ibn);
        node
    }

    async fn build_controller(nodes: Vec<Node>) -> Arc<CycleController> {
        let mut config = Config::default();
        config.run_once = true;
        config.workers = 2;
        config.batch_size = 2;

        let storage = Arc::new(InMemoryStorage {
            nodes,
            revision: 1,
            results: StdMutex::new(Vec::new()),
            daily: StdMutex::new(Vec::new()),
        });
        let clock = Arc::new(crate::clock::SystemClock);
        let whois = WhoisWorker::new(Arc::new(StubWhois), storage.clone(), clock.clone(), 8);

        CycleController::new(
            config,
            storage,
            Arc::new(StubDns),
            Arc::new(StubGeo),
            vec![Arc::new(AlwaysSucceedsProber)],
            whois,
            clock,
            CancellationToken::new(),
        )
        .await
        .expect("valid config builds a controller")
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips() {
        let controller = build_controller(vec![test_node()]).await;
        controller.pause().await.unwrap();
        assert!(controller.pause().await.is_err(), "double pause errs");
        controller.resume().await.unwrap();
        assert!(controller.resume().await.is_err(), "double resume errs");
    }

    #[tokio::test]
    async fn run_once_tests_every_ready_node_and_persists_results() {
        let controller = build_controller(vec![test_node()]).await;
        controller.clone().run().await;

        let status = controller.get_status().await;
        assert_eq!(status.cycle_count, 1);
        assert!(status.last_cycle_at.is_some());
    }

    #[tokio::test]
    async fn test_single_node_by_address_uses_directory_entry() {
        let controller = build_controller(vec![test_node()]).await;
        let result = controller
            .test_single_node("2:5001/100", None)
            .await
            .unwrap();
        assert!(result.is_operational);
    }

    #[tokio::test]
    async fn test_single_node_rejects_unknown_address() {
        let controller = build_controller(vec![test_node()]).await;
        let result = controller.test_single_node("2:5001/999", None).await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_single_node_by_hostname_probes_directly() {
        let controller = build_controller(vec![]).await;
        let result = controller
            .test_single_node("host.example.com", Some(ProtocolTag::Ibn))
            .await
            .unwrap();
        assert!(result.is_operational);
    }

    #[test]
    fn host_port_parsing_handles_bracketed_ipv6_bare_host_and_explicit_port() {
        assert_eq!(
            parse_host_port("[::1]:8080", None).unwrap(),
            ("::1".to_string(), 8080)
        );
        assert_eq!(
            parse_host_port("example.com:4000", None).unwrap(),
            ("example.com".to_string(), 4000)
        );
        assert_eq!(
            parse_host_port("example.com", Some(ProtocolTag::Ibn)).unwrap(),
            ("example.com".to_string(), 24554)
        );
    }

    #[test]
    fn flag_slice_multi_matches_nodes_with_more_than_one_hostname() {
        let mut node = test_node();
        node.hostnames.push(Arc::from("b.example.com"));
        assert!(matches_flag_slice(&node, FlagSlice::Multi));
        assert!(!matches_flag_slice(&node, FlagSlice::Online));
    }
}
