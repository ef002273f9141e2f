use async_trait::async_trait;
use nodewatch_domain::{AggregatedResult, DailyStats, DomainError, Node, NodeAddress, PerHostnameResult, WhoisOutcome};

/// Reads the directory of candidate nodes, reads prior test history, appends
/// new results, appends daily aggregate stats.
///
/// The storage schema itself is opaque to the core (spec Non-goal); only
/// this contract matters to the engine. Implementations are expected to
/// serialise their own writes — the core assumes no locking on its side.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Reads the full directory of candidate nodes.
    async fn read_directory(&self) -> Result<Vec<Node>, DomainError>;

    /// Reads the directory's monotonically increasing revision marker.
    async fn read_directory_revision(&self) -> Result<u64, DomainError>;

    /// Reads up to `limit` most recent aggregated results for one node.
    async fn read_history(
        &self,
        address: NodeAddress,
        limit: usize,
    ) -> Result<Vec<AggregatedResult>, DomainError>;

    /// Appends a single per-hostname result, persisted immediately as the
    /// Test Executor walks a multi-hostname node.
    async fn append_result(&self, result: &PerHostnameResult) -> Result<(), DomainError>;

    /// Bulk-appends a batch's worth of aggregated results in one round-trip.
    async fn append_results(&self, results: &[AggregatedResult]) -> Result<(), DomainError>;

    /// Appends one cycle-day's aggregate statistics.
    async fn append_daily_stats(&self, stats: &DailyStats) -> Result<(), DomainError>;

    /// Stores the outcome of a WHOIS lookup.
    async fn store_whois_result(&self, outcome: &WhoisOutcome) -> Result<(), DomainError>;

    /// Reads the most recent stored WHOIS outcome for a domain, if any.
    async fn read_recent_whois(&self, domain: &str) -> Result<Option<WhoisOutcome>, DomainError>;
}
