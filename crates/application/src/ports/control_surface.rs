use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodewatch_domain::{AggregatedResult, DomainError, Node, NodeSchedule, ProtocolTag};

/// Snapshot returned by `status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub paused: bool,
    pub dry_run: bool,
    pub debug: bool,
    pub cycle_count: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub nodes_scheduled: usize,
}

/// Snapshot returned by `workers`.
#[derive(Debug, Clone, Copy)]
pub struct WorkerStatus {
    pub workers: usize,
    pub active: usize,
    pub queue_size: usize,
}

/// Snapshot returned by `info <address>`.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node: Node,
    pub schedule: NodeSchedule,
}

/// The narrow façade the control surface (and nothing else) depends on. The
/// Cycle Controller is its concrete implementation; breaks the cyclic
/// ownership a CLI adapter + daemon would otherwise share.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    async fn get_status(&self) -> StatusReport;

    async fn get_worker_status(&self) -> WorkerStatus;

    /// Errs if already paused.
    async fn pause(&self) -> Result<(), DomainError>;

    /// Errs if not currently paused.
    async fn resume(&self) -> Result<(), DomainError>;

    /// Re-reads and re-validates config from `path` (or the path given at
    /// startup), applying only the safe-reloadable subset.
    async fn reload_config(&self, path: Option<&str>) -> Result<(), DomainError>;

    async fn test_single_node(
        &self,
        spec: &str,
        protocol: Option<ProtocolTag>,
    ) -> Result<AggregatedResult, DomainError>;

    async fn get_node_info(&self, address: &str) -> Result<NodeInfo, DomainError>;

    async fn set_debug_mode(&self, enabled: bool);
}
