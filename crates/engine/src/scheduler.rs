use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nodewatch_application::ports::Clock;
use nodewatch_domain::{
    backoff_level_for, Config, Node, NodeAddress, NodeSchedule, ProtocolTag, SchedulerConfig,
    SchedulerStrategy, TestReason,
};
use tokio::sync::RwLock;
use tracing::debug;

/// `SchedulerConfig` plus the one value it can't resolve on its own —
/// `stale_test_threshold` defaults to the cycle tick, which only the
/// top-level `Config` knows.
#[derive(Debug, Clone)]
struct ResolvedConfig {
    scheduler: SchedulerConfig,
    stale_threshold: StdDuration,
}

impl ResolvedConfig {
    fn from_config(config: &Config) -> Self {
        Self {
            scheduler: config.scheduler.clone(),
            stale_threshold: config.stale_test_threshold(),
        }
    }
}

/// Maintains per-node schedule entries; chooses when each node next runs;
/// orders the ready set. The only core component with no suspension point —
/// every operation here is bounded, in-memory, lock-protected.
pub struct Scheduler {
    clock: Arc<dyn Clock>,
    schedules: RwLock<HashMap<NodeAddress, NodeSchedule>>,
    nodes: RwLock<HashMap<NodeAddress, Node>>,
    /// Insertion order, for the `Regular` strategy's ordering guarantee.
    /// A `HashMap` alone cannot offer that.
    order: RwLock<Vec<NodeAddress>>,
    config: RwLock<ResolvedConfig>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            clock,
            schedules: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            config: RwLock::new(ResolvedConfig::from_config(config)),
        }
    }

    pub async fn set_config(&self, config: &Config) {
        *self.config.write().await = ResolvedConfig::from_config(config);
    }

    pub async fn schedule_count(&self) -> usize {
        self.schedules.read().await.len()
    }

    /// First-ever read of the directory. Equivalent to `RefreshNodes` against
    /// an empty prior set.
    pub async fn initialize_schedules(&self, nodes: Vec<Node>) {
        self.refresh_nodes(nodes).await;
    }

    /// `RefreshNodes`: idempotent (P5). Inserts new nodes, detects
    /// internet-configuration changes on known ones, and drops vanished ones.
    pub async fn refresh_nodes(&self, incoming: Vec<Node>) {
        let now = self.clock.now();
        let cfg = self.config.read().await.clone();
        let mut schedules = self.schedules.write().await;
        let mut nodes = self.nodes.write().await;
        let mut order = self.order.write().await;

        let incoming_keys: std::collections::HashSet<NodeAddress> =
            incoming.iter().map(|n| n.address).collect();

        for mut node in incoming {
            let address = node.address;
            node.ensure_hostname();
            let priority = compute_priority(&node, cfg.scheduler.priority_boost);

            match schedules.get_mut(&address) {
                None => {
                    let schedule = NodeSchedule::new(address, priority, now);
                    schedules.insert(address, schedule);
                    order.push(address);
                    nodes.insert(address, node);
                    debug!(%address, "new node discovered");
                }
                Some(schedule) => {
                    let changed = nodes
                        .get(&address)
                        .map(|existing| {
                            existing.internet_config_fingerprint()
                                != node.internet_config_fingerprint()
                        })
                        .unwrap_or(true);
                    schedule.priority = priority;
                    if changed {
                        schedule.next_test_time = now;
                        schedule.backoff_level = 0;
                        schedule.test_reason = TestReason::ConfigChanged;
                        debug!(%address, "node config changed, forcing retest");
                    }
                    nodes.insert(address, node);
                }
            }
        }

        let vanished: Vec<NodeAddress> = schedules
            .keys()
            .filter(|addr| !incoming_keys.contains(addr))
            .copied()
            .collect();
        for addr in &vanished {
            schedules.remove(addr);
            nodes.remove(addr);
        }
        order.retain(|addr| !vanished.contains(addr));
    }

    /// Returns up to `max` ready nodes, ordered per `scheduler.strategy`.
    pub async fn get_nodes_for_testing(&self, max: usize) -> Vec<(Node, TestReason)> {
        let now = self.clock.now();
        let cfg = self.config.read().await.clone();
        let mut schedules = self.schedules.write().await;
        let nodes = self.nodes.read().await;
        let order = self.order.read().await;

        let mut ready: Vec<NodeAddress> = Vec::new();
        for address in order.iter() {
            let Some(schedule) = schedules.get_mut(address) else {
                continue;
            };
            let Some(node) = nodes.get(address) else {
                continue;
            };

            let stale_threshold =
                ChronoDuration::from_std(cfg.stale_threshold).unwrap_or(ChronoDuration::MAX);
            let stale = schedule
                .last_test_time
                .map(|t| now - t > stale_threshold)
                .unwrap_or(false);
            let due = schedule.next_test_time <= now;
            if !(due || stale) {
                continue;
            }

            if let Some(window) = node.call_window() {
                if !window.contains(now) {
                    schedule.test_reason = TestReason::OutsideCallWindow;
                    continue;
                }
            }

            let reason = if stale {
                TestReason::Stale
            } else if schedule.is_new() {
                TestReason::New
            } else if schedule.test_reason == TestReason::ConfigChanged {
                TestReason::ConfigChanged
            } else if schedule.consecutive_fails > 0 {
                TestReason::FailedRetry
            } else {
                TestReason::Scheduled
            };
            schedule.test_reason = reason;
            ready.push(*address);
        }

        match cfg.scheduler.strategy {
            SchedulerStrategy::Regular => {}
            SchedulerStrategy::Priority => {
                ready.sort_by(|a, b| {
                    let pa = schedules.get(a).map(|s| s.priority).unwrap_or(0);
                    let pb = schedules.get(b).map(|s| s.priority).unwrap_or(0);
                    pb.cmp(&pa)
                });
            }
            SchedulerStrategy::Adaptive => {
                ready.sort_by(|a, b| {
                    let sa = schedules.get(a).map(|s| adaptive_score(s, now)).unwrap_or(0.0);
                    let sb = schedules.get(b).map(|s| adaptive_score(s, now)).unwrap_or(0.0);
                    sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }
        ready.truncate(max);

        ready
            .into_iter()
            .filter_map(|addr| {
                let node = nodes.get(&addr)?.clone();
                let reason = schedules.get(&addr)?.test_reason;
                Some((node, reason))
            })
            .collect()
    }

    /// `UpdateTestResult`: always happens in-memory, even if persistence
    /// later fails, so bookkeeping stays consistent (per §4.9).
    pub async fn update_test_result(&self, address: NodeAddress, success: bool) {
        let now = self.clock.now();
        let cfg = self.config.read().await.clone();
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&address) else {
            return;
        };

        schedule.last_test_time = Some(now);
        schedule.last_test_success = success;
        if success {
            schedule.consecutive_fails = 0;
            schedule.backoff_level = 0;
        } else {
            schedule.consecutive_fails += 1;
            schedule.backoff_level =
                backoff_level_for(schedule.consecutive_fails, cfg.scheduler.max_backoff_level);
        }

        let interval = calculate_interval(schedule, &cfg.scheduler);
        schedule.next_test_time = next_test_time(schedule, interval, now);
    }

    /// Operator-triggered: zeroes fail counters and forces an immediate retest.
    pub async fn reset_node_schedule(&self, address: NodeAddress) -> bool {
        let now = self.clock.now();
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&address) else {
            return false;
        };
        schedule.consecutive_fails = 0;
        schedule.backoff_level = 0;
        schedule.next_test_time = now;
        true
    }

    pub async fn get_schedule(&self, address: NodeAddress) -> Option<NodeSchedule> {
        self.schedules.read().await.get(&address).cloned()
    }

    pub async fn get_node(&self, address: NodeAddress) -> Option<Node> {
        self.nodes.read().await.get(&address).cloned()
    }
}

/// Start 50; add boosts for binkp/telnet tags, internet hostnames, and each
/// internet-protocol tag present. Clamped to 100.
fn compute_priority(node: &Node, boost: u8) -> u8 {
    let boost = boost as i32;
    let mut priority: i32 = 50;

    if node.protocols.contains(&ProtocolTag::Ibn) {
        priority += boost;
    }
    if node.protocols.contains(&ProtocolTag::Itn) {
        priority += boost / 2;
    }
    if node.has_internet {
        priority += boost;
    }
    for tag in [ProtocolTag::Ibn, ProtocolTag::Ifc] {
        if node.protocols.contains(&tag) {
            priority += boost;
        }
    }

    priority.clamp(0, 100) as u8
}

fn calculate_interval(schedule: &NodeSchedule, cfg: &SchedulerConfig) -> StdDuration {
    let regular = if schedule.last_test_success {
        cfg.base_interval
    } else {
        cfg.failed_retry_interval
    };

    let base = match cfg.strategy {
        SchedulerStrategy::Regular | SchedulerStrategy::Adaptive => regular,
        SchedulerStrategy::Priority => {
            let factor = 1.0 - (schedule.priority as f64 / 100.0) * 0.5;
            let scaled = regular.mul_f64(factor.max(0.5));
            scaled.max(regular.mul_f64(0.5))
        }
    };

    let jittered = apply_jitter(base, cfg.jitter_percent);
    jittered.clamp(cfg.min_interval, cfg.max_interval)
}

/// Uniform in `interval × [1 − jitter_percent, 1 + jitter_percent]`.
fn apply_jitter(interval: StdDuration, jitter_percent: u8) -> StdDuration {
    if jitter_percent == 0 {
        return interval;
    }
    let jitter = jitter_percent as f64 / 100.0;
    let factor = 1.0 + fastrand::f64() * 2.0 * jitter - jitter;
    interval.mul_f64(factor.max(0.0))
}

fn next_test_time(
    schedule: &NodeSchedule,
    interval: StdDuration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let Some(last) = schedule.last_test_time else {
        return now + random_duration(StdDuration::ZERO, StdDuration::from_secs(5 * 60));
    };

    let interval = ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::zero());
    let mut candidate = last + interval;

    if candidate < now {
        let elapsed = now - last;
        let interval_ms = interval.num_milliseconds().max(1);
        let intervals_elapsed = elapsed.num_milliseconds() / interval_ms;
        candidate = last + interval * (intervals_elapsed as i32 + 1);
        candidate += random_duration(StdDuration::ZERO, StdDuration::from_secs(3600));
    }

    candidate
}

fn random_duration(min: StdDuration, max: StdDuration) -> ChronoDuration {
    let span_ms = max.saturating_sub(min).as_millis().max(1) as u64;
    let offset_ms = fastrand::u64(0..=span_ms);
    ChronoDuration::milliseconds((min.as_millis() as u64 + offset_ms) as i64)
}

/// `priority + 20·[!success] + fails_bucket + hours_since_last_test × 0.5 +
/// max(0, hours_overdue) × 2`.
fn adaptive_score(schedule: &NodeSchedule, now: DateTime<Utc>) -> f64 {
    let mut score = schedule.priority as f64;
    if !schedule.last_test_success {
        score += 20.0;
    }

    score += match schedule.consecutive_fails {
        0..=3 => 30.0,
        4..=10 => 20.0,
        fails => -(fails as f64),
    };

    let hours_since_last_test = schedule
        .last_test_time
        .map(|t| (now - t).num_seconds() as f64 / 3600.0)
        .unwrap_or(0.0);
    score += hours_since_last_test * 0.5;

    let hours_overdue = (now - schedule.next_test_time).num_seconds() as f64 / 3600.0;
    score += hours_overdue.max(0.0) * 2.0;

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use nodewatch_domain::NodeAddress;

    fn node(addr: (u16, u16, u16), protocols: &[ProtocolTag]) -> Node {
        let mut n = Node::new(NodeAddress::new(addr.0, addr.1, addr.2));
        n.protocols = protocols.iter().copied().collect();
        n
    }

    #[tokio::test]
    async fn new_node_is_ready_immediately() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Scheduler::new(clock.clone(), &Config::default());
        scheduler
            .initialize_schedules(vec![node((2, 5001, 100), &[ProtocolTag::Ibn])])
            .await;

        let ready = scheduler.get_nodes_for_testing(10).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1, TestReason::New);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Scheduler::new(clock, &Config::default());
        let nodes = vec![node((2, 5001, 100), &[ProtocolTag::Ibn])];

        scheduler.refresh_nodes(nodes.clone()).await;
        let count_after_first = scheduler.schedule_count().await;
        scheduler.refresh_nodes(nodes).await;
        assert_eq!(scheduler.schedule_count().await, count_after_first);
    }

    #[tokio::test]
    async fn config_change_forces_retest() {
        let now = Utc::now();
        let clock = Arc::new(FakeClock::new(now));
        let scheduler = Scheduler::new(clock.clone(), &Config::default());

        let addr = NodeAddress::new(2, 450, 1024);
        let mut original = Node::new(addr);
        original.hostnames.push(Arc::from("a.example"));
        scheduler.initialize_schedules(vec![original]).await;

        // Force the node to be scheduled in the future so only the config
        // change, not staleness, would make it ready again.
        scheduler.update_test_result(addr, true).await;
        clock.advance(chrono::Duration::hours(1));

        let mut changed = Node::new(addr);
        changed.hostnames.push(Arc::from("a.example"));
        changed.hostnames.push(Arc::from("b.example"));
        scheduler.refresh_nodes(vec![changed]).await;

        let schedule = scheduler.get_schedule(addr).await.unwrap();
        assert_eq!(schedule.test_reason, TestReason::ConfigChanged);
        assert_eq!(schedule.backoff_level, 0);
        assert!(schedule.next_test_time <= clock.now());
    }

    #[tokio::test]
    async fn stale_catch_up_after_long_absence() {
        let now = Utc::now();
        let clock = Arc::new(FakeClock::new(now));
        let mut cfg = Config::default();
        cfg.scheduler.base_interval = StdDuration::from_secs(72 * 3600);
        let scheduler = Scheduler::new(clock.clone(), &cfg);

        let addr = NodeAddress::new(2, 5001, 100);
        scheduler
            .initialize_schedules(vec![node((2, 5001, 100), &[ProtocolTag::Ibn])])
            .await;
        scheduler.update_test_result(addr, true).await;

        clock.advance(chrono::Duration::hours(72 * 10));

        let ready = scheduler.get_nodes_for_testing(10).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1, TestReason::Stale);
    }

    #[tokio::test]
    async fn vanished_node_is_dropped() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let scheduler = Scheduler::new(clock, &Config::default());
        let addr = NodeAddress::new(2, 5001, 100);
        scheduler
            .initialize_schedules(vec![node((2, 5001, 100), &[])])
            .await;
        assert_eq!(scheduler.schedule_count().await, 1);

        scheduler.refresh_nodes(vec![]).await;
        assert_eq!(scheduler.schedule_count().await, 0);
        assert!(scheduler.get_node(addr).await.is_none());
    }

    #[tokio::test]
    async fn priority_strategy_orders_descending() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let mut cfg = Config::default();
        cfg.scheduler.strategy = SchedulerStrategy::Priority;
        let scheduler = Scheduler::new(clock, &cfg);

        let low = node((2, 1, 1), &[]);
        let high = node((2, 1, 2), &[ProtocolTag::Ibn, ProtocolTag::Ifc]);
        scheduler.initialize_schedules(vec![low, high.clone()]).await;

        let ready = scheduler.get_nodes_for_testing(10).await;
        assert_eq!(ready[0].0.address, high.address);
    }
}
