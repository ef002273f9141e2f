//! Renders façade responses as the plain newline-terminated text the
//! control surface transport promises: `status`/`workers`/`info`/`test`
//! return multi-field summaries, everything else a single `OK`/`ERR <reason>`.

use nodewatch_application::ports::{NodeInfo, StatusReport, WorkerStatus};
use nodewatch_domain::{AggregatedResult, DomainError};

pub fn ok() -> String {
    "OK".to_string()
}

pub fn err(error: &DomainError) -> String {
    format!("ERR {error}")
}

pub fn status(report: &StatusReport) -> String {
    format!(
        "paused={} dry_run={} debug={} cycle_count={} last_cycle_at={} nodes_scheduled={}",
        report.paused,
        report.dry_run,
        report.debug,
        report.cycle_count,
        report
            .last_cycle_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        report.nodes_scheduled,
    )
}

pub fn workers(status: &WorkerStatus) -> String {
    format!(
        "workers={} active={} queue_size={}",
        status.workers, status.active, status.queue_size
    )
}

pub fn node_info(info: &NodeInfo) -> String {
    format!(
        "address={} hostnames={} protocols={} last_test_time={} last_test_success={} \
         consecutive_fails={} backoff_level={} next_test_time={} priority={} test_reason={}",
        info.node.address,
        info.node.hostnames.join(","),
        info.node
            .protocols
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(","),
        info.schedule
            .last_test_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
        info.schedule.last_test_success,
        info.schedule.consecutive_fails,
        info.schedule.backoff_level,
        info.schedule.next_test_time.to_rfc3339(),
        info.schedule.priority,
        info.schedule.test_reason.as_str(),
    )
}

pub fn aggregated_result(result: &AggregatedResult) -> String {
    format!(
        "address={} tested_hostname={} is_operational={} has_connectivity_issues={} \
         hostnames_tested={}/{} operational={} dns_error={}",
        result.address,
        result.tested_hostname,
        result.is_operational,
        result.has_connectivity_issues,
        result.hostnames_tested,
        result.total_hostnames,
        result.hostnames_operational,
        if result.dns_error.is_empty() {
            "none"
        } else {
            &result.dns_error
        },
    )
}
