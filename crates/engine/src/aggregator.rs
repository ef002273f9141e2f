use std::net::IpAddr;

use nodewatch_domain::{AggregatedResult, Node, PerHostnameResult, ProtocolResult, ProtocolTag};

/// Folds a node's per-hostname results into the single authoritative
/// verdict, per §4.4. `results` may be empty (no hostname produced a
/// result, e.g. everything was cancelled) — the aggregate is then an
/// all-failed placeholder.
pub fn aggregate(node: &Node, results: &[PerHostnameResult]) -> AggregatedResult {
    let test_time = results
        .first()
        .map(|r| r.test_time)
        .unwrap_or_else(chrono::Utc::now);

    let resolved_v4 = union_preserving_order(results.iter().map(|r| r.resolved_v4.as_slice()));
    let resolved_v6 = union_preserving_order(results.iter().map(|r| r.resolved_v6.as_slice()));

    let geo = results.iter().find_map(|r| r.geo.clone());

    let mut protocols = std::collections::HashMap::new();
    for &tag in &node.protocols {
        let aggregated = aggregate_protocol(tag, results);
        protocols.insert(tag, aggregated);
    }

    let hostnames_operational = results.iter().filter(|r| r.is_operational).count();
    let hostnames_tested = results.len();
    let total_hostnames = node.hostnames.len().max(hostnames_tested);

    let tested_hostname = results
        .iter()
        .find(|r| r.is_operational)
        .or_else(|| results.iter().find(|r| r.dns_succeeded()))
        .map(|r| r.tested_hostname.clone())
        .unwrap_or_else(|| "".into());

    let dns_error = if results.iter().any(|r| r.dns_succeeded()) {
        String::new()
    } else {
        "All hostnames failed DNS resolution".to_string()
    };

    let any_protocol_succeeded = protocols.values().any(|p: &ProtocolResult| p.success());
    let any_dns_success = results.iter().any(|r| r.dns_succeeded());

    let (is_operational, has_connectivity_issues) = if any_protocol_succeeded {
        (true, false)
    } else if any_dns_success {
        (false, true)
    } else {
        (false, false)
    };

    AggregatedResult {
        address: node.address,
        test_time,
        tested_hostname,
        resolved_v4,
        resolved_v6,
        dns_error,
        geo,
        protocols,
        is_operational,
        is_aggregated: true,
        total_hostnames,
        hostnames_tested,
        hostnames_operational,
        has_connectivity_issues,
    }
}

fn aggregate_protocol(tag: ProtocolTag, results: &[PerHostnameResult]) -> ProtocolResult {
    results
        .iter()
        .filter_map(|r| r.protocols.get(&tag))
        .find(|p| p.success())
        .or_else(|| results.iter().filter_map(|r| r.protocols.get(&tag)).next())
        .cloned()
        .unwrap_or_else(|| {
            let mut result = ProtocolResult::default();
            result.v4.tested = true;
            result.v4.error = "Failed on all hostnames".to_string();
            result
        })
}

fn union_preserving_order<'a>(lists: impl Iterator<Item = &'a [IpAddr]>) -> Vec<IpAddr> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for list in lists {
        for &addr in list {
            if seen.insert(addr) {
                out.push(addr);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch_domain::NodeAddress;
    use std::net::Ipv4Addr;

    fn node_with(tags: &[ProtocolTag]) -> Node {
        let mut n = Node::new(NodeAddress::new(2, 5001, 100));
        n.hostnames = vec!["a.example".into(), "b.example".into()];
        n.protocols = tags.iter().copied().collect();
        n
    }

    fn result(hostname: &str, index: usize, operational: bool, v4: &[u8; 4]) -> PerHostnameResult {
        let mut r = PerHostnameResult::new(NodeAddress::new(2, 5001, 100), hostname.into(), index);
        r.resolved_v4 = vec![IpAddr::V4(Ipv4Addr::new(v4[0], v4[1], v4[2], v4[3]))];
        r.is_operational = operational;
        r
    }

    #[test]
    fn first_operational_hostname_wins_tested_hostname() {
        let node = node_with(&[]);
        let r1 = result("a.example", 0, false, &[1, 1, 1, 1]);
        let r2 = result("b.example", 1, true, &[2, 2, 2, 2]);

        let aggregated = aggregate(&node, &[r1, r2]);
        assert_eq!(&*aggregated.tested_hostname, "b.example");
        assert!(aggregated.is_operational);
        assert!(!aggregated.has_connectivity_issues);
    }

    #[test]
    fn dns_union_deduplicates_preserving_order() {
        let node = node_with(&[]);
        let mut r1 = result("a.example", 0, false, &[1, 1, 1, 1]);
        r1.resolved_v4.push(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)));
        let r2 = result("b.example", 1, false, &[1, 1, 1, 1]);

        let aggregated = aggregate(&node, &[r1, r2]);
        assert_eq!(
            aggregated.resolved_v4,
            vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            ]
        );
    }

    #[test]
    fn missing_protocol_gets_synthetic_failure() {
        let node = node_with(&[ProtocolTag::Ibn]);
        let r1 = result("a.example", 0, false, &[1, 1, 1, 1]);

        let aggregated = aggregate(&node, &[r1]);
        let ibn = aggregated.protocols.get(&ProtocolTag::Ibn).unwrap();
        assert!(!ibn.success());
        assert_eq!(ibn.v4.error, "Failed on all hostnames");
    }

    #[test]
    fn all_dns_failures_report_aggregate_error() {
        let node = node_with(&[]);
        let mut r1 = PerHostnameResult::new(node.address, "a.example".into(), 0);
        r1.dns_error = "nxdomain".to_string();
        let mut r2 = PerHostnameResult::new(node.address, "b.example".into(), 1);
        r2.dns_error = "nxdomain".to_string();

        let aggregated = aggregate(&node, &[r1, r2]);
        assert_eq!(aggregated.dns_error, "All hostnames failed DNS resolution");
        assert!(!aggregated.is_operational);
        assert!(!aggregated.has_connectivity_issues);
        assert_eq!(&*aggregated.tested_hostname, "");
    }

    #[test]
    fn dns_success_without_probe_success_flags_connectivity_issue() {
        let node = node_with(&[]);
        let r1 = result("a.example", 0, false, &[1, 1, 1, 1]);

        let aggregated = aggregate(&node, &[r1]);
        assert!(!aggregated.is_operational);
        assert!(aggregated.has_connectivity_issues);
    }

    #[test]
    fn empty_results_slice_is_handled() {
        let node = node_with(&[]);
        let aggregated = aggregate(&node, &[]);
        assert_eq!(aggregated.hostnames_tested, 0);
        assert!(!aggregated.is_operational);
    }
}
