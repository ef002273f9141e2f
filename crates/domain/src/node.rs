use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;
use crate::protocol::ProtocolTag;
use crate::schedule::TestReason;

/// A peer in the directory, addressed `zone:net/node`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: NodeAddress,

    /// Ordered list of 0..N DNS names. Empty is allowed; `ensure_hostname`
    /// promotes a synthetic entry when possible.
    pub hostnames: Vec<Arc<str>>,

    pub protocols: HashSet<ProtocolTag>,

    /// Per-tag TCP port override.
    pub protocol_ports: HashMap<ProtocolTag, u16>,

    /// Free-form tag set. A subset (`CW:`/`CD:` prefixed entries) controls
    /// the node's call window; others (`binkp`, `telnet`, ...) feed priority.
    pub flags: HashSet<Arc<str>>,

    pub has_internet: bool,

    /// Set by the Scheduler for observability; not part of the node's
    /// identity and never persisted as directory state.
    #[serde(skip)]
    pub test_reason: Option<TestReason>,
}

impl Node {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            hostnames: Vec::new(),
            protocols: HashSet::new(),
            protocol_ports: HashMap::new(),
            flags: HashSet::new(),
            has_internet: false,
            test_reason: None,
        }
    }

    /// Promotes a synthetic hostname entry when `hostnames` is empty but a
    /// usable fallback identifier exists (the dotted node address). Returns
    /// `true` if a hostname was promoted.
    pub fn ensure_hostname(&mut self) -> bool {
        if !self.hostnames.is_empty() {
            return false;
        }
        if self.has_internet || !self.flags.is_empty() {
            self.hostnames
                .push(Arc::from(self.fallback_identifier().as_str()));
            return true;
        }
        false
    }

    fn fallback_identifier(&self) -> String {
        format!(
            "p{}.f{}.n{}.z{}.fallback",
            self.address.node, self.address.node, self.address.net, self.address.zone
        )
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    /// Port to use for `tag`: node override if present, else the protocol default.
    pub fn port_for(&self, tag: ProtocolTag) -> u16 {
        self.protocol_ports
            .get(&tag)
            .copied()
            .unwrap_or_else(|| tag.default_port())
    }

    /// The `(has_internet, hostnames, protocols, protocol_ports)` fingerprint
    /// compared during directory refresh to detect a configuration change.
    pub fn internet_config_fingerprint(&self) -> InternetConfigFingerprint {
        InternetConfigFingerprint {
            has_internet: self.has_internet,
            hostnames: self.hostnames.clone(),
            protocols: {
                let mut v: Vec<ProtocolTag> = self.protocols.iter().copied().collect();
                v.sort_by_key(|t| t.as_str());
                v
            },
            protocol_ports: {
                let mut v: Vec<(ProtocolTag, u16)> =
                    self.protocol_ports.iter().map(|(k, v)| (*k, *v)).collect();
                v.sort_by_key(|(t, _)| t.as_str());
                v
            },
        }
    }

    /// The node's call window, if its flags restrict when it may be tested.
    pub fn call_window(&self) -> Option<CallWindow> {
        CallWindow::from_flags(&self.flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternetConfigFingerprint {
    has_internet: bool,
    hostnames: Vec<Arc<str>>,
    protocols: Vec<ProtocolTag>,
    protocol_ports: Vec<(ProtocolTag, u16)>,
}

/// A per-node time-of-day / day-of-week availability window.
///
/// Encoded via two flag entries: `CW:HHMM-HHMM` (UTC daily window) and
/// `CD:<7 chars>` (one `Y`/`N` per day, Monday first). Either may be absent;
/// a node with neither flag has no restriction.
#[derive(Debug, Clone, Copy)]
pub struct CallWindow {
    start_minute: Option<u32>,
    end_minute: Option<u32>,
    days: Option<[bool; 7]>,
}

impl CallWindow {
    pub fn from_flags(flags: &HashSet<Arc<str>>) -> Option<Self> {
        let mut window: Option<(u32, u32)> = None;
        let mut days: Option<[bool; 7]> = None;

        for flag in flags {
            if let Some(range) = flag.strip_prefix("CW:") {
                window = parse_window(range);
            } else if let Some(mask) = flag.strip_prefix("CD:") {
                days = parse_days(mask);
            }
        }

        if window.is_none() && days.is_none() {
            return None;
        }

        Some(Self {
            start_minute: window.map(|(s, _)| s),
            end_minute: window.map(|(_, e)| e),
            days,
        })
    }

    /// Whether `now` falls within this node's call window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if let Some(days) = self.days {
            let weekday_idx = now.weekday().num_days_from_monday() as usize;
            if !days[weekday_idx] {
                return false;
            }
        }

        if let (Some(start), Some(end)) = (self.start_minute, self.end_minute) {
            let minute_of_day = now.hour() * 60 + now.minute();
            return if start <= end {
                minute_of_day >= start && minute_of_day < end
            } else {
                // Window wraps past midnight, e.g. 23:00-06:00.
                minute_of_day >= start || minute_of_day < end
            };
        }

        true
    }
}

fn parse_window(range: &str) -> Option<(u32, u32)> {
    let (start, end) = range.split_once('-')?;
    Some((parse_hhmm(start)?, parse_hhmm(end)?))
}

fn parse_hhmm(s: &str) -> Option<u32> {
    if s.len() != 4 {
        return None;
    }
    let hh: u32 = s[0..2].parse().ok()?;
    let mm: u32 = s[2..4].parse().ok()?;
    if hh > 23 || mm > 59 {
        return None;
    }
    Some(hh * 60 + mm)
}

fn parse_days(mask: &str) -> Option<[bool; 7]> {
    let chars: Vec<char> = mask.chars().collect();
    if chars.len() != 7 {
        return None;
    }
    let mut days = [false; 7];
    for (i, c) in chars.iter().enumerate() {
        days[i] = matches!(c, 'Y' | 'y');
    }
    Some(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node_with_flags(flags: &[&str]) -> Node {
        let mut n = Node::new(NodeAddress::new(2, 5001, 100));
        n.flags = flags.iter().map(|f| Arc::from(*f)).collect();
        n
    }

    #[test]
    fn ensure_hostname_promotes_when_empty_and_eligible() {
        let mut node = Node::new(NodeAddress::new(2, 5001, 100));
        node.has_internet = true;
        assert!(node.ensure_hostname());
        assert_eq!(node.hostnames.len(), 1);
        assert!(!node.ensure_hostname(), "second call is a no-op");
    }

    #[test]
    fn ensure_hostname_leaves_empty_without_fallback() {
        let mut node = Node::new(NodeAddress::new(2, 5001, 100));
        assert!(!node.ensure_hostname());
        assert!(node.hostnames.is_empty());
    }

    #[test]
    fn call_window_plain_range() {
        let node = node_with_flags(&["CW:2200-0600"]);
        let window = node.call_window().unwrap();

        let inside = Utc.with_ymd_and_hms(2026, 1, 5, 23, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        assert!(window.contains(inside));
        assert!(!window.contains(outside));
    }

    #[test]
    fn call_window_day_restriction() {
        let node = node_with_flags(&["CD:YNNNNNY"]);
        let window = node.call_window().unwrap();

        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 12, 0, 0).unwrap();
        assert!(window.contains(monday));
        assert!(!window.contains(tuesday));
    }

    #[test]
    fn no_flags_means_no_restriction() {
        let node = Node::new(NodeAddress::new(2, 5001, 100));
        assert!(node.call_window().is_none());
    }

    #[test]
    fn fingerprint_changes_when_hostnames_change() {
        let mut a = Node::new(NodeAddress::new(2, 5001, 100));
        let b = a.clone();
        a.hostnames.push(Arc::from("a.example"));
        assert_ne!(a.internet_config_fingerprint(), b.internet_config_fingerprint());
    }
}
