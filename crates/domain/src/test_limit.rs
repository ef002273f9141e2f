use std::str::FromStr;

use crate::address::NodeAddress;
use crate::protocol::ProtocolTag;

/// The test-limit grammar shared by configuration (`test_limit`) and the CLI
/// `test <spec> <protocol>` / restricted-run commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestLimit {
    /// `"" | "all"` — no filter.
    All,
    /// `"Z:N/D"` — exactly one node by address.
    Single(NodeAddress),
    /// `"<N>"` — N randomly selected nodes.
    Count(usize),
    /// `"<P>%"` — P percent randomly selected, floor 1.
    Percent(u8),
    /// `"zone:<Z>"` — topological slice.
    Zone(u16),
    /// `"net:<Z>:<N>"` — topological slice.
    Net(u16, u16),
    /// `"binkp" | "emsi" | "telnet" | "ftp"` — protocol capability.
    Protocol(ProtocolTag),
    /// `"online" | "hubs" | "hosts" | "multi"` — flag / topology slice.
    FlagSlice(FlagSlice),
    /// Anything unrecognised: the caller logs a warning and treats it as `All`.
    Unrecognized(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSlice {
    Online,
    Hubs,
    Hosts,
    Multi,
}

impl TestLimit {
    pub fn parse(input: &str) -> TestLimit {
        let trimmed = input.trim();

        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return TestLimit::All;
        }

        if let Ok(addr) = NodeAddress::from_str(trimmed) {
            return TestLimit::Single(addr);
        }

        if let Some(pct) = trimmed.strip_suffix('%') {
            if let Ok(p) = pct.parse::<u8>() {
                return TestLimit::Percent(p);
            }
        }

        if let Ok(n) = trimmed.parse::<usize>() {
            return TestLimit::Count(n);
        }

        if let Some(zone) = trimmed.strip_prefix("zone:") {
            if let Ok(z) = zone.parse::<u16>() {
                return TestLimit::Zone(z);
            }
        }

        if let Some(rest) = trimmed.strip_prefix("net:") {
            if let Some((z, n)) = rest.split_once(':') {
                if let (Ok(z), Ok(n)) = (z.parse::<u16>(), n.parse::<u16>()) {
                    return TestLimit::Net(z, n);
                }
            }
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "binkp" => return TestLimit::Protocol(ProtocolTag::Ibn),
            "emsi" => return TestLimit::Protocol(ProtocolTag::Ifc),
            "telnet" => return TestLimit::Protocol(ProtocolTag::Itn),
            "ftp" => return TestLimit::Protocol(ProtocolTag::Ift),
            "online" => return TestLimit::FlagSlice(FlagSlice::Online),
            "hubs" => return TestLimit::FlagSlice(FlagSlice::Hubs),
            "hosts" => return TestLimit::FlagSlice(FlagSlice::Hosts),
            "multi" => return TestLimit::FlagSlice(FlagSlice::Multi),
            _ => {}
        }

        TestLimit::Unrecognized(input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_all_mean_no_filter() {
        assert_eq!(TestLimit::parse(""), TestLimit::All);
        assert_eq!(TestLimit::parse("all"), TestLimit::All);
        assert_eq!(TestLimit::parse("ALL"), TestLimit::All);
    }

    #[test]
    fn parses_single_address() {
        assert_eq!(
            TestLimit::parse("2:5001/100"),
            TestLimit::Single(NodeAddress::new(2, 5001, 100))
        );
    }

    #[test]
    fn parses_count_and_percent() {
        assert_eq!(TestLimit::parse("25"), TestLimit::Count(25));
        assert_eq!(TestLimit::parse("10%"), TestLimit::Percent(10));
    }

    #[test]
    fn parses_topological_slices() {
        assert_eq!(TestLimit::parse("zone:2"), TestLimit::Zone(2));
        assert_eq!(TestLimit::parse("net:2:5001"), TestLimit::Net(2, 5001));
    }

    #[test]
    fn parses_protocol_and_flag_slices() {
        assert_eq!(
            TestLimit::parse("binkp"),
            TestLimit::Protocol(ProtocolTag::Ibn)
        );
        assert_eq!(
            TestLimit::parse("hubs"),
            TestLimit::FlagSlice(FlagSlice::Hubs)
        );
    }

    #[test]
    fn unrecognized_is_preserved_verbatim() {
        assert_eq!(
            TestLimit::parse("garbage!!"),
            TestLimit::Unrecognized("garbage!!".to_string())
        );
    }
}
