use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A node's three-part address in the directory, serialised as `Z:N/D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub zone: u16,
    pub net: u16,
    pub node: u16,
}

impl NodeAddress {
    pub fn new(zone: u16, net: u16, node: u16) -> Self {
        Self { zone, net, node }
    }

    /// The `zone:net` pair, used by the `net:<Z>:<N>` test-limit selector.
    pub fn net_key(&self) -> (u16, u16) {
        (self.zone, self.net)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.zone, self.net, self.node)
    }
}

impl FromStr for NodeAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (zone, rest) = s
            .split_once(':')
            .ok_or_else(|| DomainError::InvalidAddress(s.to_string()))?;
        let (net, node) = rest
            .split_once('/')
            .ok_or_else(|| DomainError::InvalidAddress(s.to_string()))?;

        let zone = zone
            .parse()
            .map_err(|_| DomainError::InvalidAddress(s.to_string()))?;
        let net = net
            .parse()
            .map_err(|_| DomainError::InvalidAddress(s.to_string()))?;
        let node = node
            .parse()
            .map_err(|_| DomainError::InvalidAddress(s.to_string()))?;

        Ok(Self { zone, net, node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_display_and_parse() {
        let addr = NodeAddress::new(2, 5001, 100);
        assert_eq!(addr.to_string(), "2:5001/100");
        assert_eq!("2:5001/100".parse::<NodeAddress>().unwrap(), addr);
    }

    #[test]
    fn rejects_malformed_address() {
        assert!("2:5001".parse::<NodeAddress>().is_err());
        assert!("abc:def/ghi".parse::<NodeAddress>().is_err());
        assert!("".parse::<NodeAddress>().is_err());
    }
}
