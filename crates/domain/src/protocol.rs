use std::fmt;
use std::str::FromStr;

use crate::errors::DomainError;

/// The fixed tag domain of legacy mail-transport protocols a node may advertise.
///
/// `ALL` fixes the probing order within one hostname: IBN, IFC, ITN, IFT, IVM.
///
/// `Serialize`/`Deserialize` are implemented by hand (in `config::protocols`)
/// as the plain tag string, so it round-trips as a TOML table key (`protocols.IBN.enabled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    /// Binkp, the modern binary mailer protocol.
    Ibn,
    /// Ifcico/EMSI, the classic FidoNet mailer handshake.
    Ifc,
    /// Interactive telnet access.
    Itn,
    /// FTP file access.
    Ift,
    /// Vmodem (dial-up emulation over IP). No prober is registered for it.
    Ivm,
}

impl ProtocolTag {
    pub const ALL: [ProtocolTag; 5] = [
        ProtocolTag::Ibn,
        ProtocolTag::Ifc,
        ProtocolTag::Itn,
        ProtocolTag::Ift,
        ProtocolTag::Ivm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Ibn => "IBN",
            ProtocolTag::Ifc => "IFC",
            ProtocolTag::Itn => "ITN",
            ProtocolTag::Ift => "IFT",
            ProtocolTag::Ivm => "IVM",
        }
    }

    /// Default TCP port when the node/config carries no override.
    pub fn default_port(&self) -> u16 {
        match self {
            ProtocolTag::Ibn => 24554,
            ProtocolTag::Ifc => 60179,
            ProtocolTag::Itn => 23,
            ProtocolTag::Ift => 21,
            ProtocolTag::Ivm => 0,
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IBN" => Ok(ProtocolTag::Ibn),
            "IFC" => Ok(ProtocolTag::Ifc),
            "ITN" => Ok(ProtocolTag::Itn),
            "IFT" => Ok(ProtocolTag::Ift),
            "IVM" => Ok(ProtocolTag::Ivm),
            other => Err(DomainError::InvalidAddress(format!(
                "unknown protocol tag: {other}"
            ))),
        }
    }
}
