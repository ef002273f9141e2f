//! Four thin `Prober` implementations, one per `ProtocolTag` with a
//! registered collaborator (`IVM` has none — see `ProtocolsConfig::default`).
//! Wire-level correctness of any one protocol is out of scope; each prober
//! opens a TCP connection under a timeout, performs the minimal
//! protocol-specific exchange needed to read back a peer address token, and
//! returns a `ProbeOutcome`. Transport/handshake failures are carried in the
//! outcome, never as `Err` — only cancellation propagates as an error.

mod binkp;
mod ftp;
mod ifcico;
mod telnet;

pub use binkp::BinkpProber;
pub use ftp::FtpProber;
pub use ifcico::IfcicoProber;
pub use telnet::TelnetProber;

use std::net::IpAddr;
use std::time::Duration;

use nodewatch_domain::{DomainError, NodeAddress};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Connects to `(address, port)` under `timeout`, racing cancellation.
/// `Err(DomainError::Cancelled)` only on cancellation; any other connect
/// failure becomes a plain `io::Error` the caller folds into the outcome.
pub(crate) async fn connect(
    address: IpAddr,
    port: u16,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<TcpStream, ConnectError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectError::Cancelled),
        result = tokio::time::timeout(timeout, TcpStream::connect((address, port))) => {
            match result {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(err)) => Err(ConnectError::Io(err)),
                Err(_) => Err(ConnectError::Timeout),
            }
        }
    }
}

pub(crate) enum ConnectError {
    Cancelled,
    Timeout,
    Io(std::io::Error),
}

impl ConnectError {
    pub(crate) fn into_domain(self) -> Result<String, DomainError> {
        match self {
            ConnectError::Cancelled => Err(DomainError::Cancelled),
            ConnectError::Timeout => Ok("connection timed out".to_string()),
            ConnectError::Io(err) => Ok(err.to_string()),
        }
    }
}

/// Reads up to `cap` bytes (or until the peer closes, or `timeout` elapses)
/// and returns whatever arrived as a lossy UTF-8 string. Used by the binkp
/// and ifcico/EMSI probers, which both carry the peer address as readable
/// text inside an otherwise binary-ish greeting.
pub(crate) async fn read_greeting(
    stream: &mut TcpStream,
    cap: usize,
    timeout: Duration,
) -> String {
    let mut buf = vec![0u8; cap];
    let read = tokio::time::timeout(timeout, stream.read(&mut buf))
        .await
        .ok()
        .and_then(|r| r.ok())
        .unwrap_or(0);
    String::from_utf8_lossy(&buf[..read]).into_owned()
}

pub(crate) async fn write_all_timeout(
    stream: &mut TcpStream,
    data: &[u8],
    timeout: Duration,
) -> bool {
    tokio::time::timeout(timeout, stream.write_all(data))
        .await
        .ok()
        .and_then(|r| r.ok())
        .is_some()
}

/// Scans free-form greeting text for the first `Z:N/D` token, the way both
/// binkp's `M_ADR` frame and an EMSI `ADDR` field embed the peer's address
/// as plain ASCII inside an otherwise binary handshake.
pub(crate) fn extract_node_address(text: &str) -> Option<NodeAddress> {
    for token in text.split(|c: char| {
        c.is_whitespace() || matches!(c, ',' | '@' | '{' | '}' | '\x01' | '\r' | '\n')
    }) {
        if let Ok(addr) = token.parse::<NodeAddress>() {
            return Some(addr);
        }
    }
    None
}
