use async_trait::async_trait;
use nodewatch_application::ports::{ProbeOutcome, ProbeTarget, Prober};
use nodewatch_domain::{DomainError, ProtocolTag};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{connect, read_greeting};

/// Telnet (`ITN`): reachability only — a successful TCP connect plus any
/// banter within the timeout counts as success. Telnet carries no peer
/// identity token, so `address_validated` never sets for this protocol.
pub struct TelnetProber;

#[async_trait]
impl Prober for TelnetProber {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Itn
    }

    async fn probe(
        &self,
        target: &ProbeTarget,
        cancel: &CancellationToken,
    ) -> Result<ProbeOutcome, DomainError> {
        let started = std::time::Instant::now();

        let mut stream = match connect(target.address, target.port, target.timeout, cancel).await
        {
            Ok(stream) => stream,
            Err(err) => return err.into_domain().map(ProbeOutcome::failure),
        };

        // Best-effort banner read; telnet servers that stay silent until a
        // client sends IAC negotiation still count as reachable.
        let _ = read_greeting(&mut stream, 256, target.timeout.min(std::time::Duration::from_secs(2))).await;

        let response_ms = started.elapsed().as_millis() as u32;
        debug!(address = %target.address, response_ms, "telnet probe succeeded");
        Ok(ProbeOutcome::success(response_ms, None, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn successful_connect_is_operational() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let prober = TelnetProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port,
            expected_identity: None,
            timeout: Duration::from_secs(1),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.identity_matches_expected);
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let prober = TelnetProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 1,
            expected_identity: None,
            timeout: Duration::from_millis(200),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
    }
}
