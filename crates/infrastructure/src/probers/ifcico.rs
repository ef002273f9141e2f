use std::time::Duration;

use async_trait::async_trait;
use nodewatch_application::ports::{ProbeOutcome, ProbeTarget, Prober};
use nodewatch_domain::{DomainError, ProtocolTag};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{connect, extract_node_address, read_greeting, write_all_timeout};

const GREETING_CAP: usize = 1024;

/// Ifcico/EMSI (`IFC`): sends the classic `**EMSI_REQ` handshake opener and
/// reads back the peer's `**EMSI_DAT` packet, which carries its address in
/// plain ASCII. EMSI's CRC-framed encoding is not reproduced.
pub struct IfcicoProber;

#[async_trait]
impl Prober for IfcicoProber {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Ifc
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

        write_all_timeout(&mut stream, b"**EMSI_REQA77E\r", target.timeout).await;

        let greeting = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            text = read_greeting(&mut stream, GREETING_CAP, target.timeout.min(Duration::from_secs(5))) => text,
        };

        let response_ms = started.elapsed().as_millis() as u32;

        if !greeting.contains("EMSI") {
            return Ok(ProbeOutcome::failure("no EMSI handshake received"));
        }

        let peer_identity = extract_node_address(&greeting);
        let matches = peer_identity
            .zip(target.expected_identity)
            .map(|(got, want)| got == want)
            .unwrap_or(false);

        debug!(address = %target.address, response_ms, "ifcico probe succeeded");
        Ok(ProbeOutcome::success(response_ms, peer_identity, matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn missing_emsi_marker_is_a_failure() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"not an emsi peer\r\n").await;
            }
        });

        let prober = IfcicoProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port,
            expected_identity: None,
            timeout: Duration::from_secs(2),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn emsi_dat_with_address_succeeds() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"**EMSI_DAT0041{EMSI}{ADDR 2:450/1024}{...}")
                    .await;
            }
        });

        let prober = IfcicoProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port,
            expected_identity: Some(nodewatch_domain::NodeAddress::new(2, 450, 1024)),
            timeout: Duration::from_secs(2),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.identity_matches_expected);
    }
}
