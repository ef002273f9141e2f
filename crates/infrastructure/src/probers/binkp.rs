use std::time::Duration;

use async_trait::async_trait;
use nodewatch_application::ports::{ProbeOutcome, ProbeTarget, Prober};
use nodewatch_domain::{DomainError, ProtocolTag};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{connect, extract_node_address, read_greeting, write_all_timeout};

const GREETING_CAP: usize = 512;

/// Binkp (`IBN`): connects, sends an `M_NUL` keepalive frame to prompt the
/// peer's banner, and reads back its `M_ADR` frame to recover the address it
/// claims. Frame bytes are not parsed per binkp's actual length-prefixed
/// wire format — only the ASCII address embedded in the banner matters here.
pub struct BinkpProber;

#[async_trait]
impl Prober for BinkpProber {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Ibn
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

        // A bare `M_NUL` frame (command byte 0) is enough to prompt most
        // binkp peers into sending their own greeting unsolicited anyway.
        write_all_timeout(&mut stream, &[0x80, 0x00, 0x00], target.timeout).await;

        let greeting = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            text = read_greeting(&mut stream, GREETING_CAP, short_timeout(target.timeout)) => text,
        };

        let response_ms = started.elapsed().as_millis() as u32;

        if greeting.is_empty() {
            return Ok(ProbeOutcome::failure("no binkp greeting received"));
        }

        let peer_identity = extract_node_address(&greeting);
        let matches = peer_identity
            .zip(target.expected_identity)
            .map(|(got, want)| got == want)
            .unwrap_or(false);

        debug!(address = %target.address, response_ms, "binkp probe succeeded");
        Ok(ProbeOutcome::success(response_ms, peer_identity, matches))
    }
}

fn short_timeout(timeout: Duration) -> Duration {
    timeout.min(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connection_refused_is_a_failure_outcome() {
        let prober = BinkpProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 1, // nothing listens here
            expected_identity: None,
            timeout: Duration::from_millis(200),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.error.is_empty());
    }

    #[tokio::test]
    async fn greeting_with_matching_address_validates() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"\x01M_ADR 2:5001/100@fidonet\r\n")
                    .await;
            }
        });

        let prober = BinkpProber;
        let target = ProbeTarget {
            address: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port,
            expected_identity: Some(nodewatch_domain::NodeAddress::new(2, 5001, 100)),
            timeout: Duration::from_secs(2),
        };
        let outcome = prober.probe(&target, &CancellationToken::new()).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.identity_matches_expected);
    }
}
