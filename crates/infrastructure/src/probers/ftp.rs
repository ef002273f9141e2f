use async_trait::async_trait;
use nodewatch_application::ports::{ProbeOutcome, ProbeTarget, Prober};
use nodewatch_domain::{DomainError, ProtocolTag};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{connect, read_greeting};

/// FTP (`IFT`): success requires the server's `220` greeting line, same
/// signal any FTP client uses before issuing `USER`. No credentials are
/// exchanged and no peer identity is recovered.
pub struct FtpProber;

#[async_trait]
impl Prober for FtpProber {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Ift
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

        let greeting = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            text = read_greeting(&mut stream, 256, target.timeout.min(std::time::Duration::from_secs(5))) => text,
        };

        let response_ms = started.elapsed().as_millis() as u32;

        if !greeting.trim_start().starts_with("220") {
            return Ok(ProbeOutcome::failure("no FTP 220 greeting received"));
        }

        debug!(address = %target.address, response_ms, "ftp probe succeeded");
        Ok(ProbeOutcome::success(response_ms, None, false))
    }
}
