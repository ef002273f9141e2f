use std::sync::Arc;

use nodewatch_application::ports::ControlSurface;
use nodewatch_domain::config::CliConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, parse, parse_error_response};

/// Line-oriented TCP control surface: one task per connection, each line
/// read is parsed as a command, dispatched onto the `ControlSurface`
/// façade, and the rendered response written back terminated by `\n`.
pub struct TelnetServer {
    config: CliConfig,
    surface: Arc<dyn ControlSurface>,
}

impl TelnetServer {
    pub fn new(config: CliConfig, surface: Arc<dyn ControlSurface>) -> Self {
        Self { config, surface }
    }

    /// Binds and serves connections until `cancel` fires. Returns once the
    /// listener has stopped accepting new connections.
    pub async fn run(self, cancel: CancellationToken) -> std::io::Result<()> {
        if !self.config.enabled {
            info!("control surface disabled, not starting");
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "control surface listening");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("control surface shutting down");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(%err, "control surface accept failed");
                            continue;
                        }
                    };

                    let surface = Arc::clone(&self.surface);
                    let conn_cancel = cancel.clone();
                    tokio::spawn(async move {
                        debug!(%peer, "control surface connection opened");
                        if let Err(err) = handle_connection(socket, surface, conn_cancel).await {
                            debug!(%peer, %err, "control surface connection ended");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    surface: Arc<dyn ControlSurface>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(()),

            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            return Ok(());
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match parse(trimmed) {
            Ok(command) => commands::dispatch(&surface, command).await,
            Err(err) => parse_error_response(&err),
        };

        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use nodewatch_application::ports::{NodeInfo, StatusReport, WorkerStatus};
    use nodewatch_domain::{AggregatedResult, DomainError};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    struct MockSurface;

    #[async_trait]
    impl ControlSurface for MockSurface {
        async fn get_status(&self) -> StatusReport {
            StatusReport {
                paused: false,
                dry_run: false,
                debug: false,
                cycle_count: 3,
                last_cycle_at: Some(Utc::now()),
                nodes_scheduled: 42,
            }
        }

        async fn get_worker_status(&self) -> WorkerStatus {
            WorkerStatus {
                workers: 8,
                active: 2,
                queue_size: 0,
            }
        }

        async fn pause(&self) -> Result<(), DomainError> {
            Ok(())
        }

        async fn resume(&self) -> Result<(), DomainError> {
            Err(DomainError::Control("not paused".to_string()))
        }

        async fn reload_config(&self, _path: Option<&str>) -> Result<(), DomainError> {
            Ok(())
        }

        async fn test_single_node(
            &self,
            _spec: &str,
            _protocol: Option<nodewatch_domain::ProtocolTag>,
        ) -> Result<AggregatedResult, DomainError> {
            Err(DomainError::NotFound("2:9999/9999".to_string()))
        }

        async fn get_node_info(&self, _address: &str) -> Result<NodeInfo, DomainError> {
            Err(DomainError::NotFound("2:9999/9999".to_string()))
        }

        async fn set_debug_mode(&self, _enabled: bool) {}
    }

    async fn send_and_read(port: u16, command: &str) -> String {
        let mut socket = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        socket.write_all(command.as_bytes()).await.unwrap();
        socket.write_all(b"\n").await.unwrap();

        let mut buf = vec![0u8; 256];
        let n = socket.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).trim().to_string()
    }

    #[tokio::test]
    async fn round_trips_status_and_unknown_command() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = nodewatch_domain::config::CliConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port,
        };
        let cancel = CancellationToken::new();
        let server = TelnetServer::new(config, Arc::new(MockSurface));
        let server_cancel = cancel.clone();
        let handle = tokio::spawn(async move { server.run(server_cancel).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let status = send_and_read(port, "status").await;
        assert!(status.starts_with("paused=false"));
        assert!(status.contains("nodes_scheduled=42"));

        let unknown = send_and_read(port, "bogus").await;
        assert!(unknown.starts_with("ERR"));

        let resume = send_and_read(port, "resume").await;
        assert!(resume.starts_with("ERR"));

        cancel.cancel();
        let _ = handle.await;
    }
}
