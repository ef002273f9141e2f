//! nodewatch daemon entry point: loads configuration, wires the storage,
//! DNS, geolocation, WHOIS, and protocol-prober collaborators behind their
//! application-layer ports, starts the WHOIS worker and (if enabled) the
//! control surface, then hands off to the Cycle Controller's main loop.

mod bootstrap;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nodewatch_control::TelnetServer;
use nodewatch_domain::CliOverrides;
use nodewatch_engine::{CycleController, SystemClock, WhoisWorker};
use nodewatch_infrastructure::{
    BinkpProber, FtpProber, HickoryDnsResolverAdapter, HttpGeoLocator, IfcicoProber,
    SqliteStorageGateway, TelnetProber, WhoisClient,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nodewatch")]
#[command(version = "0.1.0")]
#[command(about = "Watches FidoNet-style directory-listed nodes for reachability and protocol health")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Number of concurrent probe workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Run a single cycle and exit.
    #[arg(long)]
    run_once: bool,

    /// Only serve the control surface; never runs a scheduled cycle.
    #[arg(long)]
    cli_only: bool,

    /// Probe as usual but never persist results.
    #[arg(long)]
    dry_run: bool,

    /// Test-limit grammar (`all`, a single address, `count:N`, `percent:N`,
    /// `zone:Z`, `net:Z:N`, a protocol tag, or a flag slice).
    #[arg(long)]
    test_limit: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        workers: cli.workers,
        run_once: if cli.run_once { Some(true) } else { None },
        cli_only: if cli.cli_only { Some(true) } else { None },
        dry_run: if cli.dry_run { Some(true) } else { None },
        test_limit: cli.test_limit,
    };

    let config = bootstrap::load_config(cli.config.as_deref(), overrides)?;
    bootstrap::init_logging(&config);

    info!("nodewatch starting");

    let (write_pool, read_pool) = bootstrap::init_database(&config.storage.database_url).await?;
    let storage = Arc::new(SqliteStorageGateway::new(write_pool, read_pool));

    let dns = Arc::new(HickoryDnsResolverAdapter::new(config.dns.timeout)?);
    let geo = Arc::new(HttpGeoLocator::new(
        config.geolocation.provider.clone(),
        config.geolocation.api_key.clone(),
        Duration::from_secs(10),
    ));
    let whois_service = Arc::new(WhoisClient::new(Duration::from_secs(15)));

    let probers: Vec<Arc<dyn nodewatch_application::ports::Prober>> = vec![
        Arc::new(BinkpProber),
        Arc::new(IfcicoProber),
        Arc::new(TelnetProber),
        Arc::new(FtpProber),
    ];

    let clock = Arc::new(SystemClock);
    let cancellation = CancellationToken::new();

    let whois_worker = WhoisWorker::new(
        whois_service,
        storage.clone(),
        clock.clone(),
        config.whois.queue_size,
    );
    whois_worker
        .clone()
        .start(cancellation.child_token())
        .await;

    let cycle_controller = CycleController::new(
        config.clone(),
        storage,
        dns,
        geo,
        probers,
        whois_worker,
        clock,
        cancellation.clone(),
    )
    .await?;

    if config.cli.enabled {
        let control_server = TelnetServer::new(config.cli.clone(), cycle_controller.clone());
        let control_cancel = cancellation.child_token();
        tokio::spawn(async move {
            if let Err(err) = control_server.run(control_cancel).await {
                error!(%err, "control surface stopped unexpectedly");
            }
        });
    }

    tokio::spawn(shutdown_signal(cancellation.clone()));

    cycle_controller.run().await;

    info!("nodewatch stopped");
    Ok(())
}

async fn shutdown_signal(cancellation: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    cancellation.cancel();
}
