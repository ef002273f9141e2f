use nodewatch_domain::{CliOverrides, Config};
use tracing::info;

pub fn load_config(
    config_path: Option<&str>,
    cli_overrides: CliOverrides,
) -> anyhow::Result<Config> {
    let config = Config::load(config_path, cli_overrides)?;
    config.validate()?;

    info!(
        config_file = config_path.unwrap_or("default"),
        workers = config.workers,
        batch_size = config.batch_size,
        test_interval = ?config.test_interval,
        "configuration loaded"
    );

    Ok(config)
}
