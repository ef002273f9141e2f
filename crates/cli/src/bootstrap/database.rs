use nodewatch_infrastructure::database::{create_read_pool, create_write_pool};
use sqlx::SqlitePool;
use tracing::{error, info};

pub async fn init_database(database_url: &str) -> anyhow::Result<(SqlitePool, SqlitePool)> {
    info!(%database_url, "initializing database");

    let write_pool = create_write_pool(database_url).await.map_err(|e| {
        error!(error = %e, "failed to initialize write pool");
        anyhow::anyhow!(e)
    })?;

    let read_pool = create_read_pool(database_url).await.map_err(|e| {
        error!(error = %e, "failed to initialize read pool");
        anyhow::anyhow!(e)
    })?;

    info!("database initialized");

    Ok((write_pool, read_pool))
}
