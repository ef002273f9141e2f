use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

const WRITE_POOL_MAX_CONNECTIONS: u32 = 4;
const READ_POOL_MAX_CONNECTIONS: u32 = 8;
const WRITE_BUSY_TIMEOUT_SECS: u64 = 10;
const WAL_AUTOCHECKPOINT: u32 = 1000;

fn base_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(database_url).map(|o| {
        o.create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
    })
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA cache_size = -65536").execute(pool).await?;
    sqlx::query("PRAGMA temp_store = MEMORY").execute(pool).await?;
    Ok(())
}

/// Write pool: runs migrations on startup, small and long-`busy_timeout`
/// since SQLite WAL serialises writers at the file level regardless of
/// connection count.
pub async fn create_write_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options =
        base_options(database_url)?.busy_timeout(Duration::from_secs(WRITE_BUSY_TIMEOUT_SECS));

    let pool = SqlitePoolOptions::new()
        .max_connections(WRITE_POOL_MAX_CONNECTIONS)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(WRITE_BUSY_TIMEOUT_SECS))
        .connect_with(options)
        .await?;

    apply_pragmas(&pool).await?;

    sqlx::query(&format!("PRAGMA wal_autocheckpoint = {WAL_AUTOCHECKPOINT}"))
        .execute(&pool)
        .await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;

    sqlx::query("PRAGMA optimize").execute(&pool).await?;

    Ok(pool)
}

/// Read pool: WAL allows concurrent readers while the write pool holds an
/// exclusive lock, so the cycle controller's history/status reads never
/// queue behind the result-append path.
pub async fn create_read_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = base_options(database_url)?.busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(READ_POOL_MAX_CONNECTIONS)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    apply_pragmas(&pool).await?;

    Ok(pool)
}
