use crate::config::DatabaseConfig;
use crate::error::AppResult;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

pub type DbPool = SqlitePool;
pub type DbTransaction = Transaction<'static, Sqlite>;

/// Opens a transaction that takes SQLite's write lock at BEGIN. Default
/// deferred transactions that read before their first write can deadlock
/// each other on a multi-connection pool; starting immediate makes
/// concurrent writers queue instead.
pub async fn begin_write(pool: &DbPool) -> AppResult<DbTransaction> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
