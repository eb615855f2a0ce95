use std::str::FromStr;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::DbError;

/// Embedded schema migrations, applied through [`migrate`].
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply any pending embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), DbError> {
    MIGRATOR.run(pool).await?;
    debug!("Schema migrations up to date");
    Ok(())
}

/// Open the SQLite pool, creating the database file on first run.
pub async fn connect(database_url: &str) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    debug!("Opened SQLite pool for {}", database_url);
    Ok(pool)
}

/// Liveness check used by the health endpoint.
pub async fn ping(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
