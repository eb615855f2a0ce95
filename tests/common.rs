use purifier_telemetry_service::db;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Create an isolated in-memory database for one test.
///
/// The pool is capped at a single connection: every connection to
/// `sqlite::memory:` opens its own blank database, so a second connection
/// would never see the migrated schema.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    db::migrate(&pool).await.expect("Failed to run migrations");

    pool
}
