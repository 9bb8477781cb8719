use sqlx::SqlitePool;

/// Create an in-memory SQLite database for testing
///
/// Each call returns an isolated single-connection database with every
/// embedded migration applied.
pub async fn setup_test_db() -> SqlitePool {
    vaultsearch::adapters::sqlite::create_migrated_test_pool()
        .await
        .expect("failed to create migrated test database")
}

/// Close the pool at the end of a test.
#[allow(dead_code)]
pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}
