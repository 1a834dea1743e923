use super::{DbPool, run_migrations};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicU32, Ordering};

/// In-memory pool for tests. A single connection keeps every test hermetic:
/// `sqlite::memory:` gives each connection its own database.
pub(crate) async fn test_pool() -> DbPool {
    let _ = env_logger::builder().is_test(true).try_init();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");

    run_migrations(&pool).await.expect("migrations failed");
    pool
}

static SHARED_DB_SEQ: AtomicU32 = AtomicU32::new(0);

/// Multi-connection pool over a named shared-cache in-memory database, for
/// tests that need real connection-level concurrency. The minimum of one
/// connection keeps the database alive for the pool's lifetime.
pub(crate) async fn shared_test_pool(max_connections: u32) -> DbPool {
    let _ = env_logger::builder().is_test(true).try_init();

    let n = SHARED_DB_SEQ.fetch_add(1, Ordering::Relaxed);
    let url = format!("sqlite:file:shared_test_{n}?mode=memory&cache=shared");
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .connect(&url)
        .await
        .expect("failed to open shared in-memory database");

    run_migrations(&pool).await.expect("migrations failed");
    pool
}

pub(crate) async fn seed_event(
    pool: &DbPool,
    title: &str,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> i64 {
    let result = sqlx::query("INSERT INTO events (title, start_date, end_date) VALUES (?1, ?2, ?3)")
        .bind(title)
        .bind(start_date)
        .bind(end_date)
        .execute(pool)
        .await
        .expect("failed to seed event");

    result.last_insert_rowid()
}

/// Event comfortably in the future; sales open, cancellation still allowed.
pub(crate) async fn seed_upcoming_event(pool: &DbPool) -> i64 {
    let start = Utc::now() + Duration::days(7);
    seed_event(pool, "Test Conference", start, start + Duration::days(1)).await
}
