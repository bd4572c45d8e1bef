//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically
//! - Reporting per-table row counts after startup

use sqlx::{Pool, Postgres};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Tables created by the schema migration, in dependency order.
pub const TABLES: [&str; 8] = [
    "user_roles",
    "users",
    "api_keys",
    "requests",
    "ipv4_addresses",
    "ipv6_addresses",
    "geolocation_data",
    "rate_limits",
];

/// Create a new PostgreSQL connection pool.
///
/// Connections are opened lazily up to `max_connections` and reused across
/// callers, so concurrent request handlers share one pool.
///
/// # Errors
///
/// Returns an error if the connection string is invalid or the server
/// cannot be reached.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs
/// only once.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // Embedded at compile time
    sqlx::migrate!("./migrations").run(pool).await
}

/// Count the rows of every schema table.
pub async fn row_counts(pool: &DbPool) -> Result<Vec<(&'static str, i64)>, sqlx::Error> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        // Table names come from the constant list above, never from input
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await?;
        counts.push((table, count));
    }
    Ok(counts)
}
