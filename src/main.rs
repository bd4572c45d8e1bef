//! Geolocation Store - migration and bootstrap entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Ensure the default role exists
//! 5. Report row counts per table

use geolocation_store::{PgStore, Store, StoreError, config, db, models::user::UserRole};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "Database pool created"
    );

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = PgStore::new(pool.clone());
    let role = ensure_role(&store, &config.default_role).await?;
    tracing::info!(role_id = %role.id, role_name = %role.role_name, "Default role ready");

    for (table, count) in db::row_counts(&pool).await? {
        tracing::info!(table, count, "Table ready");
    }

    let defaults = config.rate_limit_defaults();
    tracing::info!(
        limit = defaults.limit,
        window_sec = defaults.window_sec,
        "Default rate limit"
    );

    Ok(())
}

/// Find the role by name, creating it if absent.
///
/// A concurrent bootstrap may create the role between lookup and insert; the
/// resulting uniqueness violation is resolved by looking it up again.
async fn ensure_role(store: &PgStore, role_name: &str) -> Result<UserRole, StoreError> {
    if let Some(role) = store.find_role_by_name(role_name).await? {
        return Ok(role);
    }

    match store.create_role(role_name).await {
        Err(err) if err.is_unique_violation() => store
            .find_role_by_name(role_name)
            .await?
            .ok_or(err),
        result => result,
    }
}
