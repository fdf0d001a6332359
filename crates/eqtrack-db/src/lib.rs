//! # eqtrack-db: Postgres Persistence
//!
//! Implements the lifecycle [`Store`](eqtrack_lifecycle::Store) boundary on
//! PostgreSQL via SQLx.
//!
//! ## Concurrency
//!
//! Every read made through a [`PgTransaction`] that feeds a later write takes
//! a `FOR UPDATE` row lock, and every update is additionally guarded by the
//! row's `version` column. Two operations racing on the same device therefore
//! serialize on the lock; a writer holding a stale copy fails with
//! `StoreError::Conflict` instead of overwriting.
//!
//! The one-open-warranty-per-device rule is backed by a partial unique index,
//! so it holds even for writers that bypass the engine.
//!
//! ## Code counters
//!
//! `document_sequences` is updated inside the caller's transaction. A rolled
//! back operation releases its number, so codes have no gaps.

pub mod config;
mod rows;
pub mod store;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub use config::DbConfig;
pub use store::{PgStore, PgTransaction};

/// Open a connection pool.
pub async fn init_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(max_connections = config.max_connections, "connected to PostgreSQL");
    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}

/// Open a pool and bring the schema up to date.
pub async fn connect(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    let pool = init_pool(config).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Connect using `DATABASE_URL` and migrate.
///
/// Returns `None` if `DATABASE_URL` is not set.
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool_from_env() -> Result<Option<PgPool>, sqlx::Error> {
    match DbConfig::from_env() {
        Some(config) => connect(&config).await.map(Some),
        None => Ok(None),
    }
}
