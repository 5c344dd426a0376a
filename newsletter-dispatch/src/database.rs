use crate::retry::{retry_transient, RetryPolicy};
use crate::types::{DispatchError, Result};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Single-connection in-memory database. Every connection to `sqlite::memory:`
/// is its own database, so the pool must never drop or open another one.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Runs migrations on a background task so startup never waits on them.
///
/// The handle resolves to `true` once the schema is up to date.
pub fn spawn_migrations(
    pool: SqlitePool,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        info!(
            "Starting database migrations in background (max {} attempts)",
            policy.max_attempts
        );

        let result = retry_transient("Database migration", &policy, &mut shutdown, || {
            run_migrations(&pool)
        })
        .await;

        match result {
            Ok(()) => {
                info!("Database migrations completed");
                true
            }
            Err(DispatchError::Cancelled) => {
                warn!("Database migrations interrupted by shutdown");
                false
            }
            Err(e) => {
                error!(
                    "Database migrations abandoned (max {} attempts): {}",
                    policy.max_attempts, e
                );
                false
            }
        }
    })
}
