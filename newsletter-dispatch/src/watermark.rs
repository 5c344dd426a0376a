use crate::types::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Durable `last_polled` watermark, one row per feed URL.
#[derive(Clone)]
pub struct WatermarkStore {
    db: SqlitePool,
}

impl WatermarkStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn load(&self, feed_url: &str) -> Result<Option<DateTime<Utc>>> {
        let last_polled: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT last_polled FROM poll_watermarks WHERE feed_url = ?")
                .bind(feed_url)
                .fetch_optional(&self.db)
                .await?;
        Ok(last_polled)
    }

    /// Stored watermark, or `now - lookback` for a feed that was never polled.
    pub async fn load_or_default(
        &self,
        feed_url: &str,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<DateTime<Utc>> {
        match self.load(feed_url).await? {
            Some(last_polled) => Ok(last_polled),
            None => {
                let initial = now - lookback;
                info!(
                    "No watermark for {}, starting from {} ({}h lookback)",
                    feed_url,
                    initial,
                    lookback.num_hours()
                );
                Ok(initial)
            }
        }
    }

    pub async fn save(&self, feed_url: &str, last_polled: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_watermarks (feed_url, last_polled, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT (feed_url) DO UPDATE SET
                last_polled = excluded.last_polled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(feed_url)
        .bind(last_polled)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        debug!("Watermark for {} set to {}", feed_url, last_polled);
        Ok(())
    }
}
