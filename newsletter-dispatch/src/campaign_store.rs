use crate::types::{Campaign, CampaignStatus, DispatchError, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, info};

/// Campaign persistence. One row per unique content source.
#[derive(Clone)]
pub struct CampaignStore {
    db: SqlitePool,
}

impl CampaignStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Creates a scheduled campaign for `source`, or returns the id of the one
    /// that already exists. Subject and body of a repeated call are discarded.
    pub async fn create_or_get(&self, source: &str, subject: &str, body: &str) -> Result<i64> {
        match self.upsert(source, subject, body).await {
            Ok(campaign_id) => {
                info!("Campaign ID={} for source={}", campaign_id, source);
                Ok(campaign_id)
            }
            Err(e) => {
                error!("Failed to create campaign for source={}: {}", source, e);
                match self.find_id_by_source(source).await {
                    Ok(Some(existing)) => {
                        info!("Using existing campaign ID={}", existing);
                        Ok(existing)
                    }
                    Ok(None) => Err(DispatchError::CampaignUnavailable {
                        link: source.to_string(),
                    }),
                    Err(lookup_error) => {
                        error!("Campaign lookup for source={} failed: {}", source, lookup_error);
                        Err(DispatchError::CampaignUnavailable {
                            link: source.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn upsert(&self, source: &str, subject: &str, body: &str) -> Result<i64> {
        let now = Utc::now();

        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO campaigns (source, subject, body, status, scheduled_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (source) DO UPDATE SET source = excluded.source
            RETURNING id
            "#,
        )
        .bind(source)
        .bind(subject)
        .bind(body)
        .bind(CampaignStatus::Scheduled.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(row.try_get("id")?)
    }

    pub async fn find_id_by_source(&self, source: &str) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM campaigns WHERE source = ? LIMIT 1")
            .bind(source)
            .fetch_optional(&self.db)
            .await?;
        Ok(id)
    }

    /// Unconditional status write; the caller is trusted with the transition.
    pub async fn update_status(&self, campaign_id: i64, status: CampaignStatus) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(campaign_id)
            .execute(&self.db)
            .await?;

        info!("Updated campaign ID={} status={}", campaign_id, status);
        Ok(())
    }

    /// Ids of campaigns still in `scheduled`, oldest first.
    pub async fn list_scheduled_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM campaigns WHERE status = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(CampaignStatus::Scheduled.as_str())
        .fetch_all(&self.db)
        .await?;

        debug!("Found {} scheduled campaigns", ids.len());
        Ok(ids)
    }

    pub async fn get(&self, campaign_id: i64) -> Result<Option<Campaign>> {
        let row = sqlx::query(
            r#"
            SELECT id, source, subject, body, status, scheduled_at, created_at
            FROM campaigns
            WHERE id = ?
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| campaign_from_row(&r)).transpose()
    }
}

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign> {
    let status: String = row.try_get("status")?;
    Ok(Campaign {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        status: status.parse()?,
        scheduled_at: row.try_get("scheduled_at")?,
        created_at: row.try_get("created_at")?,
    })
}
