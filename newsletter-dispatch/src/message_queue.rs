use crate::types::{Message, MessageStatus, QueuedMessage, Result, SubscriberStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Result of fanning a campaign out to the active subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    /// Subscribers whose insert went through, including pairs that were already queued.
    pub processed: usize,
    /// Rows actually created by this call.
    pub inserted: usize,
    pub failed: usize,
}

/// Per-recipient message queue backed by the `messages` table.
///
/// `drain_batch` is a plain read, not a claim: two overlapping readers can see
/// the same rows. Only one delivery worker may run against a database.
#[derive(Clone)]
pub struct MessageQueue {
    db: SqlitePool,
}

impl MessageQueue {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn enqueue_for_active_subscribers(&self, campaign_id: i64) -> Result<EnqueueSummary> {
        let subscriber_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM subscribers WHERE status = ? ORDER BY id")
                .bind(SubscriberStatus::Active.as_str())
                .fetch_all(&self.db)
                .await?;

        if subscriber_ids.is_empty() {
            warn!("No active subscribers found for campaign ID={}", campaign_id);
            return Ok(EnqueueSummary::default());
        }

        let mut summary = EnqueueSummary::default();

        for subscriber_id in subscriber_ids {
            match self.enqueue_one(campaign_id, subscriber_id).await {
                Ok(created) => {
                    summary.processed += 1;
                    if created {
                        summary.inserted += 1;
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to queue message for subscriber ID={}: {}",
                        subscriber_id, e
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Queued {} messages for campaign ID={} ({} new, {} failed)",
            summary.processed, campaign_id, summary.inserted, summary.failed
        );
        Ok(summary)
    }

    async fn enqueue_one(&self, campaign_id: i64, subscriber_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (campaign_id, subscriber_id, status, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (campaign_id, subscriber_id) DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(subscriber_id)
        .bind(MessageStatus::Queued.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Reads up to `limit` queued messages in insertion order.
    pub async fn drain_batch(&self, limit: usize) -> Result<Vec<QueuedMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.campaign_id, m.subscriber_id, c.subject, c.body, s.email
            FROM messages m
            JOIN campaigns c ON m.campaign_id = c.id
            JOIN subscribers s ON m.subscriber_id = s.id
            WHERE m.status = ?
            ORDER BY m.id
            LIMIT ?
            "#,
        )
        .bind(MessageStatus::Queued.as_str())
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(QueuedMessage {
                id: row.try_get("id")?,
                campaign_id: row.try_get("campaign_id")?,
                subscriber_id: row.try_get("subscriber_id")?,
                email: row.try_get("email")?,
                subject: row.try_get("subject")?,
                body: row.try_get("body")?,
            });
        }

        debug!("Read {} queued messages (limit {})", messages.len(), limit);
        Ok(messages)
    }

    pub async fn mark_sent(&self, message_id: i64, sent_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE messages SET status = ?, sent_at = ? WHERE id = ?")
            .bind(MessageStatus::Sent.as_str())
            .bind(sent_at)
            .bind(message_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, message_id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET status = ?, error = ? WHERE id = ?")
            .bind(MessageStatus::Failed.as_str())
            .bind(error)
            .bind(message_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get(&self, message_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT id, campaign_id, subscriber_id, status, error, sent_at, created_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| message_from_row(&r)).transpose()
    }

    pub async fn list_for_campaign(&self, campaign_id: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, campaign_id, subscriber_id, status, error, sent_at, created_at
            FROM messages
            WHERE campaign_id = ?
            ORDER BY id
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// Message counts keyed by status, plus `total`.
    pub async fn status_counts(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM messages GROUP BY status")
            .fetch_all(&self.db)
            .await?;

        let mut stats = HashMap::new();
        for status in [MessageStatus::Queued, MessageStatus::Sent, MessageStatus::Failed] {
            stats.insert(status.as_str().to_string(), 0);
        }

        let mut total = 0;
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            total += count;
            stats.insert(status, count);
        }
        stats.insert("total".to_string(), total);

        Ok(stats)
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let status: String = row.try_get("status")?;
    Ok(Message {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        subscriber_id: row.try_get("subscriber_id")?,
        status: status.parse()?,
        error: row.try_get("error")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
    })
}
