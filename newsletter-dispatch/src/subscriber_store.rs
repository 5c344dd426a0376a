use crate::types::{Result, Subscriber, SubscriberStatus};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Subscription management over the `subscribers` table.
#[derive(Clone)]
pub struct SubscriberStore {
    db: SqlitePool,
}

impl SubscriberStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Registers `email` as pending. Returns `false` if it was already known.
    pub async fn subscribe(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscribers (email, status, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(SubscriberStatus::Pending.as_str())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            info!("New pending subscriber: {}", email);
        }
        Ok(created)
    }

    pub async fn confirm(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscribers SET status = ?, confirmed_at = ? WHERE email = ?",
        )
        .bind(SubscriberStatus::Active.as_str())
        .bind(Utc::now())
        .bind(email)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn unsubscribe(&self, email: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscribers SET status = ?, unsubscribed_at = ? WHERE email = ?",
        )
        .bind(SubscriberStatus::Unsubscribed.as_str())
        .bind(Utc::now())
        .bind(email)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All subscribers, newest first.
    pub async fn list_all(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, status, created_at, confirmed_at, unsubscribed_at
            FROM subscribers
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(subscriber_from_row).collect()
    }

    pub async fn active_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM subscribers WHERE status = ? ORDER BY id")
            .bind(SubscriberStatus::Active.as_str())
            .fetch_all(&self.db)
            .await?;
        Ok(ids)
    }

    /// Hard delete. Queued and delivered messages go with the subscriber.
    pub async fn delete_by_id(&self, subscriber_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = ?")
            .bind(subscriber_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_email(&self, email: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM subscribers WHERE email = ?")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

fn subscriber_from_row(row: &SqliteRow) -> Result<Subscriber> {
    let status: String = row.try_get("status")?;
    Ok(Subscriber {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        unsubscribed_at: row.try_get("unsubscribed_at")?,
    })
}
