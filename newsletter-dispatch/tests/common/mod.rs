#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsletter_dispatch::database::{connect_in_memory, run_migrations};
use newsletter_dispatch::{DispatchError, FeedItem, FeedSource, MailTransport, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Mutex, Once};

pub const TEST_FEED_URL: &str = "https://blog.example.com/feed.xml";

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Fresh in-memory database with the schema applied
pub async fn setup_test_database() -> Result<SqlitePool> {
    init_tracing();
    let pool = connect_in_memory().await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Inserts a subscriber directly with the given status
pub async fn insert_subscriber(pool: &SqlitePool, email: &str, status: &str) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO subscribers (email, status, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(email)
    .bind(status)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub fn feed_item(title: &str, link: Option<&str>, published_at: Option<DateTime<Utc>>) -> FeedItem {
    FeedItem {
        link: link.map(|l| l.to_string()),
        title: title.to_string(),
        description: Some(format!("Summary of {}", title)),
        published_at,
    }
}

/// Feed source serving a fixed entry list, or failing every fetch
pub struct StubFeed {
    pub url: String,
    pub items: Vec<FeedItem>,
    pub fail: bool,
}

impl StubFeed {
    pub fn with_items(items: Vec<FeedItem>) -> Self {
        Self {
            url: TEST_FEED_URL.to_string(),
            items,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            url: TEST_FEED_URL.to_string(),
            items: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl FeedSource for StubFeed {
    fn feed_url(&self) -> &str {
        &self.url
    }

    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        if self.fail {
            return Err(DispatchError::General("feed unreachable".to_string()));
        }
        Ok(self.items.clone())
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every send; rejects recipients listed in `reject`
#[derive(Default)]
pub struct RecordingMailer {
    pub reject: HashSet<String>,
    pub sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, plain_text_body: &str) -> Result<()> {
        if self.reject.contains(to) {
            return Err(DispatchError::General(format!("550 mailbox unavailable: {}", to)));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: plain_text_body.to_string(),
        });
        Ok(())
    }
}
