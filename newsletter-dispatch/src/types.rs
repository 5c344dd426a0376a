use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Scheduled,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Pending,
    Active,
    Unsubscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Failed => "failed",
        }
    }
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::Pending => "pending",
            SubscriberStatus::Active => "active",
            SubscriberStatus::Unsubscribed => "unsubscribed",
        }
    }
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sent" => Ok(CampaignStatus::Sent),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(DispatchError::InvalidStatus {
                entity: "campaign",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for SubscriberStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SubscriberStatus::Pending),
            "active" => Ok(SubscriberStatus::Active),
            "unsubscribed" => Ok(SubscriberStatus::Unsubscribed),
            other => Err(DispatchError::InvalidStatus {
                entity: "subscriber",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(DispatchError::InvalidStatus {
                entity: "message",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub source: String,
    pub subject: String,
    pub body: String,
    pub status: CampaignStatus,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub status: SubscriberStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub campaign_id: i64,
    pub subscriber_id: i64,
    pub status: MessageStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A queued message joined with everything needed to send it.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub id: i64,
    pub campaign_id: i64,
    pub subscriber_id: i64,
    pub email: String,
    pub subject: String,
    pub body: String,
}

/// One entry of a syndication feed, reduced to what the poller reads.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub link: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<FeedItem>,
}

#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub content: String,
    pub http_status: u16,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Newsletter-Dispatch/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Email(#[from] lettre::error::Error),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Campaign for source {link} could not be created or found")]
    CampaignUnavailable { link: String },

    #[error("Invalid feed entry: {0}")]
    InvalidEntry(String),

    #[error("Unknown {entity} status: {value}")]
    InvalidStatus { entity: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("General error: {0}")]
    General(String),
}

impl DispatchError {
    /// Errors worth retrying on the next attempt of the same tick.
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
            ),
            DispatchError::Migration(sqlx::migrate::MigrateError::Execute(e)) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            DispatchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DispatchError::Smtp(e) => e.is_transient() || e.is_timeout(),
            DispatchError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
