use crate::types::{FeedItem, Result};
use async_trait::async_trait;

/// Trait for pulling entries from a syndication feed
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// URL of the feed, also the key of its poll watermark
    fn feed_url(&self) -> &str;

    /// Fetch and parse the whole feed, entries in feed order
    async fn fetch_items(&self) -> Result<Vec<FeedItem>>;
}

/// Outbound mail capability used by the delivery worker
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, plain_text_body: &str) -> Result<()>;
}
