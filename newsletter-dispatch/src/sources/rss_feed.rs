use crate::traits::FeedSource;
use crate::types::{DispatchError, FeedItem, FetchConfig, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use tracing::{info, warn};

/// The one RSS/Atom feed the newsletter follows
pub struct RssFeedSource {
    url: String,
    fetcher: Fetcher,
    parser: FeedParser,
}

impl RssFeedSource {
    pub fn new(url: String, fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            url,
            fetcher: Fetcher::new(fetch_config)?,
            parser: FeedParser::new(),
        })
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    fn feed_url(&self) -> &str {
        &self.url
    }

    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        info!("Polling RSS feed: {}", self.url);

        let fetched = self.fetcher.fetch_feed(&self.url).await?;

        if !FeedParser::is_valid_feed_content(&fetched.content) {
            warn!(
                "Response from {} (HTTP {}) does not look like a feed",
                self.url, fetched.http_status
            );
            return Err(DispatchError::Parse(format!(
                "{} did not return RSS or Atom content",
                self.url
            )));
        }

        let parsed = self.parser.parse_feed(&fetched.content)?;

        info!(
            "Pulled {} entries from {} ({}) in {}ms",
            parsed.entries.len(),
            parsed.title.as_deref().unwrap_or("untitled feed"),
            self.url,
            fetched.response_time_ms
        );
        Ok(parsed.entries)
    }
}
