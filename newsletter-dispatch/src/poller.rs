use crate::campaign_store::CampaignStore;
use crate::message_queue::MessageQueue;
use crate::traits::FeedSource;
use crate::types::{DispatchError, FeedItem, Result};
use crate::watermark::WatermarkStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPublishDate,
    PublishedBeforeWatermark,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    New { campaign_id: i64, queued: usize },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PollReport {
    pub entries_seen: usize,
    pub new_entries: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Watermark for the next pass, taken when this pass finished.
    pub polled_at: DateTime<Utc>,
}

/// Outcome of a scheduled poll tick.
#[derive(Debug, Clone)]
pub enum PollTick {
    /// No feed configured.
    NotConfigured,
    Completed(PollReport),
}

/// Watches the feed and turns new posts into campaigns with queued messages.
pub struct FeedPoller {
    source: Option<Arc<dyn FeedSource>>,
    campaigns: CampaignStore,
    queue: MessageQueue,
    watermarks: WatermarkStore,
    lookback: Duration,
}

impl FeedPoller {
    pub fn new(
        source: Option<Arc<dyn FeedSource>>,
        campaigns: CampaignStore,
        queue: MessageQueue,
        watermarks: WatermarkStore,
        lookback: Duration,
    ) -> Self {
        Self {
            source,
            campaigns,
            queue,
            watermarks,
            lookback,
        }
    }

    /// One scheduled pass: load the watermark, poll, persist the new watermark.
    /// A failed fetch leaves the stored watermark untouched.
    pub async fn tick(&self) -> Result<PollTick> {
        let feed_url = match &self.source {
            Some(source) => source.feed_url().to_string(),
            None => {
                debug!("RSS URL not configured, skipping poll");
                return Ok(PollTick::NotConfigured);
            }
        };

        let last_polled = self
            .watermarks
            .load_or_default(&feed_url, Utc::now(), self.lookback)
            .await?;

        let tick = self.poll(last_polled).await?;
        if let PollTick::Completed(report) = &tick {
            self.watermarks.save(&feed_url, report.polled_at).await?;
        }

        Ok(tick)
    }

    /// Evaluates every feed entry against `last_polled`. Per-entry failures are
    /// counted and logged; only a failure to fetch the feed itself is an error.
    pub async fn poll(&self, last_polled: DateTime<Utc>) -> Result<PollTick> {
        let source = match &self.source {
            Some(source) => source,
            None => return Ok(PollTick::NotConfigured),
        };

        let items = source.fetch_items().await.map_err(|e| {
            error!("RSS polling failed for {}: {}", source.feed_url(), e);
            e
        })?;

        let mut report = PollReport {
            entries_seen: items.len(),
            new_entries: 0,
            skipped: 0,
            failed: 0,
            polled_at: last_polled,
        };

        for item in &items {
            match self.process_entry(item, last_polled).await {
                EntryOutcome::New { .. } => report.new_entries += 1,
                EntryOutcome::Skipped(_) => report.skipped += 1,
                EntryOutcome::Failed(_) => report.failed += 1,
            }
        }

        report.polled_at = Utc::now();

        if report.new_entries > 0 {
            info!("Detected {} new posts", report.new_entries);
        } else {
            debug!("No new posts found");
        }
        Ok(PollTick::Completed(report))
    }

    pub async fn process_entry(&self, item: &FeedItem, last_polled: DateTime<Utc>) -> EntryOutcome {
        let published = match item.published_at {
            Some(published) => published,
            None => {
                debug!("Entry '{}' has no published date, skipping", item.title);
                return EntryOutcome::Skipped(SkipReason::NoPublishDate);
            }
        };

        if published < last_polled {
            debug!("Entry '{}' is old ({}), skipping", item.title, published);
            return EntryOutcome::Skipped(SkipReason::PublishedBeforeWatermark);
        }

        info!("New post detected: {}", item.title);

        match self.create_campaign(item).await {
            Ok((campaign_id, queued)) => {
                info!("Campaign created (ID={}) with {} messages", campaign_id, queued);
                EntryOutcome::New { campaign_id, queued }
            }
            Err(e) => {
                error!("Failed to process entry '{}': {}", item.title, e);
                EntryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn create_campaign(&self, item: &FeedItem) -> Result<(i64, usize)> {
        let link = item
            .link
            .as_deref()
            .ok_or_else(|| DispatchError::InvalidEntry(format!("entry '{}' has no link", item.title)))?;

        let subject = build_subject(item);
        let body = build_email_body(item, link);

        let campaign_id = self.campaigns.create_or_get(link, &subject, &body).await?;
        let summary = self.queue.enqueue_for_active_subscribers(campaign_id).await?;

        Ok((campaign_id, summary.processed))
    }
}

pub fn build_subject(item: &FeedItem) -> String {
    format!("New post: {}", item.title)
}

pub fn build_email_body(item: &FeedItem, link: &str) -> String {
    let mut html = String::new();
    html.push_str("<html><body style='font-family: sans-serif;'>");
    html.push_str(&format!("<h2>{}</h2>", item.title));

    if let Some(description) = &item.description {
        html.push_str(&format!("<p>{}</p>", description));
    }

    html.push_str(&format!(
        "<p><a href='{}' style='background:#2563eb;color:white;padding:12px 24px;\
         text-decoration:none;border-radius:6px;display:inline-block;'>Read the post</a></p>",
        link
    ));
    html.push_str("<p>");
    html.push_str(link);
    html.push_str("</p>");

    html.push_str("<hr style='margin-top:32px;border:none;border-top:1px solid #e5e7eb;'>");
    html.push_str("<p style='color:#6b7280;font-size:12px;'>");
    html.push_str("You are receiving this because you subscribed to the blog newsletter.");
    html.push_str("</p>");
    html.push_str("</body></html>");

    html
}
