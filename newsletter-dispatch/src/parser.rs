use crate::types::{DispatchError, FeedItem, ParsedFeed, Result};
use chrono::Utc;
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

/// Turns raw RSS/Atom documents into [`FeedItem`]s.
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| DispatchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);

        let mut seen_links = HashSet::new();
        let mut entries = Vec::with_capacity(feed.entries.len());

        for entry in feed.entries {
            let item = Self::parse_entry(entry);

            // A feed listing the same post twice would otherwise fan it out twice in one pass.
            if let Some(ref link) = item.link {
                if !seen_links.insert(link.clone()) {
                    debug!("Skipping duplicate entry with URL: {}", link);
                    continue;
                }
            }
            entries.push(item);
        }

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed {
            title,
            description,
            entries,
        })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> FeedItem {
        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());

        let link = entry.links.first().map(|l| l.href.clone());

        let description = entry.summary.map(|s| s.content);

        // Only the publish date counts; `updated` alone does not make an entry new.
        let published_at = entry.published.map(|dt| dt.with_timezone(&Utc));

        FeedItem {
            link,
            title,
            description,
            published_at,
        }
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        let has_rss_indicators = content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("xmlns=\"http://www.w3.org/2005/atom\"")
            || content_lower.contains("xmlns:atom")
            || content_lower.contains("<channel");

        let has_xml_declaration = content.trim_start().starts_with("<?xml");

        has_rss_indicators && (has_xml_declaration || content_lower.contains('<'))
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}
