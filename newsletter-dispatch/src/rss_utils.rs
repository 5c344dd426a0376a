/// RSS and mail utility functions for the dispatcher

/// URL utilities for RSS feeds
pub mod url {
    use url::Url;

    /// Validate RSS feed URL format
    pub fn is_valid_rss_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            (url.scheme() == "http" || url.scheme() == "https") && url.host().is_some()
        } else {
            false
        }
    }
}

/// Time utilities for scheduler logging
pub mod time {
    use std::time::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}

/// Mail body utilities
pub mod feed {
    /// Strip markup from an HTML body to get a plain-text mail body.
    ///
    /// Every `<...>` run is dropped and stands in for a single space unless the
    /// text already ends in whitespace. Whitespace inside text runs is kept, so
    /// line breaks in the source survive. Entities are left as they are. An
    /// unterminated `<` swallows the rest of the input.
    pub fn strip_html(html: &str) -> String {
        let mut text = String::with_capacity(html.len());
        let mut in_tag = false;

        for c in html.chars() {
            match c {
                '<' if !in_tag => {
                    in_tag = true;
                    if !text.is_empty() && !text.ends_with(char::is_whitespace) {
                        text.push(' ');
                    }
                }
                '>' if in_tag => in_tag = false,
                _ if !in_tag => text.push(c),
                _ => {}
            }
        }

        text.trim().to_string()
    }
}
