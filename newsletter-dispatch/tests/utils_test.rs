use chrono::{TimeZone, Utc};
use clap::Parser;
use newsletter_dispatch::retry::{retry_transient, sleep_or_shutdown, RetryPolicy};
use newsletter_dispatch::rss_utils::{feed::strip_html, time::format_duration, url};
use newsletter_dispatch::{Config, DispatchError, FeedParser, Result};
use std::io;
use std::time::Duration;
use tokio::sync::watch;

mod common;
use common::init_tracing;

const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <link>https://blog.example.com</link>
    <description>Posts</description>
    <item>
      <title>Second post</title>
      <link>https://blog.example.com/second</link>
      <guid>https://blog.example.com/second</guid>
      <description>&lt;p&gt;More words&lt;/p&gt;</description>
      <pubDate>Sun, 19 Oct 2025 10:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Second post again</title>
      <link>https://blog.example.com/second</link>
      <pubDate>Sun, 19 Oct 2025 10:30:00 GMT</pubDate>
    </item>
    <item>
      <title>Draft</title>
      <link>https://blog.example.com/draft</link>
    </item>
  </channel>
</rss>"#;

#[derive(Parser)]
struct TestCli {
    #[command(flatten)]
    config: Config,
}

#[test]
fn test_strip_html() {
    assert_eq!(
        strip_html("<h2>Title</h2><p>Body &amp; more</p>"),
        "Title Body &amp; more"
    );
    assert_eq!(strip_html("no markup"), "no markup");
    assert_eq!(strip_html("a<br>b"), "a b");
    assert_eq!(strip_html("  <p>\n  spaced \t out </p> "), "spaced \t out");
    assert_eq!(
        strip_html("<p>First paragraph.\n\nSecond paragraph.</p>\n<p>Third.</p>"),
        "First paragraph.\n\nSecond paragraph. \nThird."
    );
    assert_eq!(strip_html("kept <unterminated tail"), "kept");
}

#[test]
fn test_parse_rss_feed() -> Result<()> {
    init_tracing();
    assert!(FeedParser::is_valid_feed_content(SAMPLE_RSS));
    assert!(!FeedParser::is_valid_feed_content("<html><body>Not a feed</body></html>"));

    let parsed = FeedParser::new().parse_feed(SAMPLE_RSS)?;
    assert_eq!(parsed.title.as_deref(), Some("Example Blog"));

    // The repeated link is dropped within a single parse.
    assert_eq!(parsed.entries.len(), 2);

    let first = &parsed.entries[0];
    assert_eq!(first.title, "Second post");
    assert_eq!(first.link.as_deref(), Some("https://blog.example.com/second"));
    assert_eq!(first.description.as_deref(), Some("<p>More words</p>"));
    assert_eq!(
        first.published_at,
        Some(Utc.with_ymd_and_hms(2025, 10, 19, 10, 30, 0).unwrap())
    );

    assert_eq!(parsed.entries[1].title, "Draft");
    assert!(parsed.entries[1].published_at.is_none());

    Ok(())
}

#[test]
fn test_parse_rejects_garbage() {
    let result = FeedParser::new().parse_feed("definitely not xml");
    assert!(matches!(result, Err(DispatchError::Parse(_))));
}

#[test]
fn test_url_utilities() {
    assert!(url::is_valid_rss_url("https://blog.example.com/feed.xml"));
    assert!(url::is_valid_rss_url("http://localhost:8080/rss"));
    assert!(!url::is_valid_rss_url("ftp://blog.example.com/feed.xml"));
    assert!(!url::is_valid_rss_url("not a url"));
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_secs(45)), "45s");
    assert_eq!(format_duration(Duration::from_secs(5 * 60)), "5m");
    assert_eq!(format_duration(Duration::from_secs(2 * 3600)), "2h");
    assert_eq!(format_duration(Duration::from_secs(3 * 86400)), "3d");
}

#[test]
fn test_config_validation() {
    let cli = TestCli::try_parse_from(["test", "--feed-url", "https://blog.example.com/feed.xml"])
        .expect("arguments should parse");
    assert!(cli.config.validate().is_ok());
    assert_eq!(cli.config.schedule_config().batch_size, 50);
    assert_eq!(cli.config.lookback(), chrono::Duration::hours(24));

    let cli = TestCli::try_parse_from(["test", "--feed-url", "ftp://blog.example.com/feed.xml"])
        .expect("arguments should parse");
    assert!(matches!(cli.config.validate(), Err(DispatchError::Config(_))));
}

fn transient() -> DispatchError {
    DispatchError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
}

#[tokio::test]
async fn test_retry_recovers_from_transient_errors() -> Result<()> {
    init_tracing();
    let (_tx, mut rx) = watch::channel(false);
    let policy = RetryPolicy::new(3, Duration::from_millis(5));

    let mut calls = 0;
    let value = retry_transient("test op", &policy, &mut rx, || {
        calls += 1;
        let attempt = calls;
        async move {
            if attempt < 3 {
                Err(transient())
            } else {
                Ok(attempt)
            }
        }
    })
    .await?;

    assert_eq!(value, 3);
    assert_eq!(calls, 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    init_tracing();
    let (_tx, mut rx) = watch::channel(false);
    let policy = RetryPolicy::new(2, Duration::from_millis(5));

    let mut calls = 0;
    let result: Result<()> = retry_transient("test op", &policy, &mut rx, || {
        calls += 1;
        async { Err(transient()) }
    })
    .await;

    assert!(matches!(result, Err(DispatchError::Io(_))));
    assert_eq!(calls, 2);
}

#[tokio::test]
async fn test_retry_skips_permanent_errors() {
    let (_tx, mut rx) = watch::channel(false);
    let policy = RetryPolicy::new(5, Duration::from_millis(5));

    let mut calls = 0;
    let result: Result<()> = retry_transient("test op", &policy, &mut rx, || {
        calls += 1;
        async { Err(DispatchError::Parse("bad feed".to_string())) }
    })
    .await;

    assert!(matches!(result, Err(DispatchError::Parse(_))));
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn test_shutdown_cancels_retry_backoff() {
    let (tx, mut rx) = watch::channel(false);
    let policy = RetryPolicy::new(5, Duration::from_secs(3600));
    tx.send(true).expect("receiver is alive");

    let result: Result<()> =
        retry_transient("test op", &policy, &mut rx, || async { Err(transient()) }).await;

    assert!(matches!(result, Err(DispatchError::Cancelled)));
}

#[tokio::test]
async fn test_sleep_or_shutdown() {
    let (tx, mut rx) = watch::channel(false);
    assert!(sleep_or_shutdown(Duration::from_millis(5), &mut rx).await);

    let waiter = tokio::spawn(async move { sleep_or_shutdown(Duration::from_secs(3600), &mut rx).await });
    tx.send(true).expect("receiver is alive");
    assert!(!waiter.await.expect("task should not panic"));

    let (tx, mut rx) = watch::channel(false);
    drop(tx);
    assert!(sleep_or_shutdown(Duration::from_millis(5), &mut rx).await);
}
