use crate::types::{DispatchError, FetchConfig, FetchedFeed, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<FetchedFeed> {
        let start_time = Instant::now();

        debug!("Fetching feed: {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.send_request(url).await {
                Ok(response) => {
                    let status = response.status();

                    if !status.is_success() {
                        last_error = Some(DispatchError::General(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));

                        // Client errors will not get better by asking again.
                        if status.is_client_error() {
                            break;
                        }
                    } else {
                        if let Some(content_length) = response.content_length() {
                            let size_mb = content_length as usize / (1024 * 1024);
                            if size_mb > self.config.max_feed_size_mb {
                                return Err(DispatchError::FeedTooLarge { size_mb });
                            }
                        }

                        match response.text().await {
                            Ok(content) => {
                                info!("Successfully fetched feed: {} ({} bytes)", url, content.len());
                                return Ok(FetchedFeed {
                                    content,
                                    http_status: status.as_u16(),
                                    response_time_ms: start_time.elapsed().as_millis() as u64,
                                });
                            }
                            Err(e) => {
                                last_error = Some(DispatchError::Http(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!(
            "Failed to fetch feed after {} attempts: {}",
            self.config.max_retries + 1,
            url
        );
        Err(last_error.unwrap_or_else(|| DispatchError::General("Unknown fetch error".to_string())))
    }

    async fn send_request(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        Ok(response)
    }
}
