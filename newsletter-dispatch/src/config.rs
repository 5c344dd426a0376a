use crate::retry::RetryPolicy;
use crate::rss_utils::url::is_valid_rss_url;
use crate::scheduler::ScheduleConfig;
use crate::types::{DispatchError, FetchConfig, Result};
use clap::Args;
use std::time::Duration;

/// Settings shared by every subcommand, read from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://newsletter.db?mode=rwc")]
    pub database_url: String,

    /// Feed to watch. Polling is skipped when unset.
    #[arg(long, env = "NEWSLETTER_FEED_URL")]
    pub feed_url: Option<String>,

    #[command(flatten)]
    pub smtp: SmtpConfig,

    #[command(flatten)]
    pub schedule: ScheduleArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SmtpConfig {
    #[arg(long = "smtp-host", env = "SMTP_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "smtp-port", env = "SMTP_PORT", default_value_t = 587)]
    pub port: u16,

    #[arg(long = "smtp-username", env = "SMTP_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "smtp-password", env = "SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long = "smtp-from", env = "SMTP_FROM", default_value = "newsletter@localhost")]
    pub from: String,

    #[arg(long = "smtp-starttls", env = "SMTP_STARTTLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub starttls: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 900)]
    pub poll_interval_secs: u64,

    #[arg(long, env = "POLL_INITIAL_DELAY_SECS", default_value_t = 60)]
    pub poll_initial_delay_secs: u64,

    #[arg(long, env = "DELIVERY_INTERVAL_SECS", default_value_t = 300)]
    pub delivery_interval_secs: u64,

    #[arg(long, env = "DELIVERY_INITIAL_DELAY_SECS", default_value_t = 120)]
    pub delivery_initial_delay_secs: u64,

    #[arg(long, env = "DELIVERY_BATCH_SIZE", default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = 10)]
    pub retry_delay_secs: u64,

    /// How far back the first poll of a feed looks.
    #[arg(long, env = "WATERMARK_LOOKBACK_HOURS", default_value_t = 24)]
    pub lookback_hours: i64,
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    #[arg(long, env = "FETCH_USER_AGENT", default_value = "Newsletter-Dispatch/1.0")]
    pub user_agent: String,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "FETCH_MAX_RETRIES", default_value_t = 3)]
    pub fetch_max_retries: u32,
}

impl Config {
    /// Rejects a feed URL that is not absolute http(s).
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.feed_url {
            if !is_valid_rss_url(url) {
                return Err(DispatchError::Config(format!(
                    "NEWSLETTER_FEED_URL must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        if self.schedule.batch_size == 0 {
            return Err(DispatchError::Config("batch size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.schedule.retry_max_attempts,
            Duration::from_secs(self.schedule.retry_delay_secs),
        )
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            poll_interval: Duration::from_secs(self.schedule.poll_interval_secs),
            poll_initial_delay: Duration::from_secs(self.schedule.poll_initial_delay_secs),
            delivery_interval: Duration::from_secs(self.schedule.delivery_interval_secs),
            delivery_initial_delay: Duration::from_secs(self.schedule.delivery_initial_delay_secs),
            batch_size: self.schedule.batch_size,
            retry: self.retry_policy(),
        }
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.schedule.lookback_hours)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.fetch.user_agent.clone(),
            timeout_seconds: self.fetch.fetch_timeout_secs,
            max_retries: self.fetch.fetch_max_retries,
            ..FetchConfig::default()
        }
    }
}
