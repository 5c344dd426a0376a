pub mod types;
pub mod retry;
pub mod database;
pub mod campaign_store;
pub mod subscriber_store;
pub mod message_queue;
pub mod watermark;
pub mod traits;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod rss_utils;
pub mod mailer;
pub mod delivery;
pub mod poller;
pub mod scheduler;
pub mod config;

pub use types::*;
pub use retry::RetryPolicy;
pub use campaign_store::CampaignStore;
pub use subscriber_store::SubscriberStore;
pub use message_queue::{EnqueueSummary, MessageQueue};
pub use watermark::WatermarkStore;
pub use traits::{FeedSource, MailTransport};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use sources::RssFeedSource;
pub use mailer::SmtpMailer;
pub use delivery::{BatchSummary, DeliveryOutcome, DeliveryWorker};
pub use poller::{EntryOutcome, FeedPoller, PollReport, PollTick, SkipReason};
pub use scheduler::{ScheduleConfig, Scheduler};
pub use config::Config;
