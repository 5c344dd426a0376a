use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use newsletter_dispatch::database::{self, spawn_migrations};
use newsletter_dispatch::{
    CampaignStore, Config, DeliveryWorker, FeedPoller, FeedSource, MessageQueue, PollTick,
    RssFeedSource, Scheduler, SmtpMailer, SubscriberStore, WatermarkStore,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "newsletter-dispatch", version, about = "Turns new blog posts into newsletter emails")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the poll and delivery timers until Ctrl-C
    Run,
    /// Poll the feed once
    Poll,
    /// Send one batch of queued messages
    Send,
    Subscribe { email: String },
    Confirm { email: String },
    Unsubscribe { email: String },
    /// List subscribers as JSON, newest first
    Subscribers,
    DeleteSubscriber {
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        id: Option<i64>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Message and campaign counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    cli.config.validate()?;

    let pool = database::connect(&cli.config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", cli.config.database_url))?;

    match cli.command {
        Command::Run => run(&cli.config, pool).await,
        Command::Poll => {
            database::run_migrations(&pool).await?;
            match build_poller(&cli.config, &pool)?.tick().await? {
                PollTick::Completed(report) => info!(
                    "Poll finished: {} entries, {} new, {} skipped, {} failed",
                    report.entries_seen, report.new_entries, report.skipped, report.failed
                ),
                PollTick::NotConfigured => warn!("NEWSLETTER_FEED_URL is not set, nothing to poll"),
            }
            Ok(())
        }
        Command::Send => {
            database::run_migrations(&pool).await?;
            let summary = build_worker(&cli.config, &pool)?
                .send_batch(cli.config.schedule.batch_size)
                .await?;
            info!("Sent {}/{} messages", summary.sent, summary.attempted);
            Ok(())
        }
        Command::Subscribe { email } => {
            database::run_migrations(&pool).await?;
            if SubscriberStore::new(pool).subscribe(&email).await? {
                info!("{} subscribed, pending confirmation", email);
            } else {
                info!("{} is already known", email);
            }
            Ok(())
        }
        Command::Confirm { email } => {
            database::run_migrations(&pool).await?;
            if SubscriberStore::new(pool).confirm(&email).await? {
                info!("{} confirmed", email);
            } else {
                warn!("No subscriber with email {}", email);
            }
            Ok(())
        }
        Command::Unsubscribe { email } => {
            database::run_migrations(&pool).await?;
            if SubscriberStore::new(pool).unsubscribe(&email).await? {
                info!("{} unsubscribed", email);
            } else {
                warn!("No subscriber with email {}", email);
            }
            Ok(())
        }
        Command::Subscribers => {
            database::run_migrations(&pool).await?;
            let subscribers = SubscriberStore::new(pool).list_all().await?;
            println!("{}", serde_json::to_string_pretty(&subscribers)?);
            Ok(())
        }
        Command::DeleteSubscriber { id, email } => {
            database::run_migrations(&pool).await?;
            let store = SubscriberStore::new(pool);
            let deleted = match (id, email) {
                (Some(id), _) => store.delete_by_id(id).await?,
                (None, Some(email)) => store.delete_by_email(&email).await?,
                (None, None) => 0,
            };
            info!("Deleted {} subscriber(s)", deleted);
            Ok(())
        }
        Command::Stats => {
            database::run_migrations(&pool).await?;
            let counts = MessageQueue::new(pool.clone()).status_counts().await?;
            let scheduled = CampaignStore::new(pool).list_scheduled_ids().await?;

            info!("Message statistics:");
            let mut keys: Vec<_> = counts.keys().collect();
            keys.sort();
            for key in keys {
                info!("  {}: {}", key, counts[key]);
            }
            info!("  scheduled campaigns: {}", scheduled.len());
            Ok(())
        }
    }
}

async fn run(config: &Config, pool: SqlitePool) -> Result<()> {
    info!("Starting newsletter dispatch");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let migrations = spawn_migrations(pool.clone(), config.retry_policy(), shutdown_rx.clone());

    let poller = Arc::new(build_poller(config, &pool)?);
    let worker = Arc::new(build_worker(config, &pool)?);
    let scheduler = Scheduler::new(poller, worker, config.schedule_config());
    let handles = scheduler.start(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested, waiting for timers to stop");

    if shutdown_tx.send(true).is_err() {
        warn!("All timers had already stopped");
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Timer task panicked: {}", e);
        }
    }
    if let Err(e) = migrations.await {
        error!("Migration task panicked: {}", e);
    }

    pool.close().await;
    info!("Newsletter dispatch stopped");
    Ok(())
}

fn build_poller(config: &Config, pool: &SqlitePool) -> Result<FeedPoller> {
    let source: Option<Arc<dyn FeedSource>> = match &config.feed_url {
        Some(url) => {
            let source = RssFeedSource::new(url.clone(), config.fetch_config())?;
            Some(Arc::new(source) as Arc<dyn FeedSource>)
        }
        None => {
            warn!("NEWSLETTER_FEED_URL is not set, feed polling is disabled");
            None
        }
    };

    Ok(FeedPoller::new(
        source,
        CampaignStore::new(pool.clone()),
        MessageQueue::new(pool.clone()),
        WatermarkStore::new(pool.clone()),
        config.lookback(),
    ))
}

fn build_worker(config: &Config, pool: &SqlitePool) -> Result<DeliveryWorker> {
    let mailer = SmtpMailer::new(&config.smtp)?;
    Ok(DeliveryWorker::new(MessageQueue::new(pool.clone()), Arc::new(mailer)))
}
