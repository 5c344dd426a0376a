use crate::delivery::DeliveryWorker;
use crate::poller::{FeedPoller, PollTick};
use crate::retry::{retry_transient, sleep_or_shutdown, RetryPolicy};
use crate::rss_utils::time::format_duration;
use crate::types::DispatchError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub poll_interval: Duration,
    pub poll_initial_delay: Duration,
    pub delivery_interval: Duration,
    pub delivery_initial_delay: Duration,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15 * 60),
            poll_initial_delay: Duration::from_secs(60),
            delivery_interval: Duration::from_secs(5 * 60),
            delivery_initial_delay: Duration::from_secs(2 * 60),
            batch_size: 50,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives the feed poller and the delivery worker on two fixed-delay timers.
///
/// Each timer waits its full interval after a tick finishes, so ticks of the
/// same timer never overlap. The two timers run independently of each other.
pub struct Scheduler {
    poller: Arc<FeedPoller>,
    worker: Arc<DeliveryWorker>,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(poller: Arc<FeedPoller>, worker: Arc<DeliveryWorker>, config: ScheduleConfig) -> Self {
        Self {
            poller,
            worker,
            config,
        }
    }

    /// Spawns both timers. They stop between ticks once `shutdown` flips to `true`.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_poll_timer(shutdown.clone()),
            self.spawn_delivery_timer(shutdown),
        ]
    }

    fn spawn_poll_timer(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let poller = self.poller.clone();
        let interval = self.config.poll_interval;
        let initial_delay = self.config.poll_initial_delay;
        let policy = self.config.retry;

        tokio::spawn(async move {
            info!(
                "Feed poll timer started (every {}, first run in {})",
                format_duration(interval),
                format_duration(initial_delay)
            );

            if sleep_or_shutdown(initial_delay, &mut shutdown).await {
                loop {
                    let result =
                        retry_transient("Feed poll", &policy, &mut shutdown, || poller.tick()).await;

                    match result {
                        Ok(PollTick::Completed(report)) => info!(
                            "Feed poll finished: {} entries, {} new, {} skipped, {} failed",
                            report.entries_seen, report.new_entries, report.skipped, report.failed
                        ),
                        Ok(PollTick::NotConfigured) => {}
                        Err(DispatchError::Cancelled) => break,
                        Err(e) => error!("Feed poll abandoned for this tick: {}", e),
                    }

                    if !sleep_or_shutdown(interval, &mut shutdown).await {
                        break;
                    }
                }
            }

            warn!("Feed poll timer stopped");
        })
    }

    fn spawn_delivery_timer(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let interval = self.config.delivery_interval;
        let initial_delay = self.config.delivery_initial_delay;
        let batch_size = self.config.batch_size;
        let policy = self.config.retry;

        tokio::spawn(async move {
            info!(
                "Delivery timer started (every {}, first run in {}, batch size {})",
                format_duration(interval),
                format_duration(initial_delay),
                batch_size
            );

            if sleep_or_shutdown(initial_delay, &mut shutdown).await {
                loop {
                    let result = retry_transient("Delivery batch", &policy, &mut shutdown, || {
                        worker.send_batch(batch_size)
                    })
                    .await;

                    match result {
                        Ok(summary) if summary.attempted > 0 => info!(
                            "Delivery batch finished: {}/{} sent",
                            summary.sent, summary.attempted
                        ),
                        Ok(_) => {}
                        Err(DispatchError::Cancelled) => break,
                        Err(e) => error!("Delivery batch abandoned for this tick: {}", e),
                    }

                    if !sleep_or_shutdown(interval, &mut shutdown).await {
                        break;
                    }
                }
            }

            warn!("Delivery timer stopped");
        })
    }
}
