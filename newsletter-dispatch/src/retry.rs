use crate::types::{DispatchError, Result};
use backoff::backoff::{Backoff, Constant};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// Fixed-delay retry budget for transient infrastructure errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn backoff(&self) -> Constant {
        Constant::new(self.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(10))
    }
}

/// Sleeps for `delay` unless shutdown is signalled first.
///
/// Returns `false` when shutdown was requested, `true` when the full delay elapsed.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender is gone, nobody can ask us to stop any more.
                    (&mut sleep).await;
                    return true;
                }
            }
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is spent. A shutdown during the backoff sleep
/// aborts with [`DispatchError::Cancelled`].
pub async fn retry_transient<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or(policy.delay);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                if !sleep_or_shutdown(delay, shutdown).await {
                    return Err(DispatchError::Cancelled);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
