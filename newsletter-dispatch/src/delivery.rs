use crate::message_queue::MessageQueue;
use crate::rss_utils::feed::strip_html;
use crate::traits::MailTransport;
use crate::types::{QueuedMessage, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
    /// The transport accepted the mail but the row could not be marked sent.
    /// It stays queued, so the next batch sends it again.
    SentUnrecorded(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub unrecorded: usize,
}

/// Sends queued messages through a [`MailTransport`] and records the outcome.
pub struct DeliveryWorker {
    queue: MessageQueue,
    transport: Arc<dyn MailTransport>,
}

impl DeliveryWorker {
    pub fn new(queue: MessageQueue, transport: Arc<dyn MailTransport>) -> Self {
        Self { queue, transport }
    }

    /// Delivers up to `limit` queued messages. Failed sends are terminal and
    /// never retried; `sent` of the summary counts only messages both
    /// delivered and recorded as sent.
    pub async fn send_batch(&self, limit: usize) -> Result<BatchSummary> {
        let messages = self.queue.drain_batch(limit).await?;

        if messages.is_empty() {
            debug!("No queued messages to send");
            return Ok(BatchSummary::default());
        }

        info!("Processing {} queued messages...", messages.len());

        let mut summary = BatchSummary {
            attempted: messages.len(),
            ..Default::default()
        };

        for message in &messages {
            match self.deliver(message).await {
                DeliveryOutcome::Sent => summary.sent += 1,
                DeliveryOutcome::Failed(_) => summary.failed += 1,
                DeliveryOutcome::SentUnrecorded(_) => summary.unrecorded += 1,
            }
        }

        if summary.unrecorded > 0 {
            warn!(
                "{} messages were sent but left queued and may be sent again",
                summary.unrecorded
            );
        }
        info!("Sent {}/{} messages", summary.sent, summary.attempted);
        Ok(summary)
    }

    async fn deliver(&self, message: &QueuedMessage) -> DeliveryOutcome {
        let body = strip_html(&message.body);

        if let Err(e) = self.transport.send(&message.email, &message.subject, &body).await {
            error!(
                "Failed to send message ID={} to {}: {}",
                message.id, message.email, e
            );
            let reason = e.to_string();
            // The row stays queued if this write fails and is attempted again next batch.
            if let Err(e) = self.queue.mark_failed(message.id, &reason).await {
                error!(
                    "Failed to record delivery failure for message ID={}: {}",
                    message.id, e
                );
            }
            return DeliveryOutcome::Failed(reason);
        }

        info!("Sent message ID={} to {}", message.id, message.email);

        match self.queue.mark_sent(message.id, Utc::now()).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => {
                error!(
                    "Message ID={} was delivered to {} but could not be marked sent, \
                     it may be sent again: {}",
                    message.id, message.email, e
                );
                DeliveryOutcome::SentUnrecorded(e.to_string())
            }
        }
    }
}
