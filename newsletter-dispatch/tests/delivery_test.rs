use newsletter_dispatch::{
    BatchSummary, CampaignStore, DeliveryWorker, MessageQueue, MessageStatus, Result,
};
use std::sync::Arc;

mod common;
use common::{insert_subscriber, setup_test_database, RecordingMailer};

const BODY: &str = "<html><body><h2>Title</h2><p>Body &amp; more</p></body></html>";

#[tokio::test]
async fn test_send_batch_isolates_failures() -> Result<()> {
    let pool = setup_test_database().await?;
    insert_subscriber(&pool, "one@example.com", "active").await?;
    insert_subscriber(&pool, "bounce@example.com", "active").await?;
    insert_subscriber(&pool, "three@example.com", "active").await?;

    let campaigns = CampaignStore::new(pool.clone());
    let queue = MessageQueue::new(pool.clone());
    let campaign_id = campaigns
        .create_or_get("https://blog.example.com/p/1", "New post: Title", BODY)
        .await?;
    queue.enqueue_for_active_subscribers(campaign_id).await?;

    let mailer = Arc::new(RecordingMailer::rejecting(&["bounce@example.com"]));
    let worker = DeliveryWorker::new(queue.clone(), mailer.clone());

    let summary = worker.send_batch(50).await?;
    assert_eq!(
        summary,
        BatchSummary {
            attempted: 3,
            sent: 2,
            failed: 1,
            unrecorded: 0
        }
    );

    let messages = queue.list_for_campaign(campaign_id).await?;
    let sent: Vec<_> = messages.iter().filter(|m| m.status == MessageStatus::Sent).collect();
    let failed: Vec<_> = messages.iter().filter(|m| m.status == MessageStatus::Failed).collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(failed.len(), 1);
    assert!(sent.iter().all(|m| m.sent_at.is_some() && m.error.is_none()));
    assert!(failed[0].sent_at.is_none());
    assert!(failed[0].error.as_deref().is_some_and(|e| !e.is_empty()));

    let delivered = mailer.sent();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].to, "one@example.com");
    assert_eq!(delivered[0].subject, "New post: Title");
    assert_eq!(delivered[0].body, "Title Body &amp; more");

    Ok(())
}

#[tokio::test]
async fn test_failed_messages_are_not_retried() -> Result<()> {
    let pool = setup_test_database().await?;
    insert_subscriber(&pool, "bounce@example.com", "active").await?;

    let campaigns = CampaignStore::new(pool.clone());
    let queue = MessageQueue::new(pool.clone());
    let campaign_id = campaigns
        .create_or_get("https://blog.example.com/p/1", "S", BODY)
        .await?;
    queue.enqueue_for_active_subscribers(campaign_id).await?;

    let mailer = Arc::new(RecordingMailer::rejecting(&["bounce@example.com"]));
    let worker = DeliveryWorker::new(queue.clone(), mailer);

    assert_eq!(worker.send_batch(50).await?.failed, 1);
    assert_eq!(worker.send_batch(50).await?, BatchSummary::default());

    Ok(())
}

#[tokio::test]
async fn test_send_batch_honours_limit() -> Result<()> {
    let pool = setup_test_database().await?;
    for i in 0..4 {
        insert_subscriber(&pool, &format!("r{}@example.com", i), "active").await?;
    }

    let campaigns = CampaignStore::new(pool.clone());
    let queue = MessageQueue::new(pool.clone());
    let campaign_id = campaigns
        .create_or_get("https://blog.example.com/p/1", "S", BODY)
        .await?;
    queue.enqueue_for_active_subscribers(campaign_id).await?;

    let mailer = Arc::new(RecordingMailer::default());
    let worker = DeliveryWorker::new(queue.clone(), mailer.clone());

    assert_eq!(worker.send_batch(3).await?.sent, 3);
    assert_eq!(worker.send_batch(3).await?.sent, 1);
    assert_eq!(worker.send_batch(3).await?.attempted, 0);
    assert_eq!(mailer.sent().len(), 4);

    Ok(())
}

#[tokio::test]
async fn test_empty_queue_is_a_no_op() -> Result<()> {
    let pool = setup_test_database().await?;
    let mailer = Arc::new(RecordingMailer::default());
    let worker = DeliveryWorker::new(MessageQueue::new(pool), mailer.clone());

    assert_eq!(worker.send_batch(50).await?, BatchSummary::default());
    assert!(mailer.sent().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unrecorded_send_is_not_counted_as_sent() -> Result<()> {
    let pool = setup_test_database().await?;
    insert_subscriber(&pool, "reader@example.com", "active").await?;

    let campaigns = CampaignStore::new(pool.clone());
    let queue = MessageQueue::new(pool.clone());
    let campaign_id = campaigns
        .create_or_get("https://blog.example.com/p/1", "S", BODY)
        .await?;
    queue.enqueue_for_active_subscribers(campaign_id).await?;

    sqlx::query(
        r#"
        CREATE TRIGGER block_mark_sent BEFORE UPDATE ON messages
        WHEN NEW.status = 'sent'
        BEGIN
            SELECT RAISE(ABORT, 'messages are read-only');
        END
        "#,
    )
    .execute(&pool)
    .await?;

    let mailer = Arc::new(RecordingMailer::default());
    let worker = DeliveryWorker::new(queue.clone(), mailer.clone());

    let summary = worker.send_batch(50).await?;
    assert_eq!(
        summary,
        BatchSummary {
            attempted: 1,
            sent: 0,
            failed: 0,
            unrecorded: 1
        }
    );
    assert_eq!(mailer.sent().len(), 1);

    let messages = queue.list_for_campaign(campaign_id).await?;
    assert_eq!(messages[0].status, MessageStatus::Queued);
    assert!(messages[0].sent_at.is_none());

    Ok(())
}
