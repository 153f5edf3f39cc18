//! Redis integration tests.
//!
//! Need a server: `TALLY_TEST_REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.
//! Each test uses its own stream key.

use std::time::Duration;

use tally_core::ports::{VotePublisher, VoteSource};
use tally_redis::{RedisSettings, RedisVoteQueue};
use ulid::Ulid;

async fn queue(claim_idle: Duration) -> RedisVoteQueue {
    let url = std::env::var("TALLY_TEST_REDIS_URL")
        .expect("TALLY_TEST_REDIS_URL must point at a scratch server");
    let settings = RedisSettings {
        url,
        stream: format!("votes-test-{}", Ulid::new()),
        group: "tally-test".to_string(),
        block: Duration::from_millis(200),
        claim_idle,
        op_timeout: Duration::from_secs(2),
    };
    let queue = RedisVoteQueue::connect(settings).await.unwrap();
    queue.ensure_group().await.unwrap();
    // idempotent
    queue.ensure_group().await.unwrap();
    queue
}

#[tokio::test]
#[ignore]
async fn published_vote_is_delivered_and_acked() {
    let queue = queue(Duration::from_secs(30)).await;
    let source = queue.source("c1").await.unwrap();

    queue.publish(b"payload".to_vec()).await.unwrap();
    let delivery = source
        .next_delivery(Duration::from_millis(500))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.payload(), b"payload");
    assert!(!delivery.redelivered());
    delivery.ack().await.unwrap();

    assert!(
        source
            .next_delivery(Duration::from_millis(200))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore]
async fn unacked_vote_is_reclaimed_by_another_consumer() {
    let queue = queue(Duration::from_millis(100)).await;
    let crashed = queue.source("c1").await.unwrap();
    let survivor = queue.source("c2").await.unwrap();

    queue.publish(b"again".to_vec()).await.unwrap();
    let first = crashed
        .next_delivery(Duration::from_millis(500))
        .await
        .unwrap()
        .unwrap();
    first.release().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let again = survivor
        .next_delivery(Duration::from_millis(500))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.payload(), b"again");
    assert!(again.redelivered());
    again.ack().await.unwrap();
}
