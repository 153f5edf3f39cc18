//! VoteQueue ports - 永続投票キュー（Redis Streams または InMemory）
//!
//! # 設計原則
//! - メッセージはエンコード済みの bytes（codec は呼び出し側が選ぶ）
//! - at-least-once：ack されなかった delivery は再配送される
//! - 手動 ack：consumer は処理完了後にのみ ack する
//! - 全体順序は保証しない

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::QueueError;

/// Producer side of the durable vote queue.
#[async_trait]
pub trait VotePublisher: Send + Sync {
    /// Returns only once the broker has accepted the message.
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError>;
}

/// A message pulled from the queue.
/// The consumer owns this delivery and must either `ack` or `release` it.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Broker-side identifier, for logs.
    fn delivery_tag(&self) -> &str;

    /// Whether this message was handed out before without being acked.
    fn redelivered(&self) -> bool;

    /// Remove the message from the queue for good.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Give the message back unprocessed so that it is delivered again.
    async fn release(self: Box<Self>) -> Result<(), QueueError>;
}

/// Consumer side of the durable vote queue.
#[async_trait]
pub trait VoteSource: Send + Sync {
    /// Blocking pull bounded by `wait`; `Ok(None)` when nothing arrived in time.
    async fn next_delivery(&self, wait: Duration)
    -> Result<Option<Box<dyn Delivery>>, QueueError>;
}
