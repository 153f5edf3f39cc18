//! InMemoryVoteQueue - 開発・テスト用の投票キュー
//!
//! # 実装詳細
//! - tokio Mutex + Notify による blocking pull（timeout 付き）
//! - 取り出したメッセージは ack されるまで in-flight に残る
//! - release / recover_unacked で ready の先頭に戻し、redelivered を立てる

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::QueueError;
use crate::ports::{Delivery, VotePublisher, VoteSource};

#[derive(Debug, Clone)]
struct Message {
    tag: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<u64, Message>,
    next_tag: u64,
    published: u64,
    acked: u64,
}

/// InMemoryVoteQueue は単一プロセス内の投票キュー
///
/// Clone は同じキューへのハンドルを返す。
#[derive(Clone, Default)]
pub struct InMemoryVoteQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryVoteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting to be delivered.
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages delivered but neither acked nor released.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Total number of successful publishes.
    pub async fn published(&self) -> u64 {
        self.state.lock().await.published
    }

    pub async fn acked(&self) -> u64 {
        self.state.lock().await.acked
    }

    /// Puts every in-flight message back for redelivery, as a broker does
    /// when a consumer connection dies before acking.
    pub async fn recover_unacked(&self) -> usize {
        let recovered = {
            let mut state = self.state.lock().await;
            let mut lost: Vec<_> = state.in_flight.drain().map(|(_, m)| m).collect();
            lost.sort_by_key(|m| std::cmp::Reverse(m.tag));
            let n = lost.len();
            for mut message in lost {
                message.redelivered = true;
                state.ready.push_front(message);
            }
            n
        };
        for _ in 0..recovered {
            self.notify.notify_one();
        }
        recovered
    }
}

#[async_trait]
impl VotePublisher for InMemoryVoteQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            let tag = state.next_tag;
            state.next_tag += 1;
            state.published += 1;
            state.ready.push_back(Message {
                tag,
                payload,
                redelivered: false,
            });
        }
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl VoteSource for InMemoryVoteQueue {
    async fn next_delivery(
        &self,
        wait: Duration,
    ) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(message) = state.ready.pop_front() {
                    state.in_flight.insert(message.tag, message.clone());
                    return Ok(Some(Box::new(InMemoryDelivery {
                        tag: message.tag.to_string(),
                        message,
                        queue: self.clone(),
                    })));
                }
            }
            // notify_one は待機者がいなければ permit を残すので取りこぼさない
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}

struct InMemoryDelivery {
    tag: String,
    message: Message,
    queue: InMemoryVoteQueue,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_tag(&self) -> &str {
        &self.tag
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.queue.state.lock().await;
        if state.in_flight.remove(&self.message.tag).is_some() {
            state.acked += 1;
        }
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<(), QueueError> {
        let requeued = {
            let mut state = self.queue.state.lock().await;
            match state.in_flight.remove(&self.message.tag) {
                Some(mut message) => {
                    message.redelivered = true;
                    state.ready.push_front(message);
                    true
                }
                None => false,
            }
        };
        if requeued {
            self.queue.notify.notify_one();
        }
        Ok(())
    }
}
