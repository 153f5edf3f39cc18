//! RedisVoteQueue - Redis Streams による永続投票キュー
//!
//! # 対応
//! - publish: `XADD {stream} * vote <bytes>`
//! - next_delivery: 放置された pending を `XAUTOCLAIM` で先に回収し、
//!   なければ `XREADGROUP ... BLOCK` で新着を 1 件
//! - ack: `XACK` + `XDEL`（MULTI で一括）
//! - release: 何もしない。pending のまま残り、claim_idle 経過後に再配送される
//!
//! 永続性は broker 側の `appendonly yes` が前提。
//!
//! XREADGROUP は接続をブロックするので consumer ごとに専用の接続を持つ。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::{Client, RedisError};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::settings::RedisSettings;
use tally_core::domain::QueueError;
use tally_core::ports::{Delivery, VotePublisher, VoteSource};

/// Stream entry field that carries the encoded vote.
pub const PAYLOAD_FIELD: &str = "vote";

fn unavailable(e: RedisError) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

async fn open(client: &Client, settings: &RedisSettings) -> Result<ConnectionManager, QueueError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(settings.op_timeout)
        .set_response_timeout(settings.block + settings.op_timeout);
    client
        .get_connection_manager_with_config(config)
        .await
        .map_err(unavailable)
}

/// Publisher handle; also hands out per-consumer sources.
pub struct RedisVoteQueue {
    client: Client,
    conn: ConnectionManager,
    settings: RedisSettings,
}

impl RedisVoteQueue {
    pub async fn connect(settings: RedisSettings) -> Result<Self, QueueError> {
        let client = Client::open(settings.url.as_str()).map_err(unavailable)?;
        let conn = open(&client, &settings).await?;
        Ok(Self {
            client,
            conn,
            settings,
        })
    }

    /// Creates the stream and the consumer group if missing.
    pub async fn ensure_group(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let created: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.settings.stream)
            .arg(&self.settings.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => {
                info!(stream = %self.settings.stream, group = %self.settings.group, "consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    /// A source reading as consumer `name` on its own connection.
    pub async fn source(&self, name: impl Into<String>) -> Result<RedisVoteSource, QueueError> {
        let conn = open(&self.client, &self.settings).await?;
        Ok(RedisVoteSource {
            conn,
            stream: self.settings.stream.clone(),
            group: self.settings.group.clone(),
            consumer: name.into(),
            claim_idle: self.settings.claim_idle,
            claim_cursor: Mutex::new("0-0".to_string()),
        })
    }
}

#[async_trait]
impl VotePublisher for RedisVoteQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let id: String = redis::cmd("XADD")
            .arg(&self.settings.stream)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        debug!(stream = %self.settings.stream, %id, "vote published");
        Ok(())
    }
}

pub struct RedisVoteSource {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    claim_idle: Duration,
    claim_cursor: Mutex<String>,
}

impl RedisVoteSource {
    fn delivery(&self, entry: StreamId, redelivered: bool) -> RedisDelivery {
        RedisDelivery {
            conn: self.conn.clone(),
            stream: self.stream.clone(),
            group: self.group.clone(),
            payload: entry_payload(&entry),
            id: entry.id,
            redelivered,
        }
    }

    async fn claim_stale(&self) -> Result<Option<StreamId>, QueueError> {
        let mut cursor = self.claim_cursor.lock().await;
        let mut conn = self.conn.clone();
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.claim_idle.as_millis() as u64)
            .arg(cursor.as_str())
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        *cursor = reply.next_stream_id;
        Ok(reply.claimed.into_iter().next())
    }

    async fn read_new(&self, wait: Duration) -> Result<Option<StreamId>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(wait.as_millis().max(1) as u64)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|key| key.ids.into_iter().next()))
    }
}

#[async_trait]
impl VoteSource for RedisVoteSource {
    async fn next_delivery(
        &self,
        wait: Duration,
    ) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        if let Some(entry) = self.claim_stale().await? {
            debug!(consumer = %self.consumer, id = %entry.id, "re-claimed stale vote");
            return Ok(Some(Box::new(self.delivery(entry, true))));
        }
        Ok(self
            .read_new(wait)
            .await?
            .map(|entry| Box::new(self.delivery(entry, false)) as Box<dyn Delivery>))
    }
}

/// Empty when the entry has no payload field; the consumer treats that as
/// an undecodable message.
fn entry_payload(entry: &StreamId) -> Vec<u8> {
    entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default()
}

struct RedisDelivery {
    conn: ConnectionManager,
    stream: String,
    group: String,
    id: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[async_trait]
impl Delivery for RedisDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_tag(&self) -> &str {
        &self.id
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.stream)
            .arg(&self.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn release(self: Box<Self>) -> Result<(), QueueError> {
        // stays pending; XAUTOCLAIM hands it out again after claim_idle
        Ok(())
    }
}
