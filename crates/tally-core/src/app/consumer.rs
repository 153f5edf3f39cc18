//! VoteProcessor - キューメッセージ 1 件の処理
//!
//! # 状態遷移
//! `Received → LogPersisted → AggregateUpdated → Acknowledged`
//!
//! - decode 失敗：ログに残して ack（破棄）。壊れた bytes は再生できない
//! - ログ追記の重複：成功扱いで集計へ進む（集計側が vote id で重複排除）
//! - それ以外のストア失敗：ack せず release し、再配送に任せる
//!
//! 再配送回数に上限はなく dead-letter もない。恒久的に失敗するメッセージは
//! 再配送され続けるので、失敗は redelivered フラグ付きで warn に出す。

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::domain::{Contribution, QueueError, StoreError, VoteId};
use crate::ports::{Delivery, ResultsStore, UpsertOutcome, VoteCodec, VoteLog};

/// Last stage a message reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    LogPersisted,
    AggregateUpdated,
    Acknowledged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::LogPersisted => "log_persisted",
            Stage::AggregateUpdated => "aggregate_updated",
            Stage::Acknowledged => "acknowledged",
        };
        f.write_str(s)
    }
}

/// A message that was acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Applied { vote_id: VoteId, outcome: UpsertOutcome },
    /// Undecodable payload, acked and discarded.
    Dropped,
}

/// A message that was left unacknowledged.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("vote {vote_id}: log append failed")]
    LogAppend {
        vote_id: VoteId,
        #[source]
        source: StoreError,
    },

    #[error("vote {vote_id}: aggregate upsert failed")]
    Aggregate {
        vote_id: VoteId,
        #[source]
        source: StoreError,
    },

    #[error("delivery could not be acknowledged")]
    Ack(#[source] QueueError),
}

impl ProcessError {
    pub fn stage(&self) -> Stage {
        match self {
            ProcessError::LogAppend { .. } => Stage::Received,
            ProcessError::Aggregate { .. } => Stage::LogPersisted,
            ProcessError::Ack(_) => Stage::AggregateUpdated,
        }
    }
}

pub struct VoteProcessor {
    log: Arc<dyn VoteLog>,
    results: Arc<dyn ResultsStore>,
    codec: Arc<dyn VoteCodec>,
    storage_timeout: Duration,
}

impl VoteProcessor {
    pub fn new(
        log: Arc<dyn VoteLog>,
        results: Arc<dyn ResultsStore>,
        codec: Arc<dyn VoteCodec>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            log,
            results,
            codec,
            storage_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.storage_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.storage_timeout))?
    }

    /// Processes one delivery to completion. No cancellation points are meant
    /// to be raced against this future.
    pub async fn process(&self, delivery: Box<dyn Delivery>) -> Result<Processed, ProcessError> {
        let tag = delivery.delivery_tag().to_string();
        let redelivered = delivery.redelivered();

        // Received
        let vote = match self.codec.decode_vote(delivery.payload()) {
            Ok(vote) => vote,
            Err(e) => {
                error!(delivery = %tag, error = %e, "dropping undecodable vote message");
                delivery.ack().await.map_err(ProcessError::Ack)?;
                return Ok(Processed::Dropped);
            }
        };
        let vote_id = vote.id();

        // LogPersisted
        match self.bounded(self.log.append(&vote)).await {
            Ok(()) => debug!(%vote_id, stage = %Stage::LogPersisted, "vote logged"),
            Err(StoreError::DuplicateVote(_)) => {
                debug!(%vote_id, redelivered, "vote already logged");
            }
            Err(source) => {
                warn!(%vote_id, delivery = %tag, redelivered, error = %source,
                    "log append failed; leaving message for redelivery");
                release(delivery).await;
                return Err(ProcessError::LogAppend { vote_id, source });
            }
        }

        // AggregateUpdated
        let contribution = Contribution::from_vote(&vote);
        let outcome = match self
            .bounded(self.results.upsert(vote.survey(), vote.question(), &contribution))
            .await
        {
            Ok(outcome) => outcome,
            Err(source) => {
                warn!(%vote_id, delivery = %tag, redelivered, error = %source,
                    "aggregate upsert failed; leaving message for redelivery");
                release(delivery).await;
                return Err(ProcessError::Aggregate { vote_id, source });
            }
        };

        // Acknowledged
        delivery.ack().await.map_err(ProcessError::Ack)?;
        info!(%vote_id, survey = vote.survey(), question = vote.question(), ?outcome,
            stage = %Stage::Acknowledged, "vote processed");
        Ok(Processed::Applied { vote_id, outcome })
    }
}

async fn release(delivery: Box<dyn Delivery>) {
    let tag = delivery.delivery_tag().to_string();
    if let Err(e) = delivery.release().await {
        warn!(delivery = %tag, error = %e, "release failed; broker will redeliver after timeout");
    }
}
