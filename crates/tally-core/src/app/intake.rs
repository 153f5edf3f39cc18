//! VoteIntake - 受付：検証してからキューへ publish
//!
//! 検証に失敗した投票は決して publish しない。publish が broker に受理される
//! まで呼び出し側へ成功を返さない。

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::validator::VoteValidator;
use crate::domain::{CodecError, InvalidVote, QueueError, Vote, VotePayload};
use crate::ports::{VoteCodec, VotePublisher};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] InvalidVote),

    #[error("vote could not be encoded for the queue")]
    Encode(#[source] CodecError),

    #[error("vote was not queued")]
    Publish(#[source] QueueError),
}

pub struct VoteIntake {
    validator: VoteValidator,
    publisher: Arc<dyn VotePublisher>,
    /// Queue wire codec.
    codec: Arc<dyn VoteCodec>,
    publish_timeout: Duration,
}

impl VoteIntake {
    pub fn new(
        validator: VoteValidator,
        publisher: Arc<dyn VotePublisher>,
        codec: Arc<dyn VoteCodec>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            validator,
            publisher,
            codec,
            publish_timeout,
        }
    }

    /// Validates and queues a submission. On `Ok` the vote is durably queued
    /// but not yet aggregated.
    pub async fn submit(&self, payload: VotePayload) -> Result<Vote, SubmitError> {
        let vote = self.validator.validate(payload).await?;
        let bytes = self.codec.encode_vote(&vote).map_err(SubmitError::Encode)?;

        match tokio::time::timeout(self.publish_timeout, self.publisher.publish(bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(vote_id = %vote.id(), error = %e, "publish failed");
                return Err(SubmitError::Publish(e));
            }
            Err(_) => {
                warn!(vote_id = %vote.id(), timeout = ?self.publish_timeout, "publish timed out");
                return Err(SubmitError::Publish(QueueError::Timeout(self.publish_timeout)));
            }
        }

        info!(vote_id = %vote.id(), survey = vote.survey(), question = vote.question(), "vote queued");
        Ok(vote)
    }
}
