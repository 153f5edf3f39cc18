//! Errors - エラー型と分類
//!
//! Every port has its own error enum so adapters can report precisely what
//! went wrong; `ErrorKind` is the operational classification the consumer
//! loop and the lookup retry logic act on.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ids::VoteId;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（PG/Redis/survey service の障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorKind {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// A submission that must not be queued.
#[derive(Debug, thiserror::Error)]
pub enum InvalidVote {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("unknown answer type `{0}`")]
    UnknownAnswerType(String),

    /// The survey could not be fetched. Callers see the same response as for
    /// any other invalid vote.
    #[error("survey could not be resolved")]
    SurveyUnavailable(#[source] LookupError),

    #[error("survey `{0}` is not accepting votes")]
    SurveyClosed(String),

    #[error("question {question} does not exist in survey `{survey}`")]
    UnknownQuestion { survey: String, question: u32 },

    #[error("answer does not fit question {question}: {reason}")]
    AnswerMismatch { question: u32, reason: String },
}

impl InvalidVote {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        InvalidVote::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(question: u32, reason: impl Into<String>) -> Self {
        InvalidVote::AnswerMismatch {
            question,
            reason: reason.into(),
        }
    }
}

/// Failure of the survey lookup RPC.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("survey `{0}` not found")]
    NotFound(String),

    #[error("survey service unavailable: {0}")]
    Unavailable(String),

    #[error("survey service answered with status {0}")]
    Status(u16),

    #[error("malformed survey response: {0}")]
    Malformed(String),

    #[error("survey lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl LookupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LookupError::NotFound(_) | LookupError::Malformed(_) => ErrorKind::Permanent,
            LookupError::Status(code) if *code < 500 => ErrorKind::Permanent,
            LookupError::Status(_) | LookupError::Timeout(_) => ErrorKind::Transient,
            LookupError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Failure of the durable vote queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("queue is closed")]
    Closed,
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Timeout(_) => ErrorKind::Transient,
            QueueError::Unavailable(_) | QueueError::Closed => ErrorKind::Infrastructure,
        }
    }
}

/// Failure of the vote log or the results aggregate store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vote {0} is already in the log")]
    DuplicateVote(VoteId),

    #[error("no results for survey `{0}`")]
    ResultsNotFound(String),

    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DuplicateVote(_) | StoreError::ResultsNotFound(_) => ErrorKind::Permanent,
            StoreError::Timeout(_) => ErrorKind::Transient,
            StoreError::Backend(_) => ErrorKind::Infrastructure,
        }
    }
}

/// Failure to encode or decode a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cannot decode payload: {0}")]
    Decode(String),

    #[error("cannot encode payload: {0}")]
    Encode(String),
}

/// Error body returned to HTTP clients: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
