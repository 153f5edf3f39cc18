//! Domain - 投票パイプラインのドメインモデル
//!
//! # 設計原則
//! - I/O を持たない（ports 経由でのみ外部に触れる）
//! - Vote は不変（setter なし）
//! - 集計はバケット単位のカウントで表現し、派生値は読み出し時に計算

pub mod errors;
pub mod ids;
pub mod results;
pub mod survey;
pub mod vote;

pub use errors::{
    CodecError, ErrorKind, ErrorResponse, InvalidVote, LookupError, QueueError, StoreError,
};
pub use ids::{VoteId, VoteIdParseError};
pub use results::{
    Bucket, Contribution, OptionResult, QuestionResults, QuestionTally, SurveyResults,
    TextAnswerResult,
};
pub use survey::{OptionRef, QuestionKind, QuestionRef, SurveyRef};
pub use vote::{Answer, AnswerType, MAX_TEXT_ANSWER_CHARS, Vote, VotePayload};
