//! VoteCodec port - content-type ごとのシリアライザ

use crate::domain::{CodecError, ErrorResponse, SurveyResults, Vote, VotePayload};

/// Serializer for one content type.
pub trait VoteCodec: Send + Sync {
    fn content_type(&self) -> &'static str;

    /// Decodes a client submission (no id or timestamp yet).
    fn decode_submission(&self, bytes: &[u8]) -> Result<VotePayload, CodecError>;

    fn encode_vote(&self, vote: &Vote) -> Result<Vec<u8>, CodecError>;

    /// Decodes a queued vote; anything that is not a complete vote is an error.
    fn decode_vote(&self, bytes: &[u8]) -> Result<Vote, CodecError>;

    fn encode_results(&self, results: &SurveyResults) -> Result<Vec<u8>, CodecError>;

    fn encode_error(&self, error: &ErrorResponse) -> Result<Vec<u8>, CodecError>;
}
