//! JsonCodec - `application/json` の VoteCodec
//!
//! The HTTP body, the queue message and the results response all use the
//! camelCase JSON shapes defined in `domain`.

use crate::domain::{CodecError, ErrorResponse, SurveyResults, Vote, VotePayload};
use crate::ports::VoteCodec;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl VoteCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn decode_submission(&self, bytes: &[u8]) -> Result<VotePayload, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_vote(&self, vote: &Vote) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(vote).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_vote(&self, bytes: &[u8]) -> Result<Vote, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_results(&self, results: &SurveyResults) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(results).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn encode_error(&self, error: &ErrorResponse) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(error).map_err(|e| CodecError::Encode(e.to_string()))
    }
}
