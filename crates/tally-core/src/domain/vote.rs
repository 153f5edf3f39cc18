//! Vote - 投票の値オブジェクトとワイヤ表現
//!
//! `VotePayload` is the flat camelCase JSON shape shared by the HTTP
//! submission body and the queue message. `Vote` is the finalized, immutable
//! domain value; it serializes through `VotePayload`, so a queued vote is the
//! submission plus `id` and `timestamp`.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::errors::InvalidVote;
use super::ids::VoteId;

/// Longest accepted free-text answer, in characters.
pub const MAX_TEXT_ANSWER_CHARS: usize = 2000;

/// Wire-level answer discriminator (`answerType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    Option,
    Text,
    Rating,
    Scale,
    Date,
}

impl AnswerType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerType::Option => "option",
            AnswerType::Text => "text",
            AnswerType::Rating => "rating",
            AnswerType::Scale => "scale",
            AnswerType::Date => "date",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "option" => Some(AnswerType::Option),
            "text" => Some(AnswerType::Text),
            "rating" => Some(AnswerType::Rating),
            "scale" => Some(AnswerType::Scale),
            "date" => Some(AnswerType::Date),
            _ => None,
        }
    }
}

/// The answer carried by a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Answer {
    /// Single-choice option id.
    Option(u32),
    /// Multiple-choice option ids, unique, in submission order.
    Options(Vec<u32>),
    /// Trimmed free text.
    Text(String),
    Rating(i32),
    Scale(i32),
    /// Unix seconds.
    Date(i64),
}

impl Answer {
    pub fn answer_type(&self) -> AnswerType {
        match self {
            Answer::Option(_) | Answer::Options(_) => AnswerType::Option,
            Answer::Text(_) => AnswerType::Text,
            Answer::Rating(_) => AnswerType::Rating,
            Answer::Scale(_) => AnswerType::Scale,
            Answer::Date(_) => AnswerType::Date,
        }
    }

    /// Structural parse of the type-specific answer fields of a payload.
    ///
    /// Only checks what can be checked without the survey definition.
    pub fn from_payload(payload: &VotePayload) -> Result<Self, InvalidVote> {
        let raw = payload
            .answer_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(InvalidVote::MissingField("answerType"))?;
        let answer_type =
            AnswerType::parse(raw).ok_or_else(|| InvalidVote::UnknownAnswerType(raw.to_string()))?;

        match answer_type {
            AnswerType::Option => match (payload.option_id, payload.option_ids.as_deref()) {
                (Some(_), Some(_)) => Err(InvalidVote::field(
                    "optionIds",
                    "optionId and optionIds are mutually exclusive",
                )),
                (Some(id), None) => Ok(Answer::Option(option_id("optionId", id)?)),
                (None, Some(ids)) => {
                    if ids.is_empty() {
                        return Err(InvalidVote::field("optionIds", "must not be empty"));
                    }
                    let mut out = Vec::with_capacity(ids.len());
                    for &raw_id in ids {
                        let id = option_id("optionIds", raw_id)?;
                        if out.contains(&id) {
                            return Err(InvalidVote::field(
                                "optionIds",
                                format!("option {id} listed twice"),
                            ));
                        }
                        out.push(id);
                    }
                    Ok(Answer::Options(out))
                }
                (None, None) => Err(InvalidVote::MissingField("optionId")),
            },
            AnswerType::Text => {
                let text = payload
                    .text_answer
                    .as_deref()
                    .ok_or(InvalidVote::MissingField("textAnswer"))?
                    .trim();
                if text.is_empty() {
                    return Err(InvalidVote::field("textAnswer", "must not be blank"));
                }
                if text.chars().count() > MAX_TEXT_ANSWER_CHARS {
                    return Err(InvalidVote::field(
                        "textAnswer",
                        format!("longer than {MAX_TEXT_ANSWER_CHARS} characters"),
                    ));
                }
                Ok(Answer::Text(text.to_string()))
            }
            AnswerType::Rating => {
                let value = payload
                    .rating_value
                    .ok_or(InvalidVote::MissingField("ratingValue"))?;
                Ok(Answer::Rating(small_int("ratingValue", value)?))
            }
            AnswerType::Scale => {
                let value = payload
                    .scale_value
                    .ok_or(InvalidVote::MissingField("scaleValue"))?;
                Ok(Answer::Scale(small_int("scaleValue", value)?))
            }
            AnswerType::Date => {
                let secs = payload
                    .date_answer
                    .ok_or(InvalidVote::MissingField("dateAnswer"))?;
                if DateTime::from_timestamp(secs, 0).is_none() {
                    return Err(InvalidVote::field("dateAnswer", "out of range"));
                }
                Ok(Answer::Date(secs))
            }
        }
    }

    fn write_into(&self, payload: &mut VotePayload) {
        payload.answer_type = Some(self.answer_type().as_str().to_string());
        match self {
            Answer::Option(id) => payload.option_id = Some(i64::from(*id)),
            Answer::Options(ids) => {
                payload.option_ids = Some(ids.iter().map(|&id| i64::from(id)).collect())
            }
            Answer::Text(text) => payload.text_answer = Some(text.clone()),
            Answer::Rating(v) => payload.rating_value = Some(i64::from(*v)),
            Answer::Scale(v) => payload.scale_value = Some(i64::from(*v)),
            Answer::Date(secs) => payload.date_answer = Some(*secs),
        }
    }
}

fn option_id(field: &'static str, raw: i64) -> Result<u32, InvalidVote> {
    u32::try_from(raw).map_err(|_| InvalidVote::field(field, format!("{raw} is not an option id")))
}

fn small_int(field: &'static str, raw: i64) -> Result<i32, InvalidVote> {
    i32::try_from(raw).map_err(|_| InvalidVote::field(field, format!("{raw} is out of range")))
}

/// Question ids are positive integers.
pub(crate) fn question_id(raw: i64) -> Result<u32, InvalidVote> {
    if raw < 1 {
        return Err(InvalidVote::field("question", "must be at least 1"));
    }
    u32::try_from(raw).map_err(|_| InvalidVote::field("question", "out of range"))
}

/// Flat wire form of a vote (HTTP body and queue message).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub survey: String,
    #[serde(default)]
    pub question: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_answer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// An accepted vote. Immutable: there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "VotePayload", try_from = "VotePayload")]
pub struct Vote {
    id: VoteId,
    survey: String,
    question: u32,
    answer: Answer,
    timestamp: i64,
    user_id: Option<String>,
}

impl Vote {
    pub fn new(
        id: VoteId,
        survey: impl Into<String>,
        question: u32,
        answer: Answer,
        timestamp: i64,
        user_id: Option<String>,
    ) -> Self {
        Self {
            id,
            survey: survey.into(),
            question,
            answer,
            timestamp,
            user_id,
        }
    }

    pub fn id(&self) -> VoteId {
        self.id
    }

    pub fn survey(&self) -> &str {
        &self.survey
    }

    pub fn question(&self) -> u32 {
        self.question
    }

    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    /// Acceptance time, Unix seconds (UTC).
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl From<Vote> for VotePayload {
    fn from(vote: Vote) -> Self {
        let mut payload = VotePayload {
            id: Some(vote.id.to_string()),
            survey: vote.survey,
            question: i64::from(vote.question),
            timestamp: Some(vote.timestamp),
            user_id: vote.user_id,
            ..VotePayload::default()
        };
        vote.answer.write_into(&mut payload);
        payload
    }
}

impl TryFrom<VotePayload> for Vote {
    type Error = InvalidVote;

    fn try_from(payload: VotePayload) -> Result<Self, Self::Error> {
        let id = payload
            .id
            .as_deref()
            .ok_or(InvalidVote::MissingField("id"))?
            .parse::<VoteId>()
            .map_err(|e| InvalidVote::field("id", e.to_string()))?;
        let timestamp = payload
            .timestamp
            .ok_or(InvalidVote::MissingField("timestamp"))?;
        if payload.survey.trim().is_empty() {
            return Err(InvalidVote::MissingField("survey"));
        }
        let question = question_id(payload.question)?;
        let answer = Answer::from_payload(&payload)?;

        Ok(Vote {
            id,
            survey: payload.survey,
            question,
            answer,
            timestamp,
            user_id: normalize_user_id(payload.user_id),
        })
    }
}

pub(crate) fn normalize_user_id(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
