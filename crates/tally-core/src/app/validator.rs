//! VoteValidator - 投票の検証と確定
//!
//! # フロー
//! 1. 構造検証（survey / question / answerType と回答フィールド）
//! 2. survey lookup をちょうど 1 回呼ぶ（validator 内でリトライしない）
//! 3. survey が受付中か、question が存在するか、回答が question に合うか
//! 4. id と timestamp を採番して Vote を返す
//!
//! 構造的に不正な投稿は lookup を呼ぶ前に弾く。

use std::sync::Arc;

use tracing::debug;

use crate::domain::vote::{normalize_user_id, question_id};
use crate::domain::{Answer, InvalidVote, Vote, VotePayload};
use crate::ports::{Clock, IdGenerator, SurveyLookup};

pub struct VoteValidator {
    surveys: Arc<dyn SurveyLookup>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl VoteValidator {
    pub fn new(
        surveys: Arc<dyn SurveyLookup>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { surveys, clock, ids }
    }

    /// Turns a submission into a finalized vote. Any client-supplied `id` or
    /// `timestamp` is ignored.
    pub async fn validate(&self, payload: VotePayload) -> Result<Vote, InvalidVote> {
        let survey_id = payload.survey.trim();
        if survey_id.is_empty() {
            return Err(InvalidVote::MissingField("survey"));
        }
        let question = question_id(payload.question)?;
        let answer = Answer::from_payload(&payload)?;

        let survey = self
            .surveys
            .fetch_survey(survey_id)
            .await
            .map_err(InvalidVote::SurveyUnavailable)?;

        let now = self.clock.now().timestamp();
        if !survey.accepts_votes_at(now) {
            return Err(InvalidVote::SurveyClosed(survey_id.to_string()));
        }
        let question_ref = survey
            .question(question)
            .ok_or_else(|| InvalidVote::UnknownQuestion {
                survey: survey_id.to_string(),
                question,
            })?;
        question_ref.check_answer(&answer)?;

        let vote = Vote::new(
            self.ids.generate_vote_id(),
            survey_id,
            question,
            answer,
            now,
            normalize_user_id(payload.user_id),
        );
        debug!(vote_id = %vote.id(), survey = survey_id, question, "vote validated");
        Ok(vote)
    }
}
