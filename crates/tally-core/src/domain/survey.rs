//! Survey definitions as returned by the survey service.
//!
//! These are read-only views fetched per validation and never cached. Only
//! what the validator needs is modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

use super::errors::InvalidVote;
use super::vote::Answer;

pub const DEFAULT_RATING_RANGE: (i32, i32) = (1, 5);
pub const DEFAULT_SCALE_RANGE: (i32, i32) = (1, 10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRef {
    pub id: String,
    #[serde(default)]
    pub questions: Vec<QuestionRef>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    /// Unix seconds after which the survey stops accepting votes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

fn active_by_default() -> bool {
    true
}

impl SurveyRef {
    pub fn new(id: impl Into<String>, questions: Vec<QuestionRef>) -> Self {
        Self {
            id: id.into(),
            questions,
            is_active: true,
            expires_at: None,
        }
    }

    pub fn question(&self, id: u32) -> Option<&QuestionRef> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn accepts_votes_at(&self, now_secs: i64) -> bool {
        self.is_active && self.expires_at.is_none_or(|at| now_secs < at)
    }
}

/// Question types understood by the survey service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    Text,
    Rating,
    Scale,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRef {
    pub id: u32,
    /// Questions without a declared type only have their id checked.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<QuestionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRef {
    pub id: u32,
    #[serde(default)]
    pub text: String,
}

impl QuestionRef {
    pub fn untyped(id: u32) -> Self {
        Self {
            id,
            kind: None,
            options: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }

    pub fn typed(id: u32, kind: QuestionKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::untyped(id)
        }
    }

    pub fn with_options(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.options = ids
            .into_iter()
            .map(|id| OptionRef {
                id,
                text: String::new(),
            })
            .collect();
        self
    }

    pub fn with_range(mut self, min: i32, max: i32) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    fn range(&self, default: (i32, i32)) -> (i32, i32) {
        (
            self.min_value.unwrap_or(default.0),
            self.max_value.unwrap_or(default.1),
        )
    }

    fn has_option(&self, id: u32) -> bool {
        self.options.iter().any(|o| o.id == id)
    }

    /// Checks that `answer` fits this question's type, options and bounds.
    pub fn check_answer(&self, answer: &Answer) -> Result<(), InvalidVote> {
        let Some(kind) = self.kind else {
            return Ok(());
        };
        let q = self.id;

        match (kind, answer) {
            (QuestionKind::SingleChoice | QuestionKind::MultipleChoice, Answer::Option(id)) => {
                if !self.has_option(*id) {
                    return Err(InvalidVote::mismatch(q, format!("option {id} does not exist")));
                }
                Ok(())
            }
            (QuestionKind::MultipleChoice, Answer::Options(ids)) => {
                match ids.iter().find(|id| !self.has_option(**id)) {
                    Some(id) => Err(InvalidVote::mismatch(q, format!("option {id} does not exist"))),
                    None => Ok(()),
                }
            }
            (QuestionKind::SingleChoice, Answer::Options(_)) => Err(InvalidVote::mismatch(
                q,
                "single choice question takes exactly one option",
            )),
            (QuestionKind::Text, Answer::Text(_)) => Ok(()),
            (QuestionKind::Rating, Answer::Rating(v)) => {
                in_range(q, "rating", *v, self.range(DEFAULT_RATING_RANGE))
            }
            (QuestionKind::Scale, Answer::Scale(v)) => {
                in_range(q, "scale", *v, self.range(DEFAULT_SCALE_RANGE))
            }
            (QuestionKind::Date, Answer::Date(_)) => Ok(()),
            (kind, answer) => Err(InvalidVote::mismatch(
                q,
                format!(
                    "{} answer given to a {kind:?} question",
                    answer.answer_type().as_str()
                ),
            )),
        }
    }
}

fn in_range(question: u32, what: &str, value: i32, (min, max): (i32, i32)) -> Result<(), InvalidVote> {
    if value < min || value > max {
        return Err(InvalidVote::mismatch(
            question,
            format!("{what} {value} outside {min}..={max}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn decodes_survey_service_response() {
        let survey: SurveyRef = serde_json::from_value(json!({
            "id": "S1",
            "name": "Lunch",
            "createdAt": 1_700_000_000,
            "questions": [
                {"id": 1, "text": "Where?", "type": "single_choice",
                 "options": [{"id": 1, "text": "A"}, {"id": 2, "text": "B"}]},
                {"id": 2, "text": "How good?", "type": "rating", "minValue": 1, "maxValue": 3},
                {"id": 3, "text": "Legacy"}
            ]
        }))
        .unwrap();

        assert!(survey.is_active);
        assert_eq!(survey.questions.len(), 3);
        assert_eq!(survey.question(2).unwrap().max_value, Some(3));
        assert_eq!(survey.question(3).unwrap().kind, None);
        assert!(survey.question(4).is_none());
    }

    #[test]
    fn inactive_or_expired_surveys_are_closed() {
        let mut survey = SurveyRef::new("S1", vec![]);
        assert!(survey.accepts_votes_at(100));

        survey.expires_at = Some(100);
        assert!(survey.accepts_votes_at(99));
        assert!(!survey.accepts_votes_at(100));

        survey.expires_at = None;
        survey.is_active = false;
        assert!(!survey.accepts_votes_at(0));
    }

    #[rstest]
    #[case::known_option(QuestionRef::typed(1, QuestionKind::SingleChoice).with_options([1, 2, 3]), Answer::Option(2))]
    #[case::multi(QuestionRef::typed(1, QuestionKind::MultipleChoice).with_options([1, 2, 3]), Answer::Options(vec![1, 3]))]
    #[case::default_rating_bounds(QuestionRef::typed(1, QuestionKind::Rating), Answer::Rating(5))]
    #[case::declared_scale_bounds(QuestionRef::typed(1, QuestionKind::Scale).with_range(0, 100), Answer::Scale(0))]
    #[case::text(QuestionRef::typed(1, QuestionKind::Text), Answer::Text("ok".into()))]
    #[case::date(QuestionRef::typed(1, QuestionKind::Date), Answer::Date(0))]
    #[case::untyped_accepts_anything(QuestionRef::untyped(1), Answer::Rating(99))]
    fn fitting_answers_pass(#[case] question: QuestionRef, #[case] answer: Answer) {
        assert!(question.check_answer(&answer).is_ok());
    }

    #[rstest]
    #[case::unknown_option(QuestionRef::typed(1, QuestionKind::SingleChoice).with_options([1, 2, 3]), Answer::Option(4))]
    #[case::many_on_single(QuestionRef::typed(1, QuestionKind::SingleChoice).with_options([1, 2]), Answer::Options(vec![1, 2]))]
    #[case::unknown_in_many(QuestionRef::typed(1, QuestionKind::MultipleChoice).with_options([1, 2]), Answer::Options(vec![1, 7]))]
    #[case::rating_too_high(QuestionRef::typed(1, QuestionKind::Rating), Answer::Rating(6))]
    #[case::rating_below_declared(QuestionRef::typed(1, QuestionKind::Rating).with_range(2, 4), Answer::Rating(1))]
    #[case::scale_too_high(QuestionRef::typed(1, QuestionKind::Scale), Answer::Scale(11))]
    #[case::wrong_type(QuestionRef::typed(1, QuestionKind::Text), Answer::Option(1))]
    fn mismatched_answers_fail(#[case] question: QuestionRef, #[case] answer: Answer) {
        assert!(matches!(
            question.check_answer(&answer),
            Err(InvalidVote::AnswerMismatch { question: 1, .. })
        ));
    }
}
