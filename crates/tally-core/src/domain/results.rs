//! Results - 集計モデル
//!
//! A question aggregate is stored as a vote counter plus a set of counted
//! buckets (one per option, rating value, scale value, text answer and day).
//! Every derived number in [`QuestionResults`] (percentages, averages) is
//! computed from those counts on read, so an increment never has to read the
//! previous row first.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::ids::VoteId;
use super::vote::{Answer, Vote};

/// One vote's worth of contribution to a question aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub vote_id: VoteId,
    pub answer: Answer,
    /// Vote timestamp, Unix seconds.
    pub at: i64,
}

impl Contribution {
    pub fn from_vote(vote: &Vote) -> Self {
        Self {
            vote_id: vote.id(),
            answer: vote.answer().clone(),
            at: vote.timestamp(),
        }
    }

    /// Buckets this contribution increments by one.
    pub fn buckets(&self) -> Vec<Bucket> {
        match &self.answer {
            Answer::Option(id) => vec![Bucket::Option(*id)],
            Answer::Options(ids) => ids.iter().map(|id| Bucket::Option(*id)).collect(),
            Answer::Text(text) => vec![Bucket::Text(text.trim().to_string())],
            Answer::Rating(v) => vec![Bucket::Rating(*v)],
            Answer::Scale(v) => vec![Bucket::Scale(*v)],
            Answer::Date(secs) => utc_day(*secs).map(Bucket::Day).into_iter().collect(),
        }
    }
}

fn utc_day(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|at| at.format("%Y-%m-%d").to_string())
}

/// A counted breakdown cell of a question aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Option(u32),
    Text(String),
    Rating(i32),
    Scale(i32),
    /// UTC day, `YYYY-MM-DD`.
    Day(String),
}

impl Bucket {
    pub fn kind(&self) -> &'static str {
        match self {
            Bucket::Option(_) => "option",
            Bucket::Text(_) => "text",
            Bucket::Rating(_) => "rating",
            Bucket::Scale(_) => "scale",
            Bucket::Day(_) => "date",
        }
    }

    pub fn key(&self) -> String {
        match self {
            Bucket::Option(id) => id.to_string(),
            Bucket::Text(text) => text.clone(),
            Bucket::Rating(v) | Bucket::Scale(v) => v.to_string(),
            Bucket::Day(day) => day.clone(),
        }
    }

    /// Inverse of (`kind`, `key`); `None` for rows this version does not know.
    pub fn parse(kind: &str, key: &str) -> Option<Self> {
        match kind {
            "option" => key.parse().ok().map(Bucket::Option),
            "text" => Some(Bucket::Text(key.to_string())),
            "rating" => key.parse().ok().map(Bucket::Rating),
            "scale" => key.parse().ok().map(Bucket::Scale),
            "date" => Some(Bucket::Day(key.to_string())),
            _ => None,
        }
    }
}

/// Stored state of one (survey, question) aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionTally {
    pub question: u32,
    pub total_votes: u64,
    /// Max timestamp of contributing votes.
    pub updated_at: i64,
    pub buckets: BTreeMap<Bucket, u64>,
}

impl QuestionTally {
    pub fn new(question: u32) -> Self {
        Self {
            question,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, contribution: &Contribution) {
        self.total_votes += 1;
        self.updated_at = self.updated_at.max(contribution.at);
        for bucket in contribution.buckets() {
            self.add_bucket(bucket, 1);
        }
    }

    pub fn add_bucket(&mut self, bucket: Bucket, count: u64) {
        *self.buckets.entry(bucket).or_insert(0) += count;
    }

    pub fn to_results(&self) -> QuestionResults {
        let mut out = QuestionResults {
            question: self.question,
            total_votes: self.total_votes,
            ..QuestionResults::default()
        };
        let mut texts = Vec::new();

        for (bucket, &count) in &self.buckets {
            match bucket {
                Bucket::Option(id) => out.option_results.push(OptionResult {
                    option_id: *id,
                    count,
                    percentage: percentage(count, self.total_votes),
                }),
                Bucket::Text(answer) => texts.push(TextAnswerResult {
                    answer: answer.clone(),
                    count,
                }),
                Bucket::Rating(v) => {
                    out.rating_counts.insert(*v, count);
                }
                Bucket::Scale(v) => {
                    out.scale_counts.insert(*v, count);
                }
                Bucket::Day(day) => {
                    out.date_distribution.insert(day.clone(), count);
                }
            }
        }

        texts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.answer.cmp(&b.answer)));
        out.text_answers = texts;
        out.average_rating = mean(&out.rating_counts);
        out.average_scale = mean(&out.scale_counts);
        out
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn mean(counts: &BTreeMap<i32, u64>) -> Option<f64> {
    let n: u64 = counts.values().sum();
    if n == 0 {
        return None;
    }
    let sum: f64 = counts.iter().map(|(v, c)| f64::from(*v) * *c as f64).sum();
    Some(round2(sum / n as f64))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResults {
    pub question: u32,
    pub total_votes: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_results: Vec<OptionResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_answers: Vec<TextAnswerResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rating_counts: BTreeMap<i32, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scale_counts: BTreeMap<i32, u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub date_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub option_id: u32,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnswerResult {
    pub answer: String,
    pub count: u64,
}

/// All question aggregates of a survey, as served by `GET /results/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResults {
    pub survey: String,
    pub results: Vec<QuestionResults>,
    pub updated_at: i64,
}

impl SurveyResults {
    /// Ordered by question id.
    pub fn from_tallies(survey: impl Into<String>, tallies: impl IntoIterator<Item = QuestionTally>) -> Self {
        let mut tallies: Vec<_> = tallies.into_iter().collect();
        tallies.sort_by_key(|t| t.question);
        Self {
            survey: survey.into(),
            updated_at: tallies.iter().map(|t| t.updated_at).max().unwrap_or(0),
            results: tallies.iter().map(QuestionTally::to_results).collect(),
        }
    }

    pub fn question(&self, id: u32) -> Option<&QuestionResults> {
        self.results.iter().find(|r| r.question == id)
    }
}
