//! Auditor - 投票ログと集計の整合性チェック
//!
//! 静止状態では各 question について「ログ行数 == totalVotes」が成り立つ。
//! consumer が動いている間の差分は遅延であって不整合とは限らない。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::StoreError;
use crate::ports::{ResultsStore, VoteLog};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAudit {
    pub question: u32,
    pub logged: u64,
    pub counted: u64,
}

impl QuestionAudit {
    /// Positive when the log is ahead of the aggregate.
    pub fn drift(&self) -> i64 {
        self.logged as i64 - self.counted as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub survey: String,
    pub questions: Vec<QuestionAudit>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.questions.iter().all(|q| q.drift() == 0)
    }

    pub fn drifting(&self) -> impl Iterator<Item = &QuestionAudit> {
        self.questions.iter().filter(|q| q.drift() != 0)
    }
}

pub struct Auditor {
    log: Arc<dyn VoteLog>,
    results: Arc<dyn ResultsStore>,
    timeout: Duration,
}

impl Auditor {
    pub fn new(log: Arc<dyn VoteLog>, results: Arc<dyn ResultsStore>, timeout: Duration) -> Self {
        Self {
            log,
            results,
            timeout,
        }
    }

    pub async fn audit(&self, survey: &str) -> Result<AuditReport, StoreError> {
        let logged = tokio::time::timeout(self.timeout, self.log.count_by_question(survey))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        let counted: BTreeMap<u32, u64> =
            match tokio::time::timeout(self.timeout, self.results.get_results(survey))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?
            {
                Ok(results) => results
                    .results
                    .iter()
                    .map(|r| (r.question, r.total_votes))
                    .collect(),
                Err(StoreError::ResultsNotFound(_)) => BTreeMap::new(),
                Err(e) => return Err(e),
            };

        let questions: BTreeSet<u32> = logged.keys().chain(counted.keys()).copied().collect();
        let questions = questions
            .into_iter()
            .map(|question| QuestionAudit {
                question,
                logged: logged.get(&question).copied().unwrap_or(0),
                counted: counted.get(&question).copied().unwrap_or(0),
            })
            .collect();

        Ok(AuditReport {
            survey: survey.to_string(),
            questions,
        })
    }
}
