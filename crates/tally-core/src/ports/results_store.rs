//! ResultsStore port - 質問ごとの集計行

use async_trait::async_trait;

use crate::domain::{Contribution, StoreError, SurveyResults};

/// What an upsert did to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First vote for the (survey, question) pair.
    Created,
    Incremented,
    /// This vote id was already counted; nothing changed.
    AlreadyApplied,
}

/// # 並行性
/// - 同じ (survey, question) への同時 upsert でカウントを失わないこと
/// - 同じ vote id の upsert は二度数えないこと（再配送対策）
#[async_trait]
pub trait ResultsStore: Send + Sync {
    async fn upsert(
        &self,
        survey: &str,
        question: u32,
        contribution: &Contribution,
    ) -> Result<UpsertOutcome, StoreError>;

    /// All question aggregates of `survey`, or `StoreError::ResultsNotFound`
    /// when there are none (unknown survey and no votes yet look the same).
    async fn get_results(&self, survey: &str) -> Result<SurveyResults, StoreError>;
}
