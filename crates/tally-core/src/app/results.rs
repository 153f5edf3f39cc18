//! ResultsReader - 集計の読み取り専用ビュー
//!
//! consumer の遅れ分だけ古い可能性がある（read-your-writes は保証しない）。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{StoreError, SurveyResults};
use crate::ports::ResultsStore;

pub struct ResultsReader {
    store: Arc<dyn ResultsStore>,
    timeout: Duration,
}

impl ResultsReader {
    pub fn new(store: Arc<dyn ResultsStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// `StoreError::ResultsNotFound` covers both an unknown survey and a
    /// survey without processed votes.
    pub async fn get(&self, survey: &str) -> Result<SurveyResults, StoreError> {
        tokio::time::timeout(self.timeout, self.store.get_results(survey))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}
