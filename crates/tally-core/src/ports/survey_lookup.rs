//! SurveyLookup port - survey service への問い合わせ

use async_trait::async_trait;

use crate::domain::{LookupError, SurveyRef};

/// Fetches a survey definition by id.
///
/// Implementations own their retry policy; callers make exactly one call per
/// submission and never cache the result.
#[async_trait]
pub trait SurveyLookup: Send + Sync {
    async fn fetch_survey(&self, survey_id: &str) -> Result<SurveyRef, LookupError>;
}
