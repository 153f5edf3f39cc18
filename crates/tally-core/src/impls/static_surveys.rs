//! StaticSurveys - 固定の survey 定義を返す SurveyLookup
//!
//! Used in tests and for running the API without a survey service. Counts
//! calls so tests can assert the one-lookup-per-submission contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::{LookupError, SurveyRef};
use crate::ports::SurveyLookup;

#[derive(Default)]
pub struct StaticSurveys {
    surveys: HashMap<String, SurveyRef>,
    calls: AtomicUsize,
}

impl StaticSurveys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, survey: SurveyRef) -> Self {
        self.surveys.insert(survey.id.clone(), survey);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurveyLookup for StaticSurveys {
    async fn fetch_survey(&self, survey_id: &str) -> Result<SurveyRef, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.surveys
            .get(survey_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(survey_id.to_string()))
    }
}
