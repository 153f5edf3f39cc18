//! HTTP survey lookup - survey service の `GET /surveys/{id}` を叩く

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tally_core::domain::{LookupError, SurveyRef};
use tally_core::ports::SurveyLookup;
use tally_core::retry::RetryPolicy;
use tracing::debug;

pub struct HttpSurveyLookup {
    client: Client,
    base: Url,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpSurveyLookup {
    /// `timeout` bounds each attempt; `retry` decides how many there are.
    pub fn new(base: Url, timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            timeout,
            retry,
        })
    }

    fn survey_url(&self, survey_id: &str) -> Result<Url, LookupError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| LookupError::Malformed(format!("`{}` cannot be a base url", self.base)))?
            .pop_if_empty()
            .push("surveys")
            .push(survey_id);
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else {
            LookupError::Unavailable(e.to_string())
        }
    }

    async fn fetch_once(&self, survey_id: &str) -> Result<SurveyRef, LookupError> {
        let url = self.survey_url(survey_id)?;
        debug!(%url, "fetching survey");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(LookupError::NotFound(survey_id.to_string())),
            status if !status.is_success() => return Err(LookupError::Status(status.as_u16())),
            _ => {}
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let survey: SurveyRef =
            serde_json::from_slice(&body).map_err(|e| LookupError::Malformed(e.to_string()))?;
        if survey.id != survey_id {
            return Err(LookupError::Malformed(format!(
                "asked for survey `{survey_id}`, got `{}`",
                survey.id
            )));
        }
        Ok(survey)
    }
}

#[async_trait]
impl SurveyLookup for HttpSurveyLookup {
    async fn fetch_survey(&self, survey_id: &str) -> Result<SurveyRef, LookupError> {
        self.retry
            .run(|| self.fetch_once(survey_id), |e: &LookupError| e.kind().is_retryable())
            .await
    }
}
