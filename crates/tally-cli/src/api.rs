//! HTTP API
//!
//! - `POST /vote` 投票を受け付けてキューへ（集計は consumer 側）
//! - `GET /results/{survey}` 集計結果

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tally_core::app::{ResultsReader, SubmitError, VoteIntake};
use tally_core::domain::{CodecError, ErrorResponse, StoreError};
use tally_core::impls::CodecRegistry;
use tally_core::ports::VoteCodec;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error};

#[derive(Clone)]
pub struct ApiState {
    pub intake: Arc<VoteIntake>,
    pub reader: Arc<ResultsReader>,
    pub codecs: Arc<CodecRegistry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[source] CodecError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Results(#[from] StoreError),

    #[error("Response could not be encoded")]
    Encode(#[source] CodecError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Submit(SubmitError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Results(StoreError::ResultsNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Submit(_) | ApiError::Results(_) | ApiError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// `{"error": ...}` in the request's codec. 5xx details stay in the log.
    fn render(self, codec: &dyn VoteCodec) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, source = ?std::error::Error::source(&self), "request failed");
            "Internal error".to_string()
        } else {
            debug!(%status, error = %self, "request rejected");
            self.to_string()
        };

        match codec.encode_error(&ErrorResponse::new(message.as_str())) {
            Ok(body) => encoded(status, codec, body),
            Err(e) => {
                error!(error = %e, "error body could not be encoded");
                (status, message).into_response()
            }
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/vote", post(submit_vote))
        .route("/results/{survey}", get(survey_results))
        .layer(cors)
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn encoded(status: StatusCode, codec: &dyn VoteCodec, body: Vec<u8>) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static(codec.content_type()))],
        body,
    )
        .into_response()
}

async fn submit_vote(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let codec = state.codecs.resolve(header(&headers, CONTENT_TYPE));
    accept_vote(&state, codec.as_ref(), &body)
        .await
        .unwrap_or_else(|e| e.render(codec.as_ref()))
}

async fn accept_vote(
    state: &ApiState,
    codec: &dyn VoteCodec,
    body: &[u8],
) -> Result<Response, ApiError> {
    let payload = codec
        .decode_submission(body)
        .map_err(ApiError::MalformedPayload)?;

    let vote = state.intake.submit(payload).await?;
    let body = codec.encode_vote(&vote).map_err(ApiError::Encode)?;
    Ok(encoded(StatusCode::CREATED, codec, body))
}

async fn survey_results(
    State(state): State<ApiState>,
    Path(survey): Path<String>,
    headers: HeaderMap,
) -> Response {
    let codec = state.codecs.resolve(header(&headers, ACCEPT));
    read_results(&state, codec.as_ref(), &survey)
        .await
        .unwrap_or_else(|e| e.render(codec.as_ref()))
}

async fn read_results(
    state: &ApiState,
    codec: &dyn VoteCodec,
    survey: &str,
) -> Result<Response, ApiError> {
    let results = state.reader.get(survey).await?;
    let body = codec.encode_results(&results).map_err(ApiError::Encode)?;
    Ok(encoded(StatusCode::OK, codec, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tally_core::app::{VoteProcessor, VoteValidator};
    use tally_core::domain::{QueueError, QuestionKind, QuestionRef, SurveyRef};
    use tally_core::impls::{
        InMemoryResultsStore, InMemoryVoteLog, InMemoryVoteQueue, JsonCodec, StaticSurveys,
    };
    use tally_core::ports::{SystemClock, UlidGenerator, VotePublisher, VoteSource};
    use tower::ServiceExt;

    struct DownBroker;

    #[async_trait]
    impl VotePublisher for DownBroker {
        async fn publish(&self, _payload: Vec<u8>) -> Result<(), QueueError> {
            Err(QueueError::Unavailable("connection refused".into()))
        }
    }

    struct Harness {
        app: Router,
        queue: InMemoryVoteQueue,
        processor: VoteProcessor,
    }

    fn harness_with(publisher: Option<Arc<dyn VotePublisher>>) -> Harness {
        let surveys = StaticSurveys::new().with(SurveyRef::new(
            "lunch",
            vec![
                QuestionRef::typed(1, QuestionKind::SingleChoice).with_options([1, 2]),
                QuestionRef::typed(2, QuestionKind::Rating),
            ],
        ));
        let queue = InMemoryVoteQueue::new();
        let results = InMemoryResultsStore::new();
        let validator = VoteValidator::new(
            Arc::new(surveys),
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
        );
        let publisher = publisher.unwrap_or_else(|| Arc::new(queue.clone()));
        let state = ApiState {
            intake: Arc::new(VoteIntake::new(
                validator,
                publisher,
                Arc::new(JsonCodec),
                Duration::from_secs(1),
            )),
            reader: Arc::new(ResultsReader::new(
                Arc::new(results.clone()),
                Duration::from_secs(1),
            )),
            codecs: Arc::new(CodecRegistry::with_defaults()),
        };
        let processor = VoteProcessor::new(
            Arc::new(InMemoryVoteLog::new()),
            Arc::new(results),
            Arc::new(JsonCodec),
            Duration::from_secs(1),
        );
        Harness {
            app: router(state),
            queue,
            processor,
        }
    }

    fn harness() -> Harness {
        harness_with(None)
    }

    fn post_vote(body: impl Into<Body>) -> Request<Body> {
        Request::post("/vote")
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    impl Harness {
        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        async fn drain(&self) {
            while let Some(delivery) = self
                .queue
                .next_delivery(Duration::from_millis(10))
                .await
                .unwrap()
            {
                self.processor.process(delivery).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn accepted_vote_is_queued_and_echoed() {
        let h = harness();
        let body = json!({"survey": "lunch", "question": 1, "answerType": "option", "optionId": 2});

        let response = h.send(post_vote(body.to_string())).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let vote = json_body(response).await;
        assert!(vote["id"].as_str().is_some_and(|id| id.len() == 26));
        assert!(vote["timestamp"].is_i64());
        assert_eq!(vote["optionId"], 2);
        assert_eq!(h.queue.ready_len().await, 1);
    }

    #[tokio::test]
    async fn undecodable_body_is_bad_request() {
        let h = harness();
        let response = h.send(post_vote("{\"survey\": ")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let error = json_body(response).await;
        assert!(error["error"].as_str().is_some_and(|e| e.starts_with("Malformed payload")));
        assert_eq!(h.queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn invalid_votes_are_unprocessable() {
        let h = harness();
        for body in [
            json!({"survey": "nope", "question": 1, "answerType": "option", "optionId": 1}),
            json!({"survey": "lunch", "question": 9, "answerType": "option", "optionId": 1}),
            json!({"survey": "lunch", "question": 1, "answerType": "option", "optionId": 7}),
            json!({"survey": "lunch", "question": 2, "answerType": "rating", "ratingValue": 6}),
            json!({"question": 1, "answerType": "option", "optionId": 1}),
        ] {
            let response = h.send(post_vote(body.to_string())).await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        }
        assert_eq!(h.queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn rejection_reason_is_a_json_error_body() {
        let h = harness();
        let body = json!({"survey": "lunch", "question": 9, "answerType": "option", "optionId": 1});

        let response = h.send(post_vote(body.to_string())).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            json_body(response).await,
            json!({"error": "question 9 does not exist in survey `lunch`"})
        );
    }

    #[tokio::test]
    async fn broker_failure_is_internal_error() {
        let h = harness_with(Some(Arc::new(DownBroker) as Arc<dyn VotePublisher>));
        let body = json!({"survey": "lunch", "question": 1, "answerType": "option", "optionId": 1});

        let response = h.send(post_vote(body.to_string())).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({"error": "Internal error"}));
    }

    #[tokio::test]
    async fn results_appear_once_votes_are_consumed() {
        let h = harness();
        let results = || Request::get("/results/lunch").body(Body::empty()).unwrap();

        let missing = h.send(results()).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(missing).await,
            json!({"error": "no results for survey `lunch`"})
        );

        for option in [1, 2, 2] {
            let body = json!({"survey": "lunch", "question": 1, "answerType": "option", "optionId": option});
            assert_eq!(h.send(post_vote(body.to_string())).await.status(), StatusCode::CREATED);
        }
        // Queued but not consumed yet.
        assert_eq!(h.send(results()).await.status(), StatusCode::NOT_FOUND);

        h.drain().await;

        let response = h.send(results()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["survey"], "lunch");
        assert!(body["updatedAt"].is_i64());
        let question = &body["results"][0];
        assert_eq!(question["question"], 1);
        assert_eq!(question["totalVotes"], 3);
        assert_eq!(question["optionResults"][1]["optionId"], 2);
        assert_eq!(question["optionResults"][1]["count"], 2);
    }

    #[tokio::test]
    async fn preflight_allows_posting_json() {
        let h = harness();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/vote")
            .header("origin", "https://example.org")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();

        let response = h.send(request).await;

        assert!(response.status().is_success());
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["access-control-max-age"], "300");
    }
}
