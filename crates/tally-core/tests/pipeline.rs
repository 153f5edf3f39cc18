//! End-to-end pipeline over the in-memory adapters:
//! submit → queue → consume → log → aggregate → read.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tally_core::app::{
    ConsumerConfig, ConsumerGroup, ResultsReader, SubmitError, VoteIntake, VoteProcessor,
    VoteValidator,
};
use tally_core::domain::{
    Answer, Contribution, QuestionKind, QuestionRef, StoreError, SurveyRef, VoteId, VotePayload,
};
use tally_core::impls::{
    InMemoryResultsStore, InMemoryVoteLog, InMemoryVoteQueue, JsonCodec, StaticSurveys,
};
use tally_core::ports::{
    ResultsStore, SystemClock, UlidGenerator, VoteCodec, VoteLog, VotePublisher, VoteSource,
};
use ulid::Ulid;

struct Pipeline {
    surveys: Arc<StaticSurveys>,
    queue: InMemoryVoteQueue,
    log: InMemoryVoteLog,
    results: InMemoryResultsStore,
    intake: VoteIntake,
    processor: VoteProcessor,
    reader: ResultsReader,
}

fn pipeline() -> Pipeline {
    let surveys = Arc::new(StaticSurveys::new().with(SurveyRef::new(
        "S1",
        vec![
            QuestionRef::typed(1, QuestionKind::SingleChoice).with_options([1, 2, 3]),
            QuestionRef::typed(2, QuestionKind::Text),
        ],
    )));
    let queue = InMemoryVoteQueue::new();
    let log = InMemoryVoteLog::new();
    let results = InMemoryResultsStore::new();

    let validator = VoteValidator::new(
        surveys.clone(),
        Arc::new(SystemClock),
        Arc::new(UlidGenerator::new(SystemClock)),
    );
    let intake = VoteIntake::new(
        validator,
        Arc::new(queue.clone()),
        Arc::new(JsonCodec),
        Duration::from_secs(1),
    );
    let processor = VoteProcessor::new(
        Arc::new(log.clone()),
        Arc::new(results.clone()),
        Arc::new(JsonCodec),
        Duration::from_secs(1),
    );
    let reader = ResultsReader::new(Arc::new(results.clone()), Duration::from_secs(1));

    Pipeline {
        surveys,
        queue,
        log,
        results,
        intake,
        processor,
        reader,
    }
}

fn payload(value: serde_json::Value) -> VotePayload {
    serde_json::from_value(value).unwrap()
}

impl Pipeline {
    async fn consume_one(&self) {
        let delivery = self
            .queue
            .next_delivery(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("a queued vote");
        self.processor.process(delivery).await.unwrap();
    }
}

#[tokio::test]
async fn option_vote_flows_to_results() {
    let p = pipeline();

    assert!(matches!(
        p.reader.get("S1").await,
        Err(StoreError::ResultsNotFound(_))
    ));

    let vote = p
        .intake
        .submit(payload(json!({
            "survey": "S1", "question": 1, "answerType": "option", "optionId": 2
        })))
        .await
        .unwrap();
    assert_eq!(p.queue.published().await, 1);
    assert_eq!(p.surveys.calls(), 1);

    p.consume_one().await;

    assert_eq!(p.log.count_by_question("S1").await.unwrap().get(&1), Some(&1));
    let results = p.reader.get("S1").await.unwrap();
    assert_eq!(results.results.len(), 1);
    let q1 = results.question(1).unwrap();
    assert_eq!(q1.total_votes, 1);
    assert_eq!(q1.option_results.len(), 1);
    assert_eq!(q1.option_results[0].option_id, 2);
    assert_eq!(q1.option_results[0].count, 1);
    assert_eq!(results.updated_at, vote.timestamp());
}

#[tokio::test]
async fn unknown_survey_changes_nothing() {
    let p = pipeline();

    let err = p
        .intake
        .submit(payload(json!({
            "survey": "unknown", "question": 1, "answerType": "option", "optionId": 2
        })))
        .await
        .unwrap_err();

    assert!(matches!(err, SubmitError::Invalid(_)));
    assert_eq!(p.queue.published().await, 0);
    assert!(p.log.is_empty().await);
    assert!(matches!(
        p.reader.get("unknown").await,
        Err(StoreError::ResultsNotFound(_))
    ));
}

#[tokio::test]
async fn sequential_votes_are_all_counted() {
    let p = pipeline();
    const N: u64 = 25;

    for i in 0..N {
        p.intake
            .submit(payload(json!({
                "survey": "S1", "question": 1, "answerType": "option", "optionId": 1 + (i % 3)
            })))
            .await
            .unwrap();
        p.consume_one().await;
    }

    let q1 = p.reader.get("S1").await.unwrap().results.remove(0);
    assert_eq!(q1.total_votes, N);
    assert_eq!(q1.option_results.iter().map(|o| o.count).sum::<u64>(), N);
}

#[tokio::test]
async fn crash_before_ack_redelivers_without_double_count() {
    let p = pipeline();
    let vote = p
        .intake
        .submit(payload(json!({
            "survey": "S1", "question": 2, "answerType": "text", "textAnswer": " hello "
        })))
        .await
        .unwrap();

    // A consumer takes the message and dies without acking.
    let lost = p
        .queue
        .next_delivery(Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();
    drop(lost);
    assert_eq!(p.queue.recover_unacked().await, 1);

    p.consume_one().await;
    assert_eq!(p.results.tally("S1", 2).await.unwrap().total_votes, 1);

    // Processed, but the ack never reached the broker: the same message again.
    p.queue
        .publish(JsonCodec.encode_vote(&vote).unwrap())
        .await
        .unwrap();
    p.consume_one().await;

    assert_eq!(p.log.len().await, 1);
    let q2 = p.reader.get("S1").await.unwrap().results.remove(0);
    assert_eq!(q2.total_votes, 1);
    assert_eq!(q2.text_answers[0].answer, "hello");
}

#[tokio::test]
async fn concurrent_upserts_for_one_question_lose_nothing() {
    let results = InMemoryResultsStore::new();
    const N: usize = 200;

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let results = results.clone();
            tokio::spawn(async move {
                let contribution = Contribution {
                    vote_id: VoteId::from_ulid(Ulid::new()),
                    answer: Answer::Option(1 + (i % 3) as u32),
                    at: i as i64,
                };
                results.upsert("S1", 1, &contribution).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let tally = results.tally("S1", 1).await.unwrap();
    assert_eq!(tally.total_votes, N as u64);
    assert_eq!(tally.updated_at, (N - 1) as i64);
}

#[tokio::test]
async fn consumer_group_processes_concurrent_submissions() {
    let p = pipeline();
    const N: u64 = 40;

    for _ in 0..N {
        p.intake
            .submit(payload(json!({
                "survey": "S1", "question": 1, "answerType": "option", "optionId": 3
            })))
            .await
            .unwrap();
    }

    let processor = Arc::new(VoteProcessor::new(
        Arc::new(p.log.clone()),
        Arc::new(p.results.clone()),
        Arc::new(JsonCodec),
        Duration::from_secs(1),
    ));
    let sources = (0..4)
        .map(|_| Arc::new(p.queue.clone()) as Arc<dyn VoteSource>)
        .collect();
    let group = ConsumerGroup::spawn(
        sources,
        processor,
        ConsumerConfig {
            poll_wait: Duration::from_millis(50),
            queue_timeout: Duration::from_millis(50),
            error_backoff: Duration::from_millis(10),
        },
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while p.queue.acked().await < N {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    group.shutdown_and_join().await;

    let q1 = p.reader.get("S1").await.unwrap().results.remove(0);
    assert_eq!(q1.total_votes, N);
    assert_eq!(q1.option_results[0].percentage, 100.0);
}
