//! InMemoryVoteLog / InMemoryResultsStore - 開発・テスト用のストア
//!
//! 集計の read-modify-write は 1 つの Mutex の中で完結させる
//! （ロックを跨いで await しない）。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Contribution, QuestionTally, StoreError, SurveyResults, Vote, VoteId};
use crate::ports::{ResultsStore, UpsertOutcome, VoteLog};

#[derive(Clone, Default)]
pub struct InMemoryVoteLog {
    votes: Arc<Mutex<HashMap<VoteId, Vote>>>,
}

impl InMemoryVoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.votes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.votes.lock().await.is_empty()
    }

    pub async fn get(&self, id: VoteId) -> Option<Vote> {
        self.votes.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl VoteLog for InMemoryVoteLog {
    async fn append(&self, vote: &Vote) -> Result<(), StoreError> {
        let mut votes = self.votes.lock().await;
        if votes.contains_key(&vote.id()) {
            return Err(StoreError::DuplicateVote(vote.id()));
        }
        votes.insert(vote.id(), vote.clone());
        Ok(())
    }

    async fn count_by_question(&self, survey: &str) -> Result<BTreeMap<u32, u64>, StoreError> {
        let votes = self.votes.lock().await;
        let mut counts = BTreeMap::new();
        for vote in votes.values().filter(|v| v.survey() == survey) {
            *counts.entry(vote.question()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Default)]
struct ResultsState {
    tallies: HashMap<(String, u32), QuestionTally>,
    applied: HashSet<VoteId>,
}

#[derive(Clone, Default)]
pub struct InMemoryResultsStore {
    state: Arc<Mutex<ResultsState>>,
}

impl InMemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tally(&self, survey: &str, question: u32) -> Option<QuestionTally> {
        let state = self.state.lock().await;
        state.tallies.get(&(survey.to_string(), question)).cloned()
    }
}

#[async_trait]
impl ResultsStore for InMemoryResultsStore {
    async fn upsert(
        &self,
        survey: &str,
        question: u32,
        contribution: &Contribution,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if !state.applied.insert(contribution.vote_id) {
            return Ok(UpsertOutcome::AlreadyApplied);
        }

        let key = (survey.to_string(), question);
        let outcome = if state.tallies.contains_key(&key) {
            UpsertOutcome::Incremented
        } else {
            UpsertOutcome::Created
        };
        state
            .tallies
            .entry(key)
            .or_insert_with(|| QuestionTally::new(question))
            .apply(contribution);
        Ok(outcome)
    }

    async fn get_results(&self, survey: &str) -> Result<SurveyResults, StoreError> {
        let state = self.state.lock().await;
        let tallies: Vec<_> = state
            .tallies
            .iter()
            .filter(|((s, _), _)| s == survey)
            .map(|(_, t)| t.clone())
            .collect();
        if tallies.is_empty() {
            return Err(StoreError::ResultsNotFound(survey.to_string()));
        }
        Ok(SurveyResults::from_tallies(survey, tallies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Answer;
    use ulid::Ulid;

    fn vote(survey: &str, question: u32) -> Vote {
        Vote::new(
            VoteId::from_ulid(Ulid::new()),
            survey,
            question,
            Answer::Option(1),
            100,
            None,
        )
    }

    #[tokio::test]
    async fn second_append_of_same_id_is_duplicate() {
        let log = InMemoryVoteLog::new();
        let v = vote("S1", 1);

        log.append(&v).await.unwrap();
        let err = log.append(&v).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateVote(id) if id == v.id()));
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn counts_by_question_for_one_survey() {
        let log = InMemoryVoteLog::new();
        for v in [vote("S1", 1), vote("S1", 1), vote("S1", 2), vote("S2", 1)] {
            log.append(&v).await.unwrap();
        }
        assert_eq!(
            log.count_by_question("S1").await.unwrap(),
            BTreeMap::from([(1, 2), (2, 1)])
        );
        assert!(log.count_by_question("S3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_creates_then_increments_then_dedupes() {
        let store = InMemoryResultsStore::new();
        let first = Contribution::from_vote(&vote("S1", 1));
        let second = Contribution::from_vote(&vote("S1", 1));

        assert_eq!(store.upsert("S1", 1, &first).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert("S1", 1, &second).await.unwrap(), UpsertOutcome::Incremented);
        assert_eq!(
            store.upsert("S1", 1, &first).await.unwrap(),
            UpsertOutcome::AlreadyApplied
        );
        assert_eq!(store.tally("S1", 1).await.unwrap().total_votes, 2);
    }

    #[tokio::test]
    async fn longest_text_answer_is_counted_and_read_back() {
        let store = InMemoryResultsStore::new();
        let text = "票".repeat(crate::domain::MAX_TEXT_ANSWER_CHARS);
        for _ in 0..2 {
            let v = Vote::new(
                VoteId::from_ulid(Ulid::new()),
                "S1",
                3,
                Answer::Text(text.clone()),
                100,
                None,
            );
            store.upsert("S1", 3, &Contribution::from_vote(&v)).await.unwrap();
        }

        let results = store.get_results("S1").await.unwrap();
        let q3 = results.question(3).unwrap();
        assert_eq!(q3.total_votes, 2);
        assert_eq!(q3.text_answers.len(), 1);
        assert_eq!(q3.text_answers[0].answer, text);
        assert_eq!(q3.text_answers[0].count, 2);
    }

    #[tokio::test]
    async fn unknown_survey_has_no_results() {
        let store = InMemoryResultsStore::new();
        let err = store.get_results("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::ResultsNotFound(s) if s == "nope"));
    }
}
