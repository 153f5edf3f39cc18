//! VoteLog port - 追記専用の投票ログ

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{StoreError, Vote};

#[async_trait]
pub trait VoteLog: Send + Sync {
    /// Persists `vote`; `StoreError::DuplicateVote` if its id is already logged.
    async fn append(&self, vote: &Vote) -> Result<(), StoreError>;

    /// Number of logged votes per question of `survey`. Empty when none.
    async fn count_by_question(&self, survey: &str) -> Result<BTreeMap<u32, u64>, StoreError>;
}
