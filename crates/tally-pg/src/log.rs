//! PgVoteLog - 追記専用の投票ログ（Postgres）

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::backend;
use crate::settings::Tables;
use tally_core::domain::{StoreError, Vote};
use tally_core::ports::VoteLog;

pub struct PgVoteLog {
    pool: PgPool,
    insert_sql: String,
    count_sql: String,
}

impl PgVoteLog {
    pub fn new(pool: PgPool, tables: &Tables) -> Self {
        let votes = tables.votes();
        Self {
            pool,
            insert_sql: format!(
                r#"
                INSERT INTO {votes} (id, survey, question, created, answer_type, answer, user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#
            ),
            count_sql: format!(
                "SELECT question, COUNT(*) AS n FROM {votes} WHERE survey = $1 GROUP BY question"
            ),
        }
    }
}

#[async_trait]
impl VoteLog for PgVoteLog {
    async fn append(&self, vote: &Vote) -> Result<(), StoreError> {
        let answer = serde_json::to_value(vote.answer())
            .map_err(|e| StoreError::Backend(format!("cannot encode answer: {e}")))?;

        let inserted = sqlx::query(&self.insert_sql)
            .bind(vote.id().to_string())
            .bind(vote.survey())
            .bind(i64::from(vote.question()))
            .bind(vote.timestamp())
            .bind(vote.answer().answer_type().as_str())
            .bind(answer)
            .bind(vote.user_id())
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        if inserted == 0 {
            return Err(StoreError::DuplicateVote(vote.id()));
        }
        Ok(())
    }

    async fn count_by_question(&self, survey: &str) -> Result<BTreeMap<u32, u64>, StoreError> {
        let rows = sqlx::query(&self.count_sql)
            .bind(survey)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let question: i64 = row.try_get("question").map_err(backend)?;
            let n: i64 = row.try_get("n").map_err(backend)?;
            let question = u32::try_from(question)
                .map_err(|_| StoreError::Backend(format!("question id {question} out of range")))?;
            counts.insert(question, n.max(0) as u64);
        }
        Ok(counts)
    }
}
