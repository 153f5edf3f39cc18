//! PgResultsStore - 質問ごとの集計（Postgres）
//!
//! # 更新（1 トランザクション）
//! 1. `{results}_applied` に vote id を INSERT ... ON CONFLICT DO NOTHING。
//!    0 行なら適用済みなので何もしない
//! 2. `{results}` を `votes = votes + 1` の単一文 upsert で加算
//! 3. 各バケットを同じく単一文 upsert で加算（デッドロック回避のため順序固定）。
//!    キーは `md5(bucket)`、テキスト本体はインデックスに載せない
//!
//! 事前の SELECT がないので、同じ (survey, question) への同時更新でも
//! 加算は失われない。
//!
//! # 読み出し
//! REPEATABLE READ の読み取り専用トランザクションで集計行とバケットを読み、
//! QuestionTally に畳み込む。

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::error::backend;
use crate::settings::Tables;
use tally_core::domain::{Bucket, Contribution, QuestionTally, StoreError, SurveyResults};
use tally_core::ports::{ResultsStore, UpsertOutcome};

struct Statements {
    mark_applied: String,
    bump_total: String,
    bump_bucket: String,
    select_totals: String,
    select_buckets: String,
}

pub struct PgResultsStore {
    pool: PgPool,
    sql: Statements,
}

impl PgResultsStore {
    pub fn new(pool: PgPool, tables: &Tables) -> Self {
        let results = tables.results();
        let buckets = tables.buckets();
        let applied = tables.applied();
        let sql = Statements {
            mark_applied: format!(
                r#"
                INSERT INTO {applied} (vote_id, survey, question)
                VALUES ($1, $2, $3)
                ON CONFLICT (vote_id) DO NOTHING
                "#
            ),
            bump_total: format!(
                r#"
                INSERT INTO {results} (survey, question, votes, last_update)
                VALUES ($1, $2, 1, $3)
                ON CONFLICT (survey, question) DO UPDATE
                SET votes = {results}.votes + 1,
                    last_update = GREATEST({results}.last_update, EXCLUDED.last_update)
                RETURNING votes
                "#
            ),
            bump_bucket: format!(
                r#"
                INSERT INTO {buckets} (survey, question, kind, bucket_key, bucket, count)
                VALUES ($1, $2, $3, md5($4), $4, 1)
                ON CONFLICT (survey, question, kind, bucket_key) DO UPDATE
                SET count = {buckets}.count + 1
                "#
            ),
            select_totals: format!(
                "SELECT question, votes, last_update FROM {results} WHERE survey = $1"
            ),
            select_buckets: format!(
                "SELECT question, kind, bucket, count FROM {buckets} WHERE survey = $1"
            ),
        };
        Self { pool, sql }
    }
}

fn question_from_row(raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Backend(format!("question id {raw} out of range")))
}

#[async_trait]
impl ResultsStore for PgResultsStore {
    async fn upsert(
        &self,
        survey: &str,
        question: u32,
        contribution: &Contribution,
    ) -> Result<UpsertOutcome, StoreError> {
        let question = i64::from(question);
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let fresh = sqlx::query(&self.sql.mark_applied)
            .bind(contribution.vote_id.to_string())
            .bind(survey)
            .bind(question)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();
        if fresh == 0 {
            tx.rollback().await.map_err(backend)?;
            return Ok(UpsertOutcome::AlreadyApplied);
        }

        let votes: i64 = sqlx::query(&self.sql.bump_total)
            .bind(survey)
            .bind(question)
            .bind(contribution.at)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?
            .try_get("votes")
            .map_err(backend)?;

        let mut buckets = contribution.buckets();
        buckets.sort();
        buckets.dedup();
        for bucket in &buckets {
            sqlx::query(&self.sql.bump_bucket)
                .bind(survey)
                .bind(question)
                .bind(bucket.kind())
                .bind(bucket.key())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;

        Ok(if votes == 1 {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Incremented
        })
    }

    async fn get_results(&self, survey: &str) -> Result<SurveyResults, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let totals = sqlx::query(&self.sql.select_totals)
            .bind(survey)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;
        if totals.is_empty() {
            return Err(StoreError::ResultsNotFound(survey.to_string()));
        }
        let bucket_rows = sqlx::query(&self.sql.select_buckets)
            .bind(survey)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        let mut tallies = BTreeMap::new();
        for row in totals {
            let question = question_from_row(row.try_get("question").map_err(backend)?)?;
            let votes: i64 = row.try_get("votes").map_err(backend)?;
            let last_update: i64 = row.try_get("last_update").map_err(backend)?;
            tallies.insert(
                question,
                QuestionTally {
                    total_votes: votes.max(0) as u64,
                    updated_at: last_update,
                    ..QuestionTally::new(question)
                },
            );
        }

        for row in bucket_rows {
            let question = question_from_row(row.try_get("question").map_err(backend)?)?;
            let kind: String = row.try_get("kind").map_err(backend)?;
            let key: String = row.try_get("bucket").map_err(backend)?;
            let count: i64 = row.try_get("count").map_err(backend)?;

            let Some(tally) = tallies.get_mut(&question) else {
                continue;
            };
            match Bucket::parse(&kind, &key) {
                Some(bucket) => tally.add_bucket(bucket, count.max(0) as u64),
                None => warn!(survey, question, %kind, %key, "skipping unknown result bucket"),
            }
        }

        Ok(SurveyResults::from_tallies(survey, tallies.into_values()))
    }
}
