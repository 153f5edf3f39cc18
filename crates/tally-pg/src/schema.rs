//! Schema - テーブル作成（冪等）

use sqlx::PgPool;
use tracing::info;

use crate::error::backend;
use crate::settings::Tables;
use tally_core::domain::StoreError;

/// Creates the vote log and aggregate tables if they do not exist yet.
///
/// Bucket rows are keyed by `md5(bucket)`: a text answer may be far larger
/// than a btree index row allows, so the full value is stored unindexed.
pub async fn init_schema(pool: &PgPool, tables: &Tables) -> Result<(), StoreError> {
    let votes = tables.votes();
    let results = tables.results();
    let buckets = tables.buckets();
    let applied = tables.applied();

    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {votes} (
                id TEXT PRIMARY KEY,
                survey TEXT NOT NULL,
                question BIGINT NOT NULL,
                created BIGINT NOT NULL,
                answer_type TEXT NOT NULL,
                answer JSONB NOT NULL,
                user_id TEXT
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS {votes}_survey_question_idx ON {votes} (survey, question)"),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {results} (
                survey TEXT NOT NULL,
                question BIGINT NOT NULL,
                votes BIGINT NOT NULL,
                last_update BIGINT NOT NULL,
                PRIMARY KEY (survey, question)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {buckets} (
                survey TEXT NOT NULL,
                question BIGINT NOT NULL,
                kind TEXT NOT NULL,
                bucket_key TEXT NOT NULL,
                bucket TEXT NOT NULL,
                count BIGINT NOT NULL,
                PRIMARY KEY (survey, question, kind, bucket_key)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {applied} (
                vote_id TEXT PRIMARY KEY,
                survey TEXT NOT NULL,
                question BIGINT NOT NULL
            )
            "#
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await.map_err(backend)?;
    }

    info!(%votes, %results, "schema ready");
    Ok(())
}
