//! tally-pg
//!
//! Postgres implementations of the vote log and results store ports.
//!
//! # テーブル
//! - `{votes}`: 追記専用の投票ログ（id が主キー、重複は DuplicateVote）
//! - `{results}`: (survey, question) ごとの投票数と最終更新
//! - `{results}_buckets`: 選択肢・評価値・テキスト・日付ごとのカウント
//! - `{results}_applied`: 集計済み vote id（再配送での二重計上防止）

mod error;
pub mod log;
pub mod results;
pub mod schema;
pub mod settings;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tally_core::domain::StoreError;

pub use self::log::PgVoteLog;
pub use self::results::PgResultsStore;
pub use self::schema::init_schema;
pub use self::settings::{PgSettings, TableNameError, Tables};

pub async fn connect(settings: &PgSettings) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(settings.pool_size)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&settings.url)
        .await
        .map_err(error::backend)
}
