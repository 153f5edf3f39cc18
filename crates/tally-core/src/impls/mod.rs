//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の in-process 実装を含めます。
//!
//! # 含まれる実装
//! - **JsonCodec / CodecRegistry**: content-type ごとの codec
//! - **InMemoryVoteQueue**: 開発用の投票キュー（手動 ack、再配送あり）
//! - **InMemoryVoteLog / InMemoryResultsStore**: テスト用のストア
//! - **StaticSurveys**: 固定の survey 定義
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します：
//! - `tally-pg`: PgVoteLog, PgResultsStore
//! - `tally-redis`: RedisVoteQueue
//! - `tally-cli`: HttpSurveyLookup

pub mod codec_registry;
pub mod inmem_queue;
pub mod inmem_store;
pub mod json_codec;
pub mod static_surveys;

// 主要な型を再エクスポート
pub use self::codec_registry::{CodecRegistry, RegistryError};
pub use self::inmem_queue::InMemoryVoteQueue;
pub use self::inmem_store::{InMemoryResultsStore, InMemoryVoteLog};
pub use self::json_codec::{JSON_CONTENT_TYPE, JsonCodec};
pub use self::static_surveys::StaticSurveys;
