//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（PostgreSQL, Redis, survey service など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - PostgreSQL が source of truth（投票ログと集計）
//! - Redis Streams は永続投票キュー（at-least-once、手動 ack）
//! - survey service は読み取り専用の外部依存

pub mod clock;
pub mod codec;
pub mod id_generator;
pub mod results_store;
pub mod survey_lookup;
pub mod vote_log;
pub mod vote_queue;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::VoteCodec;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::results_store::{ResultsStore, UpsertOutcome};
pub use self::survey_lookup::SurveyLookup;
pub use self::vote_log::VoteLog;
pub use self::vote_queue::{Delivery, VotePublisher, VoteSource};
