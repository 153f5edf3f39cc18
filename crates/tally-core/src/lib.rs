//! tally-core
//!
//! Core building blocks for the tally vote pipeline: a submission is
//! validated against the survey service, durably queued, consumed, appended
//! to the vote log and folded into per-question results.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, vote, survey, results, errors）
//! - **ports**: 抽象化レイヤー（SurveyLookup, VotePublisher/VoteSource, VoteLog, ResultsStore, VoteCodec, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（validator, intake, consumer, worker_loop, results, audit）
//! - **impls**: 実装（JsonCodec, CodecRegistry, InMemory* など開発・テスト用）
//! - **retry**: 外向き呼び出しのリトライポリシー
//!
//! Postgres と Redis の実装はそれぞれ `tally-pg`, `tally-redis` にある。

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod retry;
