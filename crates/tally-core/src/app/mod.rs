//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **VoteValidator**: 構造検証 + survey lookup（1 回）+ id/timestamp 採番
//! - **VoteIntake**: 検証済み投票の publish
//! - **VoteProcessor**: メッセージ 1 件の状態遷移（ログ → 集計 → ack）
//! - **ConsumerGroup**: consumer タスク群と graceful drain
//! - **ResultsReader**: 集計の読み取り
//! - **Auditor**: ログと集計の整合性チェック

pub mod audit;
pub mod consumer;
pub mod intake;
pub mod results;
pub mod validator;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::audit::{AuditReport, Auditor, QuestionAudit};
pub use self::consumer::{ProcessError, Processed, Stage, VoteProcessor};
pub use self::intake::{SubmitError, VoteIntake};
pub use self::results::ResultsReader;
pub use self::validator::VoteValidator;
pub use self::worker_loop::{ConsumerConfig, ConsumerGroup};
