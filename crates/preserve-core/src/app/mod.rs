//! App - アプリケーション層
//!
//! ports を組み合わせてプリザベーションの流れを実装します。
//!
//! # 主要コンポーネント
//! - **PreservationManager**: ジョブの受付・一覧・削除・キャンセル
//! - **JobRunner**: 1 ジョブ分のタスクの並行実行と最終保存
//! - **PreservationTask**: マニフェスト / ラベル 1 件の保存
//! - **packaging**: 埋め込みコンテンツの zip 化
//! - **JobStatus**: 進捗表示用ビュー

pub mod config;
pub mod manager;
pub mod packaging;
pub mod runner;
pub mod status;
pub mod task;

// 主要な型を再エクスポート
pub use self::config::{ConfigError, PreservationConfig};
pub use self::manager::PreservationManager;
pub use self::packaging::PreparedUpload;
pub use self::runner::JobRunner;
pub use self::status::{ItemStatus, JobStatus};
pub use self::task::{LabelTask, ManifestTask, PreservationTask};
