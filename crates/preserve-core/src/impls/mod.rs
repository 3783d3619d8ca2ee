//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryRegistry**: 故障注入つきのレジストリ
//! - **InMemoryDatasetRepository**: 呼び出しを記録する永続化
//!
//! 本番用のレジストリクライアントや ORM 実装は別クレートに置きます。

pub mod inmem_registry;
pub mod inmem_repository;

pub use self::inmem_registry::{InMemoryRegistry, StoredContent};
pub use self::inmem_repository::{InMemoryDatasetRepository, SavedDataset};
