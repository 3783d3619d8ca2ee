//! preserve-core
//!
//! Core building blocks for preserving datasets into an external registry.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, items, registry records, results, job, errors）
//! - **ports**: 抽象化レイヤー（Registry, DatasetRepository, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（manager, runner, tasks, packaging, config, status）
//! - **impls**: 実装（InMemoryRegistry など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{JobStatus, PreservationConfig, PreservationManager};
pub use domain::{Dataset, DatasetLabel, FormItem, PreservationError, PreservationJob};
