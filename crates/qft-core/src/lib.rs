//! qft-core
//!
//! Task-state reconciliation for the qft block transfer protocol.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, merge, errors, events, blocks）
//! - **ports**: 抽象化レイヤー（TransferEngine, TrustStore, Clock, IdGenerator）
//! - **registry**: role ごとの TaskRegistry（単調 merge + スナップショット読み取り）
//! - **app**: アプリケーションロジック（ingest_loop, projection, commands）
//! - **impls**: 実装（LoopbackEngine など開発用）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod registry;

pub use config::{ConfigError, QftConfig};
pub use registry::{MergeStats, RegistrySnapshot, TaskRecord, TaskRegistry};

/// sender 側のレジストリ
pub type SenderRegistry = TaskRegistry<domain::SenderTask>;
/// receiver 側のレジストリ
pub type ReceiverRegistry = TaskRegistry<domain::ReceiverTask>;
