//! App - アプリケーション層
//!
//! domain / registry / ports を組み合わせて role ごとの処理を組み立てる。
//!
//! # 主要コンポーネント
//! - **IngestLoop**: イベント経路 → TaskRegistry の唯一の書き込み経路
//! - **CommandInterface**: connect / submit / listen / 証明書生成
//! - **projection**: 表示用の TaskView と件数

pub mod commands;
pub mod ingest_loop;
pub mod projection;

pub use self::commands::{CommandError, CommandInterface};
pub use self::ingest_loop::{IngestLoop, IngestSummary};
pub use self::projection::{RegistryCounts, TaskView, ToView, counts, project};
