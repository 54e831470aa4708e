//! Errors - データ整合性エラー
//!
//! stale なスナップショットの破棄はエラーではない（`MergeOutcome::Rejected`）。
//! ここに置くのは「エンジンが壊れた値を送ってきた」ことを示すものだけで、
//! レジストリの持ち主まで伝播させてログ・カウントに使う。

use thiserror::Error;

use super::ids::TaskId;

/// IntegrityError はスナップショットそのものが不正であることを示す
///
/// どの variant でも、対象レコードは変更されない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{id}: block_count must be at least 1")]
    ZeroBlockCount { id: TaskId },

    #[error("{id}: pace_rate must be at least 1 packet/s")]
    ZeroPaceRate { id: TaskId },

    #[error("{id}: {field}={value} exceeds block_count={block_count}")]
    CountOutOfRange {
        id: TaskId,
        field: &'static str,
        value: u32,
        block_count: u32,
    },

    #[error("{id}: status {status} is inconsistent with {field}={value} (block_count={block_count})")]
    StatusCountMismatch {
        id: TaskId,
        status: String,
        field: &'static str,
        value: u32,
        block_count: u32,
    },

    #[error("{id}: immutable field {field} changed from {stored} to {incoming}")]
    ImmutableFieldChanged {
        id: TaskId,
        field: &'static str,
        stored: String,
        incoming: String,
    },
}

impl IntegrityError {
    /// 対象タスクの ID
    pub fn task_id(&self) -> TaskId {
        match self {
            IntegrityError::ZeroBlockCount { id }
            | IntegrityError::ZeroPaceRate { id }
            | IntegrityError::CountOutOfRange { id, .. }
            | IntegrityError::StatusCountMismatch { id, .. }
            | IntegrityError::ImmutableFieldChanged { id, .. } => *id,
        }
    }
}
