//! Task - role ごとのタスク・スナップショット
//!
//! エンジンから届くスナップショットは常に「全フィールド」を持つ（差分ではない）。
//! 送信側と受信側でカウンタの意味が逆向きなので、`TransferTask` trait で
//! 「完了ブロック数」という共通の単調増加量に揃えてから merge する。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::IntegrityError;
use super::ids::TaskId;
use super::state::{ReceiverStatus, SenderStatus, TaskStatus};

/// 転送の役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// 両 role に共通で、作成後に変わらないフィールド
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMeta {
    pub id: TaskId,
    pub filename: String,
    pub file_size: u64,
    pub block_count: u32,
}

impl TaskMeta {
    pub fn new(id: TaskId, filename: impl Into<String>, file_size: u64, block_count: u32) -> Self {
        Self {
            id,
            filename: filename.into(),
            file_size,
            block_count,
        }
    }

    fn validate(&self) -> Result<(), IntegrityError> {
        if self.block_count == 0 {
            return Err(IntegrityError::ZeroBlockCount { id: self.id });
        }
        Ok(())
    }

    fn check_unchanged(&self, incoming: &TaskMeta) -> Result<(), IntegrityError> {
        let changed = |field: &'static str, stored: String, incoming: String| {
            Err(IntegrityError::ImmutableFieldChanged {
                id: self.id,
                field,
                stored,
                incoming,
            })
        };
        if self.filename != incoming.filename {
            return changed("filename", self.filename.clone(), incoming.filename.clone());
        }
        if self.file_size != incoming.file_size {
            return changed(
                "file_size",
                self.file_size.to_string(),
                incoming.file_size.to_string(),
            );
        }
        if self.block_count != incoming.block_count {
            return changed(
                "block_count",
                self.block_count.to_string(),
                incoming.block_count.to_string(),
            );
        }
        Ok(())
    }
}

/// TransferTask は role ごとのスナップショットが満たす trait
///
/// レジストリと merge はこの trait だけに依存する。
pub trait TransferTask: fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    type Status: TaskStatus;

    const ROLE: Role;

    /// 進捗カウンタのフィールド名（ログ・エラー用）
    const COUNTER_FIELD: &'static str;

    fn meta(&self) -> &TaskMeta;

    fn status(&self) -> Self::Status;

    /// エンジンが報告したカウンタの生の値（remain または done）
    fn counter(&self) -> u32;

    /// 完了ブロック数。正しい配送順では単調非減少。
    fn completed_blocks(&self) -> u32;

    /// 単体での整合性検査と正規化
    fn validate(self) -> Result<Self, IntegrityError>;

    /// 作成後に不変なフィールドが一致しているか
    fn check_immutable(&self, incoming: &Self) -> Result<(), IntegrityError> {
        self.meta().check_unchanged(incoming.meta())
    }

    fn id(&self) -> TaskId {
        self.meta().id
    }

    /// 0.0..=100.0 の進捗率
    fn progress_percent(&self) -> f64 {
        let total = self.meta().block_count;
        debug_assert!(total > 0, "validated tasks always have blocks");
        f64::from(self.completed_blocks()) / f64::from(total) * 100.0
    }
}

fn check_counter(meta: &TaskMeta, field: &'static str, value: u32) -> Result<(), IntegrityError> {
    if value > meta.block_count {
        return Err(IntegrityError::CountOutOfRange {
            id: meta.id,
            field,
            value,
            block_count: meta.block_count,
        });
    }
    Ok(())
}

/// 送信側タスク
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderTask {
    #[serde(flatten)]
    pub meta: TaskMeta,
    /// packets/s の上限（投入時に決まる）
    pub pace_rate: u64,
    /// まだ ack されていないブロック数
    pub remain_block_count: u32,
    pub status: SenderStatus,
}

impl SenderTask {
    /// 初期スナップショット（全ブロック未送信）
    pub fn new(meta: TaskMeta, pace_rate: u64) -> Self {
        let remain_block_count = meta.block_count;
        Self {
            meta,
            pace_rate,
            remain_block_count,
            status: SenderStatus::INITIAL,
        }
    }

    pub fn with_remaining(mut self, remain_block_count: u32) -> Self {
        self.remain_block_count = remain_block_count;
        self
    }

    pub fn with_status(mut self, status: SenderStatus) -> Self {
        self.status = status;
        self
    }
}

impl TransferTask for SenderTask {
    type Status = SenderStatus;

    const ROLE: Role = Role::Sender;
    const COUNTER_FIELD: &'static str = "remain_block_count";

    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn status(&self) -> SenderStatus {
        self.status
    }

    fn counter(&self) -> u32 {
        self.remain_block_count
    }

    fn completed_blocks(&self) -> u32 {
        self.meta.block_count.saturating_sub(self.remain_block_count)
    }

    /// `Done` iff `remain_block_count == 0`。
    /// remain が 0 の `Sending` は `Done` に正規化する。
    fn validate(mut self) -> Result<Self, IntegrityError> {
        self.meta.validate()?;
        if self.pace_rate == 0 {
            return Err(IntegrityError::ZeroPaceRate { id: self.meta.id });
        }
        check_counter(&self.meta, Self::COUNTER_FIELD, self.remain_block_count)?;

        match self.status {
            SenderStatus::Sending if self.remain_block_count == 0 => {
                self.status = SenderStatus::Done;
            }
            SenderStatus::Done if self.remain_block_count != 0 => {
                return Err(IntegrityError::StatusCountMismatch {
                    id: self.meta.id,
                    status: self.status.to_string(),
                    field: Self::COUNTER_FIELD,
                    value: self.remain_block_count,
                    block_count: self.meta.block_count,
                });
            }
            _ => {}
        }
        Ok(self)
    }

    fn check_immutable(&self, incoming: &Self) -> Result<(), IntegrityError> {
        self.meta.check_unchanged(&incoming.meta)?;
        if self.pace_rate != incoming.pace_rate {
            return Err(IntegrityError::ImmutableFieldChanged {
                id: self.meta.id,
                field: "pace_rate",
                stored: self.pace_rate.to_string(),
                incoming: incoming.pace_rate.to_string(),
            });
        }
        Ok(())
    }
}

/// 受信側タスク
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverTask {
    #[serde(flatten)]
    pub meta: TaskMeta,
    /// 復元済みブロック数
    pub done_block_count: u32,
    pub status: ReceiverStatus,
}

impl ReceiverTask {
    /// 初期スナップショット（受信開始直後）
    pub fn new(meta: TaskMeta) -> Self {
        Self {
            meta,
            done_block_count: 0,
            status: ReceiverStatus::INITIAL,
        }
    }

    pub fn with_done(mut self, done_block_count: u32) -> Self {
        self.done_block_count = done_block_count;
        self
    }

    pub fn with_status(mut self, status: ReceiverStatus) -> Self {
        self.status = status;
        self
    }
}

impl TransferTask for ReceiverTask {
    type Status = ReceiverStatus;

    const ROLE: Role = Role::Receiver;
    const COUNTER_FIELD: &'static str = "done_block_count";

    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn status(&self) -> ReceiverStatus {
        self.status
    }

    fn counter(&self) -> u32 {
        self.done_block_count
    }

    fn completed_blocks(&self) -> u32 {
        self.done_block_count
    }

    /// Merging / Done は全ブロック復元済みでなければならない。
    /// Receiving のまま全ブロック揃っている状態は正常（送信側の完了通知待ち）。
    fn validate(self) -> Result<Self, IntegrityError> {
        self.meta.validate()?;
        check_counter(&self.meta, Self::COUNTER_FIELD, self.done_block_count)?;

        let complete = self.done_block_count == self.meta.block_count;
        if self.status != ReceiverStatus::Receiving && !complete {
            return Err(IntegrityError::StatusCountMismatch {
                id: self.meta.id,
                status: self.status.to_string(),
                field: Self::COUNTER_FIELD,
                value: self.done_block_count,
                block_count: self.meta.block_count,
            });
        }
        Ok(self)
    }
}
