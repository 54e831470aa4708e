//! Merge - スナップショットの単調 merge
//!
//! イベント経路は順序も exactly-once も保証しない。重複・順序入れ替わりが
//! 起きても表示上の進捗が巻き戻らないよう、merge は冪等かつ単調にする。
//!
//! # 判定順
//! 1. 単体の整合性（`TransferTask::validate`）… 失敗は `IntegrityError`
//! 2. 不変フィールドの一致 … 失敗は `IntegrityError`
//! 3. 状態の後退 / 遷移表にない遷移 … `Rejected`
//! 4. 完了ブロック数の後退 … `Rejected`
//! 5. 保存値と同一 … `Rejected(Duplicate)`
//!
//! 判定はスナップショット単位で all-or-nothing。

use serde::Serialize;
use std::fmt;

use super::errors::IntegrityError;
use super::state::TaskStatus;
use super::task::TransferTask;

/// upsert の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// 初観測。末尾に追加された
    Created,
    /// 既存レコードを前進させた
    Updated,
    /// 破棄した（エラーではない）
    Rejected(RejectReason),
}

impl MergeOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, MergeOutcome::Rejected(_))
    }
}

/// RejectReason は stale / 重複スナップショットを破棄した理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// 保存済みの値と同一
    Duplicate,
    /// 進捗カウンタが後退している
    StaleProgress {
        field: &'static str,
        stored: u32,
        incoming: u32,
    },
    /// 状態が定義順で後退している
    StatusRegression { from: String, to: String },
    /// 前進だが遷移表にない（例: Receiving -> Done）
    SkippedTransition { from: String, to: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Duplicate => f.write_str("duplicate snapshot"),
            RejectReason::StaleProgress {
                field,
                stored,
                incoming,
            } => write!(f, "stale {field}: stored={stored} incoming={incoming}"),
            RejectReason::StatusRegression { from, to } => {
                write!(f, "status regression {from} -> {to}")
            }
            RejectReason::SkippedTransition { from, to } => {
                write!(f, "transition {from} -> {to} is not allowed")
            }
        }
    }
}

/// 既存レコードに対する merge の判定
#[derive(Debug, Clone, PartialEq)]
pub enum Merge<T> {
    /// この値で置き換える
    Apply(T),
    Reject(RejectReason),
}

/// 保存済みの `stored` に `incoming` を merge した結果を返す
///
/// `stored` は validate 済みであること（レジストリ内のレコードは常にそう）。
pub fn merge<T: TransferTask>(stored: &T, incoming: T) -> Result<Merge<T>, IntegrityError> {
    let incoming = incoming.validate()?;
    stored.check_immutable(&incoming)?;

    let from = stored.status();
    let to = incoming.status();
    if from.is_regression_to(to) {
        return Ok(Merge::Reject(RejectReason::StatusRegression {
            from: from.to_string(),
            to: to.to_string(),
        }));
    }
    if !from.can_transition_to(to) {
        return Ok(Merge::Reject(RejectReason::SkippedTransition {
            from: from.to_string(),
            to: to.to_string(),
        }));
    }

    if incoming.completed_blocks() < stored.completed_blocks() {
        return Ok(Merge::Reject(RejectReason::StaleProgress {
            field: T::COUNTER_FIELD,
            stored: stored.counter(),
            incoming: incoming.counter(),
        }));
    }

    if incoming == *stored {
        return Ok(Merge::Reject(RejectReason::Duplicate));
    }

    Ok(Merge::Apply(incoming))
}
