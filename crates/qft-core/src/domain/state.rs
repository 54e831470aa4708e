//! State - 送信側・受信側タスクの状態
//!
//! # 状態遷移
//! 文字列ではなく role ごとの閉じた enum で表現し、遷移表は `can_transition_to`
//! の `match` で静的に網羅します。
//!
//! - sender:   Sending -> Done
//! - receiver: Receiving -> Merging -> Done
//!
//! 同じ状態への「遷移」は常に許可（重複スナップショットは merge 側で判定）。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 状態 enum に共通の振る舞い
pub trait TaskStatus:
    fmt::Debug + fmt::Display + Copy + Eq + Send + Sync + 'static
{
    /// 初期状態
    const INITIAL: Self;

    /// 定義順での位置（後退判定に使う）
    fn rank(self) -> u8;

    /// 終端状態か
    fn is_terminal(self) -> bool;

    /// 遷移表に `self -> next` があるか（自己遷移を含む）
    fn can_transition_to(self, next: Self) -> bool;

    /// `next` が定義順で後退しているか
    fn is_regression_to(self, next: Self) -> bool {
        next.rank() < self.rank()
    }
}

/// SenderStatus は送信タスクの状態
///
/// `Done` iff `remain_block_count == 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderStatus {
    /// ブロック送信中（相手の ack 待ちを含む）
    #[serde(rename = "send")]
    Sending,
    /// 全ブロックが ack 済み
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus for SenderStatus {
    const INITIAL: Self = SenderStatus::Sending;

    fn rank(self) -> u8 {
        match self {
            SenderStatus::Sending => 0,
            SenderStatus::Done => 1,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, SenderStatus::Done)
    }

    fn can_transition_to(self, next: Self) -> bool {
        use SenderStatus::*;
        matches!(
            (self, next),
            (Sending, Sending) | (Sending, Done) | (Done, Done)
        )
    }
}

impl fmt::Display for SenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderStatus::Sending => f.write_str("sending"),
            SenderStatus::Done => f.write_str("done"),
        }
    }
}

/// ReceiverStatus は受信タスクの状態
///
/// - Receiving: ブロック受信・復元中
/// - Merging: 全ブロック復元済み、ファイル結合の完了待ち
/// - Done: 結合完了（終端）
///
/// Receiving から Done へ直接飛ぶ遷移は存在しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiverStatus {
    #[serde(rename = "recv")]
    Receiving,
    #[serde(rename = "merge")]
    Merging,
    #[serde(rename = "done")]
    Done,
}

impl TaskStatus for ReceiverStatus {
    const INITIAL: Self = ReceiverStatus::Receiving;

    fn rank(self) -> u8 {
        match self {
            ReceiverStatus::Receiving => 0,
            ReceiverStatus::Merging => 1,
            ReceiverStatus::Done => 2,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, ReceiverStatus::Done)
    }

    fn can_transition_to(self, next: Self) -> bool {
        use ReceiverStatus::*;
        matches!(
            (self, next),
            (Receiving, Receiving)
                | (Receiving, Merging)
                | (Merging, Merging)
                | (Merging, Done)
                | (Done, Done)
        )
    }
}

impl fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverStatus::Receiving => f.write_str("receiving"),
            ReceiverStatus::Merging => f.write_str("merging"),
            ReceiverStatus::Done => f.write_str("done"),
        }
    }
}
