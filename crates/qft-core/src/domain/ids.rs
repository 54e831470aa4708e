//! Domain identifiers.
//!
//! # TaskId
//! 転送エンジンが払い出す 128-bit の識別子をそのまま保持します。
//! 内部表現は ULID ですが、エンジン側の表記（10 進数の u128、ハイフン付き UUID）
//! からもパースできます。ULID の文字列は `task-` 付きのときだけ受け付けます
//! （数字だけの ULID は 10 進数と区別できないため）。
//!
//! - **不変**: 一度払い出された ID は変わらない
//! - **唯一のキー**: レジストリはこの ID だけでタスクを同定する

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const PREFIX: &str = "task-";

/// Identifier of a transfer task (shared by sender and receiver).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(Ulid);

impl TaskId {
    /// ULID から TaskId を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// エンジンが返す u128（UUID の数値表現）から作成
    pub fn from_u128(value: u128) -> Self {
        Self(Ulid::from(value))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    pub fn as_u128(&self) -> u128 {
        self.0.into()
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX, self.0)
    }
}

/// TaskId のパース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task id: {0:?}")]
pub struct ParseTaskIdError(pub String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    /// 受け付ける表記:
    /// - `task-<ULID>`（Display の出力）
    /// - 10 進数の u128（旧エンジンの `uuid` フィールド）
    /// - ハイフン付き / なしの 16 進 UUID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Some(body) = raw.strip_prefix(PREFIX) {
            return Ulid::from_string(body)
                .map(Self::from_ulid)
                .map_err(|_| ParseTaskIdError(s.to_string()));
        }

        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw
                .parse::<u128>()
                .map(Self::from_u128)
                .map_err(|_| ParseTaskIdError(s.to_string()));
        }

        let hex: String = raw.chars().filter(|c| *c != '-').collect();
        if hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return u128::from_str_radix(&hex, 16)
                .map(Self::from_u128)
                .map_err(|_| ParseTaskIdError(s.to_string()));
        }

        Err(ParseTaskIdError(s.to_string()))
    }
}

impl TryFrom<String> for TaskId {
    type Error = ParseTaskIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}
