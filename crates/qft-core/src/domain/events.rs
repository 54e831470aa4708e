//! Events - 転送エンジンが push してくるタスクイベント
//!
//! エンジンは `task` イベントとして camelCase の JSON を送ってくる。
//! `uuid` は u128 を 10 進数で表した文字列。
//!
//! ```text
//! sender:   {"filename","fileSize","pps","uuid","blockCount","remainBlockCount","status":"send"|"done"}
//! receiver: {"filename","fileSize","uuid","blockCount","doneBlockCount","status":"recv"|"merge"|"done"}
//! ```
//!
//! ここでは wire 形式とドメインのスナップショットの相互変換だけを行い、
//! 値の検査は merge 側に任せる。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{ParseTaskIdError, TaskId};
use super::state::{ReceiverStatus, SenderStatus};
use super::task::{ReceiverTask, SenderTask, TaskMeta};

/// 送信側のイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderTaskEvent {
    pub filename: String,
    pub file_size: u64,
    pub pps: u64,
    pub uuid: String,
    pub block_count: u32,
    pub remain_block_count: u32,
    pub status: SenderStatus,
}

/// 受信側のイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverTaskEvent {
    pub filename: String,
    pub file_size: u64,
    pub uuid: String,
    pub block_count: u32,
    pub done_block_count: u32,
    pub status: ReceiverStatus,
}

/// イベントのデコード失敗
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("malformed task event: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidId(#[from] ParseTaskIdError),
}

impl TryFrom<SenderTaskEvent> for SenderTask {
    type Error = ParseTaskIdError;

    fn try_from(event: SenderTaskEvent) -> Result<Self, Self::Error> {
        let id: TaskId = event.uuid.parse()?;
        Ok(SenderTask {
            meta: TaskMeta::new(id, event.filename, event.file_size, event.block_count),
            pace_rate: event.pps,
            remain_block_count: event.remain_block_count,
            status: event.status,
        })
    }
}

impl TryFrom<ReceiverTaskEvent> for ReceiverTask {
    type Error = ParseTaskIdError;

    fn try_from(event: ReceiverTaskEvent) -> Result<Self, Self::Error> {
        let id: TaskId = event.uuid.parse()?;
        Ok(ReceiverTask {
            meta: TaskMeta::new(id, event.filename, event.file_size, event.block_count),
            done_block_count: event.done_block_count,
            status: event.status,
        })
    }
}

impl From<&SenderTask> for SenderTaskEvent {
    fn from(task: &SenderTask) -> Self {
        Self {
            filename: task.meta.filename.clone(),
            file_size: task.meta.file_size,
            pps: task.pace_rate,
            uuid: task.meta.id.as_u128().to_string(),
            block_count: task.meta.block_count,
            remain_block_count: task.remain_block_count,
            status: task.status,
        }
    }
}

impl From<&ReceiverTask> for ReceiverTaskEvent {
    fn from(task: &ReceiverTask) -> Self {
        Self {
            filename: task.meta.filename.clone(),
            file_size: task.meta.file_size,
            uuid: task.meta.id.as_u128().to_string(),
            block_count: task.meta.block_count,
            done_block_count: task.done_block_count,
            status: task.status,
        }
    }
}

/// JSON 1 件を送信側スナップショットにデコード
pub fn decode_sender_event(json: &str) -> Result<SenderTask, EventDecodeError> {
    let event: SenderTaskEvent = serde_json::from_str(json)?;
    Ok(SenderTask::try_from(event)?)
}

/// JSON 1 件を受信側スナップショットにデコード
pub fn decode_receiver_event(json: &str) -> Result<ReceiverTask, EventDecodeError> {
    let event: ReceiverTaskEvent = serde_json::from_str(json)?;
    Ok(ReceiverTask::try_from(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sender_event_from_engine() {
        let json = r#"{
            "filename": "movie.mkv",
            "fileSize": 3145728,
            "pps": 20000,
            "uuid": "123456789012345678901234567890",
            "blockCount": 3,
            "remainBlockCount": 2,
            "status": "send"
        }"#;
        let task = decode_sender_event(json).unwrap();
        assert_eq!(task.meta.id, TaskId::from_u128(123456789012345678901234567890));
        assert_eq!(task.meta.filename, "movie.mkv");
        assert_eq!(task.pace_rate, 20000);
        assert_eq!(task.remain_block_count, 2);
        assert_eq!(task.status, SenderStatus::Sending);
    }

    #[test]
    fn decodes_receiver_merge_event() {
        let json = r#"{"filename":"x","fileSize":10,"uuid":"9","blockCount":1,"doneBlockCount":1,"status":"merge"}"#;
        let task = decode_receiver_event(json).unwrap();
        assert_eq!(task.status, ReceiverStatus::Merging);
        assert_eq!(task.done_block_count, 1);
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let json = r#"{"filename":"x","fileSize":10,"uuid":"9","blockCount":1,"doneBlockCount":1,"status":"paused"}"#;
        assert!(matches!(
            decode_receiver_event(json),
            Err(EventDecodeError::Json(_))
        ));
    }

    #[test]
    fn bad_uuid_is_a_decode_error() {
        let json = r#"{"filename":"x","fileSize":10,"pps":1,"uuid":"??","blockCount":1,"remainBlockCount":1,"status":"send"}"#;
        assert!(matches!(
            decode_sender_event(json),
            Err(EventDecodeError::InvalidId(_))
        ));
    }

    #[test]
    fn sender_event_keeps_engine_uuid_format() {
        let meta = TaskMeta::new(TaskId::from_u128(77), "f", 1, 1);
        let event = SenderTaskEvent::from(&SenderTask::new(meta, 5));
        assert_eq!(event.uuid, "77");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["remainBlockCount"], 1);
        assert_eq!(value["status"], "send");
    }
}
