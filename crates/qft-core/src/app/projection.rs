//! Projection - 表示層に渡す読み取り専用ビュー
//!
//! 進捗率などの派生値はここで計算し、レジストリには保存しない。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{ReceiverTask, Role, SenderTask, TaskId, TaskStatus, TransferTask};
use crate::registry::{RegistrySnapshot, TaskRecord};

/// TaskView は 1 タスク分の表示行
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub role: Role,
    pub filename: String,
    pub file_size: u64,
    pub block_count: u32,
    pub completed_blocks: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remain_block_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_block_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace_rate: Option<u64>,
    pub status: String,
    pub finished: bool,
    pub progress_percent: f64,
    pub updated_at: DateTime<Utc>,
}

/// role ごとの固有フィールドを TaskView に載せる
pub trait ToView: TransferTask {
    fn fill_view(&self, view: &mut TaskView);
}

impl ToView for SenderTask {
    fn fill_view(&self, view: &mut TaskView) {
        view.remain_block_count = Some(self.remain_block_count);
        view.pace_rate = Some(self.pace_rate);
    }
}

impl ToView for ReceiverTask {
    fn fill_view(&self, view: &mut TaskView) {
        view.done_block_count = Some(self.done_block_count);
    }
}

impl TaskView {
    pub fn from_record<T: ToView>(record: &TaskRecord<T>) -> Self {
        let task = &record.task;
        let meta = task.meta();
        let status = task.status();
        let mut view = TaskView {
            id: meta.id,
            role: T::ROLE,
            filename: meta.filename.clone(),
            file_size: meta.file_size,
            block_count: meta.block_count,
            completed_blocks: task.completed_blocks(),
            remain_block_count: None,
            done_block_count: None,
            pace_rate: None,
            status: status.to_string(),
            finished: status.is_terminal(),
            progress_percent: task.progress_percent(),
            updated_at: record.updated_at,
        };
        task.fill_view(&mut view);
        view
    }
}

/// 作成順のビュー一覧
pub fn project<T: ToView>(snapshot: &RegistrySnapshot<T>) -> Vec<TaskView> {
    snapshot.iter().map(TaskView::from_record).collect()
}

/// RegistryCounts は状態ごとの件数（ステータス行用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCounts {
    pub total: usize,
    pub finished: usize,
    pub by_status: BTreeMap<String, usize>,
}

pub fn counts<T: TransferTask>(snapshot: &RegistrySnapshot<T>) -> RegistryCounts {
    let mut counts = RegistryCounts::default();
    for record in snapshot.iter() {
        let status = record.task.status();
        counts.total += 1;
        if status.is_terminal() {
            counts.finished += 1;
        }
        *counts.by_status.entry(status.to_string()).or_default() += 1;
    }
    counts
}
