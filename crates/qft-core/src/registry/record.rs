//! Task record: a validated snapshot plus bookkeeping.

use chrono::{DateTime, Utc};

use crate::domain::{TaskId, TransferTask};

/// A task as stored by the registry.
///
/// Design:
/// - `task` is always a validated snapshot (block_count >= 1, counters in range).
/// - Timestamps are metadata only; they never take part in merge decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord<T> {
    pub task: T,

    /// When the first snapshot for this id was accepted.
    pub first_seen_at: DateTime<Utc>,

    /// When the last accepted snapshot was applied.
    pub updated_at: DateTime<Utc>,

    /// Number of accepted snapshots after creation.
    pub revisions: u32,
}

impl<T: TransferTask> TaskRecord<T> {
    pub fn new(task: T, now: DateTime<Utc>) -> Self {
        Self {
            task,
            first_seen_at: now,
            updated_at: now,
            revisions: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Replace the snapshot with an accepted newer one.
    pub fn advance(&self, task: T, now: DateTime<Utc>) -> Self {
        Self {
            task,
            first_seen_at: self.first_seen_at,
            updated_at: now,
            revisions: self.revisions + 1,
        }
    }
}
