//! Task registry: the locally-authoritative, ordered view of one role's tasks.
//!
//! Scheduling model:
//! - exactly one writer (the ingest loop) calls `upsert`
//! - any number of readers call `get` / `list` / `snapshot`
//!
//! Readers see the last committed state. The state lives behind
//! `RwLock<Arc<..>>`: a reader clones the `Arc` and drops the lock at once, the
//! writer computes the merge outside the lock and only swaps the record in a
//! short write section (copy-on-write via `Arc::make_mut`).

mod record;

pub use record::TaskRecord;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, trace};

use crate::domain::{IntegrityError, Merge, MergeOutcome, TaskId, TransferTask, merge};
use crate::ports::{Clock, SystemClock};

/// Immutable, ordered state of a registry at one point in time.
#[derive(Debug)]
pub struct RegistrySnapshot<T> {
    records: Vec<Arc<TaskRecord<T>>>,
    index: HashMap<TaskId, usize>,
}

impl<T> Clone for RegistrySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T> Default for RegistrySnapshot<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> RegistrySnapshot<T> {
    pub fn get(&self, id: TaskId) -> Option<&TaskRecord<T>> {
        self.index.get(&id).map(|&pos| self.records[pos].as_ref())
    }

    /// Records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord<T>> {
        self.records.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Counters of upsert outcomes, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub created: u64,
    pub updated: u64,
    pub rejected: u64,
    pub integrity_errors: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    created: AtomicU64,
    updated: AtomicU64,
    rejected: AtomicU64,
    integrity_errors: AtomicU64,
}

impl StatCounters {
    fn record(&self, result: &Result<MergeOutcome, IntegrityError>) {
        let counter = match result {
            Ok(MergeOutcome::Created) => &self.created,
            Ok(MergeOutcome::Updated) => &self.updated,
            Ok(MergeOutcome::Rejected(_)) => &self.rejected,
            Err(_) => &self.integrity_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> MergeStats {
        MergeStats {
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            integrity_errors: self.integrity_errors.load(Ordering::Relaxed),
        }
    }
}

enum Pending<T> {
    Insert(TaskRecord<T>),
    Replace(usize, TaskRecord<T>),
}

/// Ordered registry of one role's tasks (sender or receiver).
///
/// Records are never removed; a record's position never changes once created.
pub struct TaskRegistry<T> {
    state: RwLock<Arc<RegistrySnapshot<T>>>,
    /// Serializes writers so the merge can be computed outside `state`'s lock.
    writer: Mutex<()>,
    clock: Arc<dyn Clock>,
    stats: StatCounters,
}

impl<T: TransferTask> TaskRegistry<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(Arc::new(RegistrySnapshot::default())),
            writer: Mutex::new(()),
            clock,
            stats: StatCounters::default(),
        }
    }

    /// Merge one engine snapshot.
    ///
    /// - unknown id: validated and appended (`Created`)
    /// - known id: merged monotonically in place (`Updated` / `Rejected`)
    /// - invalid snapshot or immutable-field mismatch: `Err`, registry unchanged
    pub fn upsert(&self, incoming: T) -> Result<MergeOutcome, IntegrityError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = self.upsert_locked(incoming);
        self.stats.record(&result);
        result
    }

    fn upsert_locked(&self, incoming: T) -> Result<MergeOutcome, IntegrityError> {
        let id = incoming.id();
        let current = self.snapshot();
        let now = self.clock.now();

        let (pending, outcome) = match current.index.get(&id) {
            None => {
                let task = incoming.validate()?;
                debug!(
                    event = "task_created",
                    role = %T::ROLE,
                    task_id = %id,
                    status = %task.status(),
                    blocks = task.meta().block_count,
                    "New task observed"
                );
                (Pending::Insert(TaskRecord::new(task, now)), MergeOutcome::Created)
            }
            Some(&pos) => {
                let stored = &current.records[pos];
                match merge(&stored.task, incoming)? {
                    Merge::Apply(task) => {
                        trace!(
                            event = "task_updated",
                            role = %T::ROLE,
                            task_id = %id,
                            status = %task.status(),
                            completed = task.completed_blocks(),
                        );
                        (
                            Pending::Replace(pos, stored.advance(task, now)),
                            MergeOutcome::Updated,
                        )
                    }
                    Merge::Reject(reason) => {
                        debug!(
                            event = "task_snapshot_rejected",
                            role = %T::ROLE,
                            task_id = %id,
                            reason = %reason,
                            "Discarded stale task snapshot"
                        );
                        return Ok(MergeOutcome::Rejected(reason));
                    }
                }
            }
        };
        drop(current);

        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let state = Arc::make_mut(&mut *guard);
        match pending {
            Pending::Insert(record) => {
                state.index.insert(id, state.records.len());
                state.records.push(Arc::new(record));
            }
            Pending::Replace(pos, record) => {
                state.records[pos] = Arc::new(record);
            }
        }
        Ok(outcome)
    }

    /// The last committed state. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot<T>> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRecord<T>> {
        self.snapshot().get(id).cloned()
    }

    /// All records in creation order.
    pub fn list(&self) -> Vec<TaskRecord<T>> {
        self.snapshot().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats.load()
    }
}

impl<T: TransferTask> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ReceiverStatus, ReceiverTask, RejectReason, SenderStatus, SenderTask, TaskMeta,
        TaskStatus,
    };
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    fn sender(id: u128, remain: u32) -> SenderTask {
        let meta = TaskMeta::new(TaskId::from_u128(id), format!("file-{id}"), 10 << 20, 10);
        SenderTask::new(meta, 2000).with_remaining(remain)
    }

    fn receiver(id: u128, done: u32, status: ReceiverStatus) -> ReceiverTask {
        let meta = TaskMeta::new(TaskId::from_u128(id), "photo.raw", 4 << 20, 4);
        ReceiverTask::new(meta).with_done(done).with_status(status)
    }

    #[test]
    fn sender_scenario_rejects_stale_update() {
        let registry = TaskRegistry::new();
        let t1 = TaskId::from_u128(1);

        assert_eq!(registry.upsert(sender(1, 10)).unwrap(), MergeOutcome::Created);
        assert_eq!(registry.upsert(sender(1, 6)).unwrap(), MergeOutcome::Updated);

        let stale = registry.upsert(sender(1, 8)).unwrap();
        assert!(matches!(
            stale,
            MergeOutcome::Rejected(RejectReason::StaleProgress { stored: 6, incoming: 8, .. })
        ));
        assert_eq!(registry.get(t1).unwrap().task.remain_block_count, 6);

        assert_eq!(registry.upsert(sender(1, 0)).unwrap(), MergeOutcome::Updated);
        let done = registry.get(t1).unwrap().task;
        assert_eq!(done.remain_block_count, 0);
        assert_eq!(done.status, SenderStatus::Done);
    }

    #[test]
    fn receiver_scenario_rejects_replayed_initial_snapshot() {
        let registry = TaskRegistry::new();
        let t2 = TaskId::from_u128(2);

        assert_eq!(
            registry.upsert(receiver(2, 0, ReceiverStatus::Receiving)).unwrap(),
            MergeOutcome::Created
        );
        assert_eq!(
            registry.upsert(receiver(2, 4, ReceiverStatus::Merging)).unwrap(),
            MergeOutcome::Updated
        );
        assert_eq!(
            registry.upsert(receiver(2, 4, ReceiverStatus::Done)).unwrap(),
            MergeOutcome::Updated
        );
        assert!(
            registry
                .upsert(receiver(2, 0, ReceiverStatus::Receiving))
                .unwrap()
                .is_rejected()
        );

        let stored = registry.get(t2).unwrap().task;
        assert_eq!(stored.status, ReceiverStatus::Done);
        assert_eq!(stored.done_block_count, 4);
    }

    #[test]
    fn applying_the_same_snapshot_twice_is_idempotent() {
        let registry = TaskRegistry::new();
        registry.upsert(sender(1, 10)).unwrap();
        registry.upsert(sender(1, 3)).unwrap();
        let before = registry.list();

        let again = registry.upsert(sender(1, 3)).unwrap();
        assert_eq!(again, MergeOutcome::Rejected(RejectReason::Duplicate));
        assert_eq!(registry.list(), before);
    }

    #[test]
    fn creation_order_is_stable_across_updates() {
        let registry = TaskRegistry::new();
        for id in [0xA, 0xB, 0xC] {
            registry.upsert(sender(id, 10)).unwrap();
        }
        registry.upsert(sender(0xB, 2)).unwrap();
        registry.upsert(sender(0xB, 0)).unwrap();

        let order: Vec<TaskId> = registry.list().iter().map(TaskRecord::id).collect();
        assert_eq!(
            order,
            vec![
                TaskId::from_u128(0xA),
                TaskId::from_u128(0xB),
                TaskId::from_u128(0xC)
            ]
        );
    }

    #[test]
    fn zero_block_count_creation_leaves_registry_empty() {
        let registry = TaskRegistry::new();
        let meta = TaskMeta::new(TaskId::from_u128(9), "empty", 0, 0);
        let err = registry.upsert(SenderTask::new(meta, 100)).unwrap_err();

        assert!(matches!(err, IntegrityError::ZeroBlockCount { .. }));
        assert!(registry.list().is_empty());
        assert_eq!(registry.stats().integrity_errors, 1);
    }

    #[test]
    fn immutable_mismatch_is_surfaced_and_record_untouched() {
        let registry = TaskRegistry::new();
        registry.upsert(sender(1, 10)).unwrap();

        let mut renamed = sender(1, 5);
        renamed.meta.filename = "other".into();
        let err = registry.upsert(renamed).unwrap_err();

        assert!(matches!(
            err,
            IntegrityError::ImmutableFieldChanged { field: "filename", .. }
        ));
        let stored = registry.get(TaskId::from_u128(1)).unwrap();
        assert_eq!(stored.task.remain_block_count, 10);
        assert_eq!(stored.task.meta.filename, "file-1");
    }

    #[test]
    fn first_observation_may_be_past_initial_state() {
        let registry = TaskRegistry::new();
        let outcome = registry
            .upsert(receiver(5, 4, ReceiverStatus::Merging))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Created);
    }

    #[test]
    fn snapshot_held_by_reader_is_not_affected_by_later_writes() {
        let registry = TaskRegistry::new();
        registry.upsert(sender(1, 10)).unwrap();

        let view = registry.snapshot();
        registry.upsert(sender(1, 4)).unwrap();
        registry.upsert(sender(2, 10)).unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view.get(TaskId::from_u128(1)).unwrap().task.remain_block_count, 10);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn timestamps_and_revisions_follow_accepted_updates() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let registry = TaskRegistry::with_clock(clock.clone());

        registry.upsert(sender(1, 10)).unwrap();
        clock.advance(Duration::seconds(3));
        registry.upsert(sender(1, 7)).unwrap();
        clock.advance(Duration::seconds(3));
        registry.upsert(sender(1, 9)).unwrap(); // stale

        let record = registry.get(TaskId::from_u128(1)).unwrap();
        assert_eq!(record.first_seen_at, start);
        assert_eq!(record.updated_at, start + Duration::seconds(3));
        assert_eq!(record.revisions, 1);
    }

    #[test]
    fn stats_count_every_outcome() {
        let registry = TaskRegistry::new();
        registry.upsert(sender(1, 10)).unwrap();
        registry.upsert(sender(1, 5)).unwrap();
        registry.upsert(sender(1, 5)).unwrap();
        let _ = registry.upsert(sender(1, 11));

        assert_eq!(
            registry.stats(),
            MergeStats {
                created: 1,
                updated: 1,
                rejected: 1,
                integrity_errors: 1,
            }
        );
    }

    #[test]
    fn readers_on_other_threads_never_see_progress_roll_back() {
        let big = |remain: u32| {
            let meta = TaskMeta::new(TaskId::from_u128(1), "big.iso", 1000 << 20, 1000);
            SenderTask::new(meta, 50_000).with_remaining(remain)
        };
        let registry = Arc::new(TaskRegistry::new());
        registry.upsert(big(1000)).unwrap();

        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let mut last = u32::MAX;
                for _ in 0..2000 {
                    if let Some(record) = registry.get(TaskId::from_u128(1)) {
                        let remain = record.task.remain_block_count;
                        assert!(remain <= last, "remain went from {last} to {remain}");
                        last = remain;
                    }
                }
            })
        };

        for step in (0..10).rev() {
            registry.upsert(big(step * 100 + 50)).unwrap();
            let stale = registry.upsert(big(step * 100 + 90)).unwrap();
            assert!(stale.is_rejected());
        }
        reader.join().unwrap();
    }

    /// すべての並べ替えを列挙する（7 要素で 5040 通り）
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    /// 各ステップ後に (完了ブロック数, 状態の順位) が後退していないことを確認する
    fn assert_never_regresses<T: TransferTask>(order: Vec<T>) -> TaskRecord<T> {
        let registry = TaskRegistry::new();
        let id = order[0].id();
        let mut last = (0, 0);
        for snapshot in order {
            registry.upsert(snapshot).unwrap();
            let stored = registry.get(id).unwrap().task;
            let current = (stored.completed_blocks(), stored.status().rank());
            assert!(current.0 >= last.0, "progress went from {last:?} to {current:?}");
            assert!(current.1 >= last.1, "status went from {last:?} to {current:?}");
            last = current;
        }
        registry.get(id).unwrap()
    }

    #[test]
    fn sender_progress_is_monotonic_for_every_arrival_order() {
        let sequence: Vec<SenderTask> = (0..=6).rev().map(|remain| sender(1, remain)).collect();
        let orders = permutations(&sequence);
        assert_eq!(orders.len(), 5040);

        for order in orders {
            let record = assert_never_regresses(order);
            assert_eq!(record.task.remain_block_count, 0);
            assert_eq!(record.task.status, SenderStatus::Done);
        }
    }

    #[test]
    fn receiver_progress_is_monotonic_for_every_arrival_order() {
        let mut sequence: Vec<ReceiverTask> = (0..=4)
            .map(|done| receiver(2, done, ReceiverStatus::Receiving))
            .collect();
        sequence.push(receiver(2, 4, ReceiverStatus::Merging));
        sequence.push(receiver(2, 4, ReceiverStatus::Done));

        for order in permutations(&sequence) {
            let record = assert_never_regresses(order);
            assert_eq!(record.task.done_block_count, 4);
            // Done は Merging を経由しないと受理されないので、最終状態は Merging 以上
            assert!(record.task.status.rank() >= ReceiverStatus::Merging.rank());
        }
    }
}
