//! Domain model (IDs, statuses, task snapshots, merge policy, wire events).
//!
//! I/O を持たない純粋な部分だけをここに置く。
//! - ids: TaskId
//! - state: role ごとの状態 enum と遷移表
//! - task: TaskMeta / SenderTask / ReceiverTask と TransferTask trait
//! - merge: 単調 merge（stale・重複の判定）
//! - errors: IntegrityError
//! - events: エンジンの JSON イベント形式
//! - blocks: ブロックサイズ

pub mod blocks;
pub mod errors;
pub mod events;
pub mod ids;
pub mod merge;
pub mod state;
pub mod task;

pub use blocks::{BLOCK_SIZE, block_count};
pub use errors::IntegrityError;
pub use events::{
    EventDecodeError, ReceiverTaskEvent, SenderTaskEvent, decode_receiver_event,
    decode_sender_event,
};
pub use ids::{ParseTaskIdError, TaskId};
pub use merge::{Merge, MergeOutcome, RejectReason, merge};
pub use state::{ReceiverStatus, SenderStatus, TaskStatus};
pub use task::{ReceiverTask, Role, SenderTask, TaskMeta, TransferTask};
