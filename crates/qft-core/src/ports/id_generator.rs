//! IdGenerator port - TaskId の生成
//!
//! 本物のエンジンは自分で ID を払い出すので、ここを使うのは
//! LoopbackEngine などエンジンの代役だけ。
//!
//! # 実装
//! - **UlidGenerator**: Clock + 乱数による ULID

use crate::domain::ids::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は TaskId を生成
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp 部分を Clock から取るので、FixedClock を渡すと時刻部分が固定される。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        TaskId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
