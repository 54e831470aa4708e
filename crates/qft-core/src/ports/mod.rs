//! Ports - 外部との境界
//!
//! 転送エンジン本体・時刻・ID 生成を trait で抽象化し、テストでは差し替える。

pub mod clock;
pub mod engine;
pub mod id_generator;
pub mod trust_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::engine::{EngineError, TransferEngine};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::trust_store::{TrustMaterialPaths, TrustStore};
