//! Impls - port の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **LoopbackEngine**: 同一プロセス内で送受信を模擬する TransferEngine
//!
//! 本物のエンジン（QUIC + rustls + 消失訂正符号）は別クレート。

pub mod loopback;

pub use self::loopback::LoopbackEngine;
