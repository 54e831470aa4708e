//! TransferEngine port - 外部の転送エンジンへの命令
//!
//! ブロック分割・ペーシング・再送・暗号化・ファイル結合はすべてエンジン側。
//! このクレートは命令を出すだけで、タスクの進捗はイベント経路
//! （`app::ingest_loop`）からしか受け取らない。
//!
//! # 実装
//! - **LoopbackEngine**（`impls::loopback`）: 開発・テスト用の代役
//! - 本番用（QUIC + rustls）は別クレート

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::trust_store::TrustMaterialPaths;

/// EngineError はエンジン側で起きた失敗
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to reach {addr}: {reason}")]
    Unreachable { addr: SocketAddr, reason: String },

    #[error("engine refused the request: {0}")]
    Refused(String),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// TransferEngine は role ごとの操作をエンジンに依頼する
///
/// どの操作もタスクレコードを作らない。
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// 受信側への制御チャネルを張る（sender）
    async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
        certificate: &Path,
    ) -> Result<(), EngineError>;

    /// ファイル送信を開始する（sender）。完了を待たずに返る。
    async fn submit(&self, path: &Path, pace_rate: u64) -> Result<(), EngineError>;

    /// 受信を開始する（receiver）
    async fn listen(
        &self,
        addr: SocketAddr,
        material: &TrustMaterialPaths,
    ) -> Result<(), EngineError>;

    /// 証明書と秘密鍵を `material` の位置に書き出す
    async fn generate_trust_material(
        &self,
        server_name: &str,
        material: &TrustMaterialPaths,
    ) -> Result<(), EngineError>;
}
