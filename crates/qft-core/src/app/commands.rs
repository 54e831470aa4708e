//! Commands - role の操作を受け付ける同期境界
//!
//! ローカルで判定できる前提条件（アドレスの形式、証明書の有無、接続済みか、
//! pace rate、ファイルの存在）をエンジンに渡す前に検査する。
//! ここで失敗した場合はエンジンに何も送らないので、タスクレコードの
//! 断片が生まれることもない。タスクの作成は常にイベント経路から。

use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::ports::{EngineError, TransferEngine, TrustStore};

/// CommandError は命令の失敗
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid address {input:?}: {source}")]
    InvalidAddress {
        input: String,
        #[source]
        source: AddrParseError,
    },

    #[error("trust material missing at {}", path.display())]
    MissingTrustMaterial { path: PathBuf },

    #[error("no connection established")]
    NotConnected,

    #[error("pace rate must be at least 1 packet/s")]
    InvalidPaceRate,

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// CommandInterface は engine port の前段
///
/// # 使用例
/// ```ignore
/// let commands = CommandInterface::new(engine, TrustStore::new(&config.data_dir), "qft-server");
/// commands.generate_trust_material().await?;
/// commands.establish_connection("127.0.0.1:23333").await?;
/// commands.submit_file("movie.mkv", 20_000).await?;
/// ```
pub struct CommandInterface<E> {
    engine: Arc<E>,
    trust: TrustStore,
    server_name: String,
    connection: RwLock<Option<SocketAddr>>,
}

impl<E: TransferEngine> CommandInterface<E> {
    pub fn new(engine: Arc<E>, trust: TrustStore, server_name: impl Into<String>) -> Self {
        Self {
            engine,
            trust,
            server_name: server_name.into(),
            connection: RwLock::new(None),
        }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// 接続先（未接続なら None）
    pub async fn connected_to(&self) -> Option<SocketAddr> {
        *self.connection.read().await
    }

    /// 受信側への接続を張る（sender）
    pub async fn establish_connection(&self, addr: &str) -> Result<SocketAddr, CommandError> {
        let addr = parse_addr(addr)?;
        let certificate = &self.trust.paths().certificate;
        if !self.trust.has_certificate().await? {
            return Err(missing(certificate));
        }

        if let Err(e) = self
            .engine
            .connect(addr, &self.server_name, certificate)
            .await
        {
            warn!(event = "connect_failed", addr = %addr, error = %e, "Connection failed");
            return Err(e.into());
        }

        *self.connection.write().await = Some(addr);
        info!(event = "connected", addr = %addr, "Connected to receiver");
        Ok(addr)
    }

    /// ファイル送信を依頼する（sender）。レコードは同期的には作られない。
    pub async fn submit_file(
        &self,
        path: impl AsRef<Path>,
        pace_rate: u64,
    ) -> Result<(), CommandError> {
        let path = path.as_ref();
        let Some(addr) = self.connected_to().await else {
            return Err(CommandError::NotConnected);
        };
        if pace_rate == 0 {
            return Err(CommandError::InvalidPaceRate);
        }
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(CommandError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CommandError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.engine.submit(path, pace_rate).await?;
        info!(
            event = "file_submitted",
            path = %path.display(),
            pace_rate,
            addr = %addr,
            "Submitted file for transfer"
        );
        Ok(())
    }

    /// 受信を開始する（receiver）
    pub async fn start_listening(&self, addr: &str) -> Result<SocketAddr, CommandError> {
        let addr = parse_addr(addr)?;
        let paths = self.trust.paths();
        if !self.trust.has_certificate().await? {
            return Err(missing(&paths.certificate));
        }
        if !self.trust.has_private_key().await? {
            return Err(missing(&paths.private_key));
        }

        self.engine.listen(addr, paths).await?;
        info!(event = "listening", addr = %addr, "Accepting inbound transfers");
        Ok(addr)
    }

    /// 証明書と秘密鍵を固定パスに生成する（両 role）
    pub async fn generate_trust_material(&self) -> Result<(), CommandError> {
        self.trust.prepare().await?;
        self.engine
            .generate_trust_material(&self.server_name, self.trust.paths())
            .await?;
        info!(
            event = "trust_material_generated",
            dir = %self.trust.dir().display(),
            server_name = %self.server_name,
            "Generated certificate and private key"
        );
        Ok(())
    }
}

fn parse_addr(input: &str) -> Result<SocketAddr, CommandError> {
    input
        .trim()
        .parse()
        .map_err(|source| CommandError::InvalidAddress {
            input: input.to_string(),
            source,
        })
}

fn missing(path: &Path) -> CommandError {
    CommandError::MissingTrustMaterial {
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TrustMaterialPaths;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 呼ばれた操作を記録するだけのエンジン
    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<String>>,
        refuse_connect: bool,
    }

    impl RecordingEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransferEngine for RecordingEngine {
        async fn connect(
            &self,
            addr: SocketAddr,
            server_name: &str,
            _certificate: &Path,
        ) -> Result<(), EngineError> {
            if self.refuse_connect {
                return Err(EngineError::Unreachable {
                    addr,
                    reason: "connection refused".into(),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("connect {addr} {server_name}"));
            Ok(())
        }

        async fn submit(&self, path: &Path, pace_rate: u64) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("submit {} {pace_rate}", path.display()));
            Ok(())
        }

        async fn listen(
            &self,
            addr: SocketAddr,
            _material: &TrustMaterialPaths,
        ) -> Result<(), EngineError> {
            self.calls.lock().unwrap().push(format!("listen {addr}"));
            Ok(())
        }

        async fn generate_trust_material(
            &self,
            _server_name: &str,
            material: &TrustMaterialPaths,
        ) -> Result<(), EngineError> {
            tokio::fs::write(&material.certificate, b"cert").await?;
            tokio::fs::write(&material.private_key, b"key").await?;
            self.calls.lock().unwrap().push("generate".into());
            Ok(())
        }
    }

    fn interface(dir: &Path, engine: RecordingEngine) -> CommandInterface<RecordingEngine> {
        CommandInterface::new(Arc::new(engine), TrustStore::new(dir), "qft-server")
    }

    #[tokio::test]
    async fn connect_without_certificate_fails_before_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = interface(tmp.path(), RecordingEngine::default());

        let err = commands
            .establish_connection("127.0.0.1:23333")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::MissingTrustMaterial { .. }));
        assert!(commands.engine.calls().is_empty());
        assert_eq!(commands.connected_to().await, None);
    }

    #[tokio::test]
    async fn bad_address_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = interface(tmp.path(), RecordingEngine::default());
        let err = commands.establish_connection("localhost").await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn submit_requires_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.bin");
        tokio::fs::write(&file, b"data").await.unwrap();
        let commands = interface(tmp.path(), RecordingEngine::default());

        let err = commands.submit_file(&file, 100).await.unwrap_err();
        assert!(matches!(err, CommandError::NotConnected));
        assert!(commands.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn full_sender_flow_reaches_engine() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.bin");
        tokio::fs::write(&file, b"data").await.unwrap();
        let commands = interface(tmp.path(), RecordingEngine::default());

        commands.generate_trust_material().await.unwrap();
        let addr = commands.establish_connection("127.0.0.1:23333").await.unwrap();
        assert_eq!(commands.connected_to().await, Some(addr));

        assert!(matches!(
            commands.submit_file(&file, 0).await,
            Err(CommandError::InvalidPaceRate)
        ));
        assert!(matches!(
            commands.submit_file(tmp.path().join("missing.bin"), 10).await,
            Err(CommandError::FileNotFound { .. })
        ));
        assert!(matches!(
            commands.submit_file(tmp.path(), 10).await,
            Err(CommandError::FileNotFound { .. })
        ));
        commands.submit_file(&file, 20_000).await.unwrap();

        let calls = commands.engine.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], "generate");
        assert_eq!(calls[1], "connect 127.0.0.1:23333 qft-server");
        assert!(calls[2].ends_with("a.bin 20000"));
    }

    #[tokio::test]
    async fn engine_failure_leaves_connection_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = RecordingEngine {
            refuse_connect: true,
            ..Default::default()
        };
        let commands = interface(tmp.path(), engine);
        commands.generate_trust_material().await.unwrap();

        let err = commands
            .establish_connection("127.0.0.1:23333")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Engine(EngineError::Unreachable { .. })));
        assert_eq!(commands.connected_to().await, None);
    }

    #[tokio::test]
    async fn listening_requires_certificate_and_key() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = interface(tmp.path(), RecordingEngine::default());

        commands.trust_store().prepare().await.unwrap();
        tokio::fs::write(&commands.trust_store().paths().certificate, b"cert")
            .await
            .unwrap();
        let err = commands.start_listening("0.0.0.0:23333").await.unwrap_err();
        match err {
            CommandError::MissingTrustMaterial { path } => {
                assert!(path.ends_with("key.der"));
            }
            other => panic!("unexpected error: {other}"),
        }

        commands.generate_trust_material().await.unwrap();
        commands.start_listening("0.0.0.0:23333").await.unwrap();
        assert_eq!(commands.engine.calls().last().unwrap(), "listen 0.0.0.0:23333");
    }
}
