//! LoopbackEngine - 開発用の転送エンジン代役
//!
//! 実際にはパケットを送らず、送信タスクと（任意で）対向の受信タスクの
//! スナップショットをチャネルに流すだけ。
//!
//! # 学習ポイント
//! - 本物のエンジンと同じく「全フィールドのスナップショット」を push する
//! - `with_stale_replays(true)` で、1 つ前のスナップショットを再送して
//!   at-least-once・順序入れ替わりを再現する

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{
    ReceiverStatus, ReceiverTask, SenderStatus, SenderTask, TaskMeta, block_count,
};
use crate::ports::{
    EngineError, IdGenerator, SystemClock, TransferEngine, TrustMaterialPaths, UlidGenerator,
};

/// LoopbackEngine は同一プロセス内で送受信を模擬する
pub struct LoopbackEngine {
    sender_events: mpsc::Sender<SenderTask>,
    receiver_events: Option<mpsc::Sender<ReceiverTask>>,
    ids: Box<dyn IdGenerator>,
    block_interval: Duration,
    stale_replays: bool,
    connected: Mutex<Option<SocketAddr>>,
    listening: Mutex<Option<SocketAddr>>,
    transfers: Mutex<Vec<JoinHandle<()>>>,
}

impl LoopbackEngine {
    pub fn new(sender_events: mpsc::Sender<SenderTask>) -> Self {
        Self {
            sender_events,
            receiver_events: None,
            ids: Box::new(UlidGenerator::new(SystemClock)),
            block_interval: Duration::from_millis(5),
            stale_replays: false,
            connected: Mutex::new(None),
            listening: Mutex::new(None),
            transfers: Mutex::new(Vec::new()),
        }
    }

    /// 対向の受信タスクのスナップショットも流す
    pub fn with_receiver(mut self, receiver_events: mpsc::Sender<ReceiverTask>) -> Self {
        self.receiver_events = Some(receiver_events);
        self
    }

    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// 1 ブロックあたりの模擬送信時間
    pub fn with_block_interval(mut self, block_interval: Duration) -> Self {
        self.block_interval = block_interval;
        self
    }

    pub fn with_stale_replays(mut self, enabled: bool) -> Self {
        self.stale_replays = enabled;
        self
    }

    pub fn listening_on(&self) -> Option<SocketAddr> {
        *self.listening.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 実行中の転送がすべて終わるまで待つ
    pub async fn wait_idle(&self) {
        let transfers: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.transfers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for transfer in transfers {
            if let Err(e) = transfer.await {
                warn!(
                    event = "loopback_transfer_failed",
                    error = %e,
                    "Loopback transfer task did not finish cleanly"
                );
            }
        }
    }

    /// 終わった転送を捨ててから新しい handle を登録する
    fn track(&self, handle: JoinHandle<()>) {
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        transfers.retain(|transfer| !transfer.is_finished());
        transfers.push(handle);
    }
}

#[async_trait]
impl TransferEngine for LoopbackEngine {
    async fn connect(
        &self,
        addr: SocketAddr,
        _server_name: &str,
        _certificate: &Path,
    ) -> Result<(), EngineError> {
        *self.connected.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
        Ok(())
    }

    async fn submit(&self, path: &Path, pace_rate: u64) -> Result<(), EngineError> {
        if self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
        {
            return Err(EngineError::Refused("not connected".into()));
        }

        let file_size = tokio::fs::metadata(path).await?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let meta = TaskMeta::new(
            self.ids.generate_task_id(),
            filename,
            file_size,
            block_count(file_size),
        );

        let transfer = Transfer {
            meta,
            pace_rate,
            sender_events: self.sender_events.clone(),
            receiver_events: self.receiver_events.clone(),
            block_interval: self.block_interval,
            stale_replays: self.stale_replays,
        };
        self.track(tokio::spawn(transfer.run()));
        Ok(())
    }

    async fn listen(
        &self,
        addr: SocketAddr,
        _material: &TrustMaterialPaths,
    ) -> Result<(), EngineError> {
        *self.listening.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
        Ok(())
    }

    async fn generate_trust_material(
        &self,
        server_name: &str,
        material: &TrustMaterialPaths,
    ) -> Result<(), EngineError> {
        let cert = format!("loopback certificate for {server_name}");
        let key = format!("loopback private key for {server_name}");
        tokio::fs::write(&material.certificate, cert).await?;
        tokio::fs::write(&material.private_key, key).await?;
        Ok(())
    }
}

/// 1 件の模擬転送
struct Transfer {
    meta: TaskMeta,
    pace_rate: u64,
    sender_events: mpsc::Sender<SenderTask>,
    receiver_events: Option<mpsc::Sender<ReceiverTask>>,
    block_interval: Duration,
    stale_replays: bool,
}

impl Transfer {
    async fn run(self) {
        if self.emit_all().await.is_err() {
            debug!(
                event = "loopback_transfer_abandoned",
                task_id = %self.meta.id,
                "Event channel closed before the transfer finished"
            );
        }
    }

    async fn emit_all(&self) -> Result<(), ()> {
        let blocks = self.meta.block_count;
        let mut previous = SenderTask::new(self.meta.clone(), self.pace_rate);
        self.send(previous.clone()).await?;
        self.receive(ReceiverTask::new(self.meta.clone())).await?;
        if blocks == 0 {
            return Ok(());
        }

        for acked in 1..=blocks {
            tokio::time::sleep(self.block_interval).await;
            self.receive(ReceiverTask::new(self.meta.clone()).with_done(acked))
                .await?;

            let current = SenderTask::new(self.meta.clone(), self.pace_rate)
                .with_remaining(blocks - acked);
            self.send(current.clone()).await?;
            if self.stale_replays {
                self.send(previous).await?;
            }
            previous = current;
        }

        self.receive(
            ReceiverTask::new(self.meta.clone())
                .with_done(blocks)
                .with_status(ReceiverStatus::Merging),
        )
        .await?;
        self.receive(
            ReceiverTask::new(self.meta.clone())
                .with_done(blocks)
                .with_status(ReceiverStatus::Done),
        )
        .await?;
        self.send(previous.with_remaining(0).with_status(SenderStatus::Done))
            .await
    }

    async fn send(&self, snapshot: SenderTask) -> Result<(), ()> {
        self.sender_events.send(snapshot).await.map_err(|_| ())
    }

    async fn receive(&self, snapshot: ReceiverTask) -> Result<(), ()> {
        match &self.receiver_events {
            Some(events) => events.send(snapshot).await.map_err(|_| ()),
            None => Ok(()),
        }
    }
}
