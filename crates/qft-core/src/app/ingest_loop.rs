//! IngestLoop - イベント経路からレジストリへの橋渡し
//!
//! # フロー
//! 1. mpsc::Receiver から到着順に 1 件ずつスナップショットを取り出す
//! 2. TaskRegistry::upsert() に渡す（算術は一切しない）
//! 3. IntegrityError は warn ログ + 任意の報告チャネルへ
//!
//! 消費者は 1 本だけなので、同じ task id のスナップショットの順序を
//! このループ自身が入れ替えることはない。
//!
//! # 停止
//! - `request_shutdown()` / `shutdown_and_join()`: キュー済みの分を処理してから止まる
//! - 送信側がすべて drop されてチャネルが閉じても止まる

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::domain::{IntegrityError, MergeOutcome, TransferTask};
use crate::registry::TaskRegistry;

/// IngestSummary はループが処理した件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub rejected: u64,
    pub integrity_errors: u64,
}

impl IngestSummary {
    fn record(&mut self, result: &Result<MergeOutcome, IntegrityError>) {
        self.processed += 1;
        match result {
            Ok(MergeOutcome::Created) => self.created += 1,
            Ok(MergeOutcome::Updated) => self.updated += 1,
            Ok(MergeOutcome::Rejected(_)) => self.rejected += 1,
            Err(_) => self.integrity_errors += 1,
        }
    }
}

/// Ingest loop handle.
/// - `shutdown_tx` を drop してもループは止まる
/// - `join()` はチャネルが閉じるまで待つ
pub struct IngestLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<IngestSummary>,
}

impl IngestLoop {
    /// ループを起動する。IntegrityError はログにだけ残る。
    pub fn spawn<T: TransferTask>(
        registry: Arc<TaskRegistry<T>>,
        events: mpsc::Receiver<T>,
    ) -> Self {
        Self::spawn_inner(registry, events, None)
    }

    /// IntegrityError を `reports` にも流す
    pub fn spawn_with_reports<T: TransferTask>(
        registry: Arc<TaskRegistry<T>>,
        events: mpsc::Receiver<T>,
        reports: mpsc::UnboundedSender<IntegrityError>,
    ) -> Self {
        Self::spawn_inner(registry, events, Some(reports))
    }

    fn spawn_inner<T: TransferTask>(
        registry: Arc<TaskRegistry<T>>,
        events: mpsc::Receiver<T>,
        reports: Option<mpsc::UnboundedSender<IntegrityError>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(ingest_loop(registry, events, reports, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// 停止を要求する（キュー済みの分は処理される）
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// 停止を要求して終了を待つ
    pub async fn shutdown_and_join(self) -> Result<IngestSummary, JoinError> {
        self.request_shutdown();
        self.join.await
    }

    /// チャネルが閉じるまで待つ
    pub async fn join(self) -> Result<IngestSummary, JoinError> {
        let Self { shutdown_tx, join } = self;
        let summary = join.await;
        drop(shutdown_tx);
        summary
    }
}

async fn ingest_loop<T: TransferTask>(
    registry: Arc<TaskRegistry<T>>,
    mut events: mpsc::Receiver<T>,
    reports: Option<mpsc::UnboundedSender<IntegrityError>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> IngestSummary {
    let mut summary = IngestSummary::default();
    info!(event = "ingest_started", role = %T::ROLE, "Task ingestion started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;
            snapshot = events.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!(event = "ingest_channel_closed", role = %T::ROLE);
                    return finish::<T>(summary);
                };
                apply(&registry, snapshot, reports.as_ref(), &mut summary);
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // handle dropped without a request: treat as shutdown
                    break;
                }
            }
        }
    }

    // 送信を止め、キュー済みの分だけ処理する
    events.close();
    while let Some(snapshot) = events.recv().await {
        apply(&registry, snapshot, reports.as_ref(), &mut summary);
    }
    finish::<T>(summary)
}

fn apply<T: TransferTask>(
    registry: &TaskRegistry<T>,
    snapshot: T,
    reports: Option<&mpsc::UnboundedSender<IntegrityError>>,
    summary: &mut IngestSummary,
) {
    let result = registry.upsert(snapshot);
    summary.record(&result);

    if let Err(error) = result {
        warn!(
            event = "task_integrity_error",
            role = %T::ROLE,
            task_id = %error.task_id(),
            error = %error,
            "Rejected malformed task snapshot"
        );
        if let Some(reports) = reports {
            // the owner may have stopped listening; the log above is enough then
            let _ = reports.send(error);
        }
    }
}

fn finish<T: TransferTask>(summary: IngestSummary) -> IngestSummary {
    info!(
        event = "ingest_stopped",
        role = %T::ROLE,
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        rejected = summary.rejected,
        integrity_errors = summary.integrity_errors,
        "Task ingestion stopped"
    );
    summary
}
