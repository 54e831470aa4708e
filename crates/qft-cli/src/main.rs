mod args;
mod render;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use args::{Args, Command};
use qft_core::QftConfig;
use qft_core::app::{CommandInterface, IngestLoop, IngestSummary, ToView, counts, project};
use qft_core::domain::{
    EventDecodeError, ReceiverTask, Role, SenderTask, decode_receiver_event, decode_sender_event,
};
use qft_core::impls::LoopbackEngine;
use qft_core::ports::TrustStore;
use qft_core::registry::TaskRegistry;
use render::Report;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_filter()))
        .with_writer(std::io::stderr)
        .init();

    let config = args.resolve_config()?;

    match args.command {
        Command::Watch { role, json } => match Role::from(role) {
            Role::Sender => watch::<SenderTask>(&config, json, decode_sender_event).await,
            Role::Receiver => watch::<ReceiverTask>(&config, json, decode_receiver_event).await,
        },
        Command::Demo {
            file,
            pace_rate,
            replay_stale,
            json,
        } => demo(&config, &file, pace_rate, replay_stale, json).await,
    }
}

/// stdin の JSON 行を 1 つのレジストリに流し込む
async fn watch<T: ToView>(
    config: &QftConfig,
    json: bool,
    decode: fn(&str) -> Result<T, EventDecodeError>,
) -> anyhow::Result<()> {
    let registry = Arc::new(TaskRegistry::<T>::new());
    let (tx, rx) = mpsc::channel(config.event_buffer);
    let ingest = IngestLoop::spawn(Arc::clone(&registry), rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match decode(&line) {
            Ok(snapshot) => {
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(
                event = "event_decode_failed",
                line = line_no,
                error = %e,
                "Skipping undecodable event"
            ),
        }
    }
    drop(tx);

    let summary = ingest.join().await.context("ingest loop panicked")?;
    print_report(&registry, &summary, json)
}

/// loopback エンジンで 1 ファイルを送り、両 role のレジストリを表示する
async fn demo(
    config: &QftConfig,
    file: &Path,
    pace_rate: u64,
    replay_stale: bool,
    json: bool,
) -> anyhow::Result<()> {
    let senders = Arc::new(TaskRegistry::<SenderTask>::new());
    let receivers = Arc::new(TaskRegistry::<ReceiverTask>::new());
    let (stx, srx) = mpsc::channel(config.event_buffer);
    let (rtx, rrx) = mpsc::channel(config.event_buffer);
    let sender_ingest = IngestLoop::spawn(Arc::clone(&senders), srx);
    let receiver_ingest = IngestLoop::spawn(Arc::clone(&receivers), rrx);

    let engine = Arc::new(
        LoopbackEngine::new(stx)
            .with_receiver(rtx)
            .with_stale_replays(replay_stale),
    );
    let commands = CommandInterface::new(
        Arc::clone(&engine),
        TrustStore::new(&config.data_dir),
        config.server_name.clone(),
    );

    let addr = config.listen_addr.to_string();
    commands.generate_trust_material().await?;
    commands.start_listening(&addr).await?;
    commands.establish_connection(&addr).await?;
    commands.submit_file(file, pace_rate).await?;

    engine.wait_idle().await;
    info!(event = "demo_transfer_finished", file = %file.display(), "Loopback transfer finished");
    // closing the engine closes both event channels
    drop(commands);
    drop(engine);

    let sender_summary = sender_ingest.join().await.context("sender ingest panicked")?;
    let receiver_summary = receiver_ingest
        .join()
        .await
        .context("receiver ingest panicked")?;
    print_report(&senders, &sender_summary, json)?;
    print_report(&receivers, &receiver_summary, json)
}

fn print_report<T: ToView>(
    registry: &TaskRegistry<T>,
    summary: &IngestSummary,
    json: bool,
) -> anyhow::Result<()> {
    let snapshot = registry.snapshot();
    let tasks = project(&snapshot);
    let counts = counts(&snapshot);
    let role = T::ROLE.to_string();
    let report = Report {
        role: &role,
        tasks: &tasks,
        counts: &counts,
        summary,
    };
    if json {
        println!("{}", render::json(&report)?);
    } else {
        print!("{}", render::table(&report));
    }
    Ok(())
}
