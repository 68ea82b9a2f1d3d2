mod deploy;

use anyhow::Result;
use clap::Parser;
use common::events::{ChannelSink, EventSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments for arb-bot.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the engine configuration YAML
    #[arg(long, default_value = "config/default.yml")]
    config: String,
    /// Run this many cycles per network, then exit. Runs until Ctrl-C if unset.
    #[arg(long)]
    cycles: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let engine_cfg = config::load_config_from_path(&args.config).await?;

    // Every emitted record funnels through one channel into the log.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn EventSink> = Arc::new(ChannelSink::new(event_tx));
    let events_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(%event, "engine event");
        }
    });

    let interval = Duration::from_millis(engine_cfg.engine.interval_ms);
    let mut shutdown_txs = Vec::new();
    let mut service_handles = Vec::new();
    for network_cfg in &engine_cfg.networks {
        let service = deploy::deploy_network(&engine_cfg, network_cfg, sink.clone()).await?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        shutdown_txs.push(shutdown_tx);
        let max_cycles = args.cycles;
        service_handles.push(tokio::spawn(async move {
            let cycles = service.run(interval, max_cycles, shutdown_rx).await;
            (service.network().clone(), cycles)
        }));
    }
    drop(sink);
    info!(networks = service_handles.len(), "arb-bot started");

    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            for tx in shutdown_txs {
                tx.send(()).await.ok();
            }
        }
    });

    for handle in service_handles {
        match handle.await {
            Ok((network, cycles)) => info!(network = %network, cycles, "service stopped"),
            Err(e) => error!(error = %e, "service task panicked"),
        }
    }
    signal_handle.abort();
    events_handle.await.ok();

    Ok(())
}
