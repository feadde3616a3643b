// ============================================================================
// pipetable demo
// ============================================================================
//
// Simulates a capture engine feeding the registry from one task while a
// second task follows the change feed and keeps a selected row in place,
// then prints the resulting table.
//
// ============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use pipetable::{
    RegistryChange, RegistryConfig, SessionId, TableProjection, TransactionRecord,
    TransactionRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipetable")]
#[command(about = "Feed simulated captured transactions through a pipetable registry")]
struct Cli {
    /// Number of transactions to capture
    #[arg(long, default_value_t = 12)]
    records: u64,

    /// Number of distinct sessions the transactions are spread over
    #[arg(long, default_value_t = 4)]
    sessions: u64,

    /// Session to evict once capture has finished
    #[arg(long)]
    evict_session: Option<u64>,

    /// Retain at most this many rows
    #[arg(long)]
    max_records: Option<usize>,

    /// JSON registry configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump the remaining rows as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RegistryConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    if let Some(max) = cli.max_records {
        config = config.max_records(max);
    }

    let registry =
        Arc::new(TransactionRegistry::with_config(config).context("invalid registry config")?);

    let follower = tokio::spawn(follow_selection(registry.feed()));

    let producer = {
        let registry = Arc::clone(&registry);
        let (records, sessions) = (cli.records, cli.sessions.max(1));
        tokio::spawn(async move { capture(&registry, records, sessions).await })
    };
    producer.await.context("capture task panicked")??;

    if let Some(session) = cli.evict_session {
        let removed = registry.remove_items([SessionId(session)])?;
        info!(session, removed, "evicted session");
    }

    // Dropping the registry closes the feed and ends the follower.
    let table = {
        let snapshot = registry.snapshot();
        drop(registry);
        snapshot
    };
    follower.await.context("follower task panicked")?;

    if cli.json {
        let views: Vec<_> = table.iter().map(|record| record.view()).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        println!("{}", TableProjection::new(&table).render());
    }

    Ok(())
}

/// Register each transaction, then complete it the way a proxy would once
/// the response arrives.
async fn capture(registry: &TransactionRegistry, records: u64, sessions: u64) -> Result<()> {
    for i in 0..records {
        let session = SessionId(i % sessions + 1);
        let host = format!("host{}.example.com", session.as_u64());
        let record = TransactionRecord::builder(session)
            .protocol("HTTP/1.1")
            .host(host.clone())
            .server_address(format!("10.0.0.{}", session.as_u64()))
            .url(format!("http://{}/item/{}", host, i))
            .header("Host", host)
            .build();

        registry.add(Arc::clone(&record))?;
        tokio::task::yield_now().await;

        record.set_result_code(if i % 5 == 4 { 404 } else { 200 });
        record.set_content_type("application/json");
        record.set_caching_info("no-cache");
        record.set_body(format!("{} bytes", 128 + i * 16));
    }
    Ok(())
}

/// Track row 0 as a "selected" row across structural changes.
async fn follow_selection(mut feed: tokio::sync::broadcast::Receiver<RegistryChange>) {
    let mut selected: Option<usize> = Some(0);
    let mut seen = 0usize;

    loop {
        match feed.recv().await {
            Ok(change) => {
                seen += 1;
                if let RegistryChange::Inserted { .. } = change {
                    continue;
                }
                let moved = selected.and_then(|row| change.remap_row(row));
                if moved != selected {
                    info!(?selected, ?moved, kind = ?change.kind(), "selection moved");
                }
                selected = moved;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "change feed lagged; dropping selection");
                selected = None;
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!(events = seen, ?selected, "change feed closed");
}
