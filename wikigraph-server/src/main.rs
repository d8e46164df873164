use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use wikigraph_core::{GraphStore, TopicSource, WikigraphConfig, WikipediaClient};

use wikigraph_server::http::{self, HttpState};
use wikigraph_server::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "wikigraph.toml")]
    config: String,

    /// Check that the graph document is readable, then exit
    #[arg(long)]
    health: bool,

    /// Keep the graph in memory only (nothing is written to disk)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config; a missing file means defaults
    let config = if Path::new(&args.config).exists() {
        match WikigraphConfig::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", args.config, e);
                std::process::exit(1);
            }
        }
    } else {
        WikigraphConfig::default()
    };

    // Init logging: RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let store = if args.ephemeral {
        tracing::warn!("Ephemeral mode: graph changes are not persisted");
        GraphStore::in_memory(config.storage.max_nodes)
    } else {
        match GraphStore::from_config(&config.storage) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Invalid storage config: {}", e);
                std::process::exit(1);
            }
        }
    };
    let store = Arc::new(store);

    if args.health {
        match store.stats().await {
            Ok(stats) => {
                println!("✅ Graph document '{}' readable", stats.key);
                println!("✅ {} nodes, {} links (max {})", stats.nodes, stats.links, stats.max_nodes);
            }
            Err(e) => {
                println!("❌ Graph document check failed: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Ensure a document exists; never overwrite one that fails to parse
    match store.try_load().await {
        Ok(Some(graph)) => tracing::info!(
            key = store.key(),
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Loaded graph document"
        ),
        Ok(None) => {
            store.save(wikigraph_core::Graph::new()).await?;
            tracing::info!(key = store.key(), "Created empty graph document");
        }
        Err(e) => tracing::warn!(
            key = store.key(),
            error = %e,
            "Graph document unreadable; updates will be refused until it is repaired"
        ),
    }

    let source: Arc<dyn TopicSource> = Arc::new(WikipediaClient::new(config.wikipedia.clone())?);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn HTTP REST API server if enabled
    if config.http.enabled {
        let http_state = Arc::new(HttpState {
            store: store.clone(),
            source: source.clone(),
            config: config.clone(),
        });
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, store, source, tx.subscribe()).await?;

    Ok(())
}
