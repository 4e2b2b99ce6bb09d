//! Freight board service: binary entrypoint.
//! Loads config, opens the record store, starts the live feed (if configured)
//! and serves the HTTP API until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freight_board::channel::transport::WsConnector;
use freight_board::channel::ChannelManager;
use freight_board::classifier::build_classifier;
use freight_board::config::AppConfig;
use freight_board::metrics::Metrics;
use freight_board::store::{FileBackend, RecordStore};
use freight_board::{router, AppState, Ingestor};

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("freight_board=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init().context("installing metrics recorder")?;

    let store = if cfg.store.path.as_os_str().is_empty() {
        tracing::warn!("store.path is empty; records are kept in memory only");
        Arc::new(RecordStore::in_memory())
    } else {
        Arc::new(RecordStore::open(FileBackend::new(&cfg.store.path)).await)
    };
    let ingestor = Arc::new(Ingestor::new(Arc::clone(&store)));
    let classifier = build_classifier(&cfg.classifier).context("building classifier client")?;
    tracing::info!(classifier = classifier.name(), endpoint = %cfg.classifier.endpoint, "classifier ready");

    let channel = cfg.channel.url.as_deref().map(|url| {
        let connector = Arc::new(WsConnector::new(url));
        ChannelManager::new(connector, Arc::clone(&ingestor), &cfg.channel).spawn()
    });
    if channel.is_none() {
        tracing::info!("no channel url configured; live feed disabled");
    }

    let state = AppState {
        ingestor,
        classifier,
        channel: channel.as_ref().map(|h| h.control()),
    };
    let app = router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    tracing::info!(bind = %cfg.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("http server")?;

    if let Some(handle) = channel {
        handle.shutdown().await;
    }
    store.flush().await;
    Ok(())
}
