//! Market Sync Binary
//!
//! Mounts the dashboard sync core on the configured symbol and logs view
//! model changes until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-sync
//! ```
//!
//! # Environment Variables
//!
//! - `MARKET_SYNC_API_BASE_URL`: REST base URL (default: <http://localhost:8000/api/v1>)
//! - `MARKET_SYNC_WS_BASE_URL`: WebSocket base URL (default: derived from the REST URL)
//! - `MARKET_SYNC_EXCHANGE`: Exchange identifier (default: binance)
//! - `MARKET_SYNC_SYMBOL`: Initial symbol (default: BTC/USDT)
//! - `MARKET_SYNC_TIMEFRAME`: Initial timeframe (default: 1h)
//! - `MARKET_SYNC_REQUEST_TIMEOUT_MS`: REST timeout (default: 30000)
//! - `MARKET_SYNC_OHLCV_LIMIT`: Bars per chart fetch (default: 500)
//! - `MARKET_SYNC_REFRESH_INTERVAL_MS`: Ticker polling period (default: 5000)
//! - `MARKET_SYNC_RECONNECT_DELAY_MS`: Push reconnect delay (default: 3000)
//! - `MARKET_SYNC_MAX_RECONNECT_ATTEMPTS`: Push reconnect budget (default: 5)
//! - `MARKET_SYNC_TICKER_MERGE`: arrival | timestamp (default: arrival)
//! - `MARKET_SYNC_FAVORITES_PATH`: Favorites JSON file (default: in-memory)
//! - `MARKET_SYNC_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use market_sync::infrastructure::telemetry;
use market_sync::{
    DashboardSession, FavoritesStore, InMemoryFavorites, JsonFileFavorites, PushChannelClient,
    PushEvent, RestClient, SyncConfig, ViewModelStore, ViewState, init_metrics,
};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Capacity of the push event channel.
const PUSH_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Sync");

    let config = SyncConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if let Some(addr) = init_metrics(config.metrics_port).context("metrics exporter")? {
        tracing::info!(addr = %addr, "Prometheus metrics listening");
    }

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(ViewModelStore::new(config.feed.ticker_merge));
    let rest = Arc::new(RestClient::new(&config.rest_client())?);

    let (push_tx, push_rx) = mpsc::channel::<PushEvent>(PUSH_EVENT_CAPACITY);
    let push = Arc::new(PushChannelClient::with_events(
        config.push_client(),
        Arc::clone(&store),
        push_tx,
    ));

    let favorites: Arc<dyn FavoritesStore> = match &config.favorites_path {
        Some(path) => Arc::new(JsonFileFavorites::new(path)),
        None => Arc::new(InMemoryFavorites::default()),
    };
    match favorites.get() {
        Ok(list) => tracing::info!(count = list.len(), "Favorites loaded"),
        Err(e) => tracing::warn!(error = %e, "Favorites unavailable"),
    }

    let session = DashboardSession::new(
        config.session(),
        Arc::clone(&store),
        rest,
        push,
        favorites,
    );

    let view_cancel = shutdown_token.clone();
    let view_rx = store.subscribe();
    tokio::spawn(async move {
        log_view_changes(view_rx, view_cancel).await;
    });

    let event_cancel = shutdown_token.clone();
    tokio::spawn(async move {
        handle_push_events(push_rx, event_cancel).await;
    });

    let selection = config.initial_selection.clone();
    session.mount(selection.symbol, selection.timeframe).await;

    tracing::info!("Market sync ready");

    await_shutdown(shutdown_token).await;

    session.unmount().await;

    tracing::info!("Market sync stopped");
    Ok(())
}

/// Log view model changes as they are committed.
async fn log_view_changes(mut rx: watch::Receiver<ViewState>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let state = rx.borrow_and_update().clone();
        tracing::info!(
            selection = state.selection.as_ref().map(ToString::to_string),
            last = state.ticker.as_ref().map(|t| t.last.to_string()),
            bars = state.ohlcv.len(),
            analysis = state.analysis.is_some(),
            symbols = state.symbols.len(),
            loading = state.loading.any(),
            error = state.error.as_deref(),
            "View updated"
        );
    }
}

/// Handle events from the push channel client.
async fn handle_push_events(mut rx: mpsc::Receiver<PushEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            PushEvent::StateChanged(state) if state.is_terminal() => {
                tracing::error!(state = %state, "Push feed gave up; ticker continues via polling");
            }
            PushEvent::StateChanged(state) => {
                tracing::info!(state = %state, "Push feed state");
            }
            PushEvent::Error(error) => {
                tracing::warn!(kind = error.kind(), error = %error, "Push feed error");
            }
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &SyncConfig) {
    tracing::info!(
        api_base_url = %config.service.api_base_url,
        ws_base_url = %config.service.ws_base_url,
        exchange = %config.service.exchange,
        selection = %config.initial_selection,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        request_timeout_ms = config.service.request_timeout.as_millis(),
        refresh_interval_ms = config.feed.refresh_interval.as_millis(),
        reconnect_delay_ms = config.feed.reconnect_delay.as_millis(),
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        ticker_merge = config.feed.ticker_merge.as_str(),
        "Feed settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
