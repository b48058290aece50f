//! Push Channel Client
//!
//! Maintains one WebSocket ticker feed for the selected symbol and writes
//! ticker envelopes straight into the view model.
//!
//! # Stream URL
//!
//! `ws(s)://<host>/ws/ticker/{BASE-QUOTE}`
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Connecting -> Open
//!            ^           |
//!            |      error / close
//!            |           v
//!            +---- Reconnecting{attempt} --(budget spent)--> ClosedPermanent
//! ```
//!
//! `disconnect()` returns to `Idle` from any state and never schedules a
//! reconnection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{JsonCodec, PushMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::TickerStreamPort;
use crate::application::state::{TickerOrigin, ViewModelStore};
use crate::domain::market::Symbol;
use crate::domain::view::ConnectionState;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors reported by the push channel.
///
/// Connection failures drive reconnection; message-level errors do not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket could not be opened.
    #[error("push channel connect failed: {0}")]
    Connect(String),

    /// An open channel failed or was closed by the server.
    #[error("push channel closed unexpectedly: {0}")]
    AbnormalClose(String),

    /// A frame could not be decoded.
    #[error("malformed push message: {0}")]
    MalformedMessage(String),

    /// The server reported an error on an open channel.
    #[error("push channel remote error: {0}")]
    Remote(String),

    /// The reconnect budget is spent.
    #[error("push channel gave up after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Reconnection attempts made.
        attempts: u32,
    },
}

impl ChannelError {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::AbnormalClose(_) => "abnormal_close",
            Self::MalformedMessage(_) => "malformed",
            Self::Remote(_) => "remote",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the push client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// Error observed on the channel.
    Error(ChannelError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the push client.
#[derive(Debug, Clone)]
pub struct PushClientConfig {
    /// WebSocket base URL (`ws://host:port`).
    pub ws_base_url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
}

impl PushClientConfig {
    /// Create a configuration with default reconnection settings.
    #[must_use]
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Override the reconnection settings.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the connection attempt timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Feed URL for `symbol`.
    #[must_use]
    pub fn ticker_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/ws/ticker/{}",
            self.ws_base_url.trim_end_matches('/'),
            symbol.to_path_segment()
        )
    }
}

// =============================================================================
// Channel Context
// =============================================================================

/// State shared between the client handle and its connection task.
struct ChannelContext {
    config: PushClientConfig,
    codec: JsonCodec,
    store: Arc<ViewModelStore>,
    state: RwLock<ConnectionState>,
    event_tx: Option<mpsc::Sender<PushEvent>>,
}

impl ChannelContext {
    fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            *state = next;
        }
        tracing::debug!(state = %next, "Push channel state changed");
        metrics::set_connection_state(next);
        self.emit(PushEvent::StateChanged(next));
    }

    fn report(&self, error: ChannelError) {
        metrics::record_push_error(error.kind());
        self.emit(PushEvent::Error(error));
    }

    fn emit(&self, event: PushEvent) {
        if let Some(tx) = &self.event_tx
            && let Err(e) = tx.try_send(event)
        {
            tracing::debug!(error = %e, "Dropping push event");
        }
    }
}

struct ActiveChannel {
    symbol: Symbol,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Push Channel Client
// =============================================================================

/// WebSocket client for the per-symbol ticker feed.
///
/// At most one channel is bound at a time.
pub struct PushChannelClient {
    context: Arc<ChannelContext>,
    active: Mutex<Option<ActiveChannel>>,
}

impl std::fmt::Debug for PushChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannelClient")
            .field("ws_base_url", &self.context.config.ws_base_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PushChannelClient {
    /// Create an idle client writing into `store`.
    #[must_use]
    pub fn new(config: PushClientConfig, store: Arc<ViewModelStore>) -> Self {
        Self::build(config, store, None)
    }

    /// Create an idle client that also reports [`PushEvent`]s on `event_tx`.
    ///
    /// Events are dropped when the receiver lags behind.
    #[must_use]
    pub fn with_events(
        config: PushClientConfig,
        store: Arc<ViewModelStore>,
        event_tx: mpsc::Sender<PushEvent>,
    ) -> Self {
        Self::build(config, store, Some(event_tx))
    }

    fn build(
        config: PushClientConfig,
        store: Arc<ViewModelStore>,
        event_tx: Option<mpsc::Sender<PushEvent>>,
    ) -> Self {
        Self {
            context: Arc::new(ChannelContext {
                config,
                codec: JsonCodec::new(),
                store,
                state: RwLock::new(ConnectionState::Idle),
                event_tx,
            }),
            active: Mutex::new(None),
        }
    }

    /// Symbol the channel is bound to, if any.
    pub async fn bound_symbol(&self) -> Option<Symbol> {
        self.active.lock().await.as_ref().map(|a| a.symbol.clone())
    }

    async fn shutdown(&self, active: &mut Option<ActiveChannel>) {
        if let Some(channel) = active.take() {
            channel.cancel.cancel();
            if let Err(e) = channel.handle.await
                && e.is_panic()
            {
                tracing::error!(symbol = %channel.symbol, error = %e, "Push channel task panicked");
            }
            tracing::info!(symbol = %channel.symbol, "Push channel disconnected");
        }
        self.context.set_state(ConnectionState::Idle);
    }
}

#[async_trait::async_trait]
impl TickerStreamPort for PushChannelClient {
    async fn connect(&self, symbol: Symbol) {
        let mut active = self.active.lock().await;
        self.shutdown(&mut active).await;

        let cancel = CancellationToken::new();
        self.context.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(run(
            Arc::clone(&self.context),
            symbol.clone(),
            cancel.clone(),
        ));
        *active = Some(ActiveChannel {
            symbol,
            cancel,
            handle,
        });
    }

    async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        self.shutdown(&mut active).await;
    }

    fn state(&self) -> ConnectionState {
        *self.context.state.read()
    }
}

impl Drop for PushChannelClient {
    fn drop(&mut self) {
        if let Some(channel) = self.active.get_mut().take() {
            channel.cancel.cancel();
            channel.handle.abort();
        }
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Connection loop: connect, pump messages, wait out the delay, retry.
async fn run(context: Arc<ChannelContext>, symbol: Symbol, cancel: CancellationToken) {
    let mut policy = ReconnectPolicy::new(context.config.reconnect);
    let url = context.config.ticker_url(&symbol);

    loop {
        context.set_state(ConnectionState::Connecting);

        let result = tokio::select! {
            () = cancel.cancelled() => return,
            result = connect_and_run(&context, &url, &symbol, &cancel, &mut policy) => result,
        };

        let error = match result {
            Ok(()) => return,
            Err(error) => error,
        };
        tracing::warn!(symbol = %symbol, error = %error, "Push channel error");
        context.report(error);

        let Some(delay) = policy.next_delay() else {
            let attempts = policy.attempt_count();
            tracing::error!(symbol = %symbol, attempts, "Push channel retries exhausted");
            context.set_state(ConnectionState::ClosedPermanent);
            context.report(ChannelError::RetriesExhausted { attempts });
            return;
        };

        let attempt = policy.attempt_count();
        tracing::info!(
            symbol = %symbol,
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting push channel"
        );
        metrics::record_push_reconnect();
        context.set_state(ConnectionState::Reconnecting { attempt });

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(symbol = %symbol, "Push channel cancelled during reconnect delay");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Open the socket and process frames until cancelled or failed.
///
/// `Ok(())` means the channel was cancelled.
async fn connect_and_run(
    context: &ChannelContext,
    url: &str,
    symbol: &Symbol,
    cancel: &CancellationToken,
    policy: &mut ReconnectPolicy,
) -> Result<(), ChannelError> {
    tracing::info!(url, "Connecting to push channel");

    let (ws_stream, _response) =
        tokio::time::timeout(context.config.connect_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| ChannelError::Connect("connection attempt timed out".to_string()))?
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

    context.set_state(ConnectionState::Open);
    tracing::info!(symbol = %symbol, "Push channel open");

    let (mut write, mut read) = ws_stream.split();

    // The budget only refills once the channel proves healthy: a decoded
    // frame, or staying open for one reconnect delay. A server that accepts
    // and immediately drops us keeps consuming attempts.
    let stable = tokio::time::sleep(context.config.reconnect.delay);
    tokio::pin!(stable);
    let mut healthy = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            () = &mut stable, if !healthy => {
                healthy = true;
                policy.reset();
                tracing::debug!(symbol = %symbol, "Push channel stable, retry budget refilled");
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(context, symbol, &text) && !healthy {
                            healthy = true;
                            policy.reset();
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| ChannelError::AbnormalClose(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map_or_else(|| "close frame".to_string(), |f| format!("{} {}", u16::from(f.code), f.reason.as_str()));
                        return Err(ChannelError::AbnormalClose(reason));
                    }
                    Some(Ok(_)) => {
                        // Binary, pong and raw frames carry nothing for us
                    }
                    Some(Err(e)) => {
                        return Err(ChannelError::AbnormalClose(e.to_string()));
                    }
                    None => {
                        return Err(ChannelError::AbnormalClose("stream ended".to_string()));
                    }
                }
            }
        }
    }
}

/// Dispatch one text frame by envelope type.
///
/// Returns whether the frame shows a working feed: anything decodable
/// except a server error.
fn handle_text(context: &ChannelContext, symbol: &Symbol, text: &str) -> bool {
    let message = match context.codec.decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(symbol = %symbol, error = %e, "Malformed push message");
            context.report(ChannelError::MalformedMessage(e.to_string()));
            return false;
        }
    };

    metrics::record_push_message(message.kind());

    match message {
        PushMessage::Ticker(ticker) => {
            if ticker.symbol != *symbol {
                tracing::debug!(
                    bound = %symbol,
                    received = %ticker.symbol,
                    "Ignoring ticker for another symbol"
                );
                return true;
            }
            context
                .store
                .apply_symbol_ticker(symbol, ticker, TickerOrigin::Push);
            true
        }
        PushMessage::Error(message) => {
            tracing::warn!(symbol = %symbol, message = %message, "Push channel reported error");
            context.report(ChannelError::Remote(message));
            false
        }
        PushMessage::Other(kind) => {
            tracing::trace!(symbol = %symbol, kind = %kind, "Ignoring push message");
            true
        }
    }
}
