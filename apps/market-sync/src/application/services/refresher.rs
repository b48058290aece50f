//! Periodic Refresher
//!
//! Polls the ticker of one symbol on a fixed interval while the dashboard
//! is mounted. The first poll fires one full interval after start; the
//! initial ticker comes from the fetch cycle. At most one polling task
//! exists at a time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketDataPort;
use crate::application::state::{TickerOrigin, ViewModelStore};
use crate::domain::market::Symbol;
use crate::domain::view::Source;
use crate::infrastructure::metrics;

/// Default polling period.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

struct PollTask {
    symbol: Symbol,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fixed-interval ticker poller.
pub struct PeriodicRefresher {
    port: Arc<dyn MarketDataPort>,
    store: Arc<ViewModelStore>,
    period: Duration,
    task: Mutex<Option<PollTask>>,
}

impl std::fmt::Debug for PeriodicRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicRefresher")
            .field("period", &self.period)
            .field("symbol", &self.current_symbol())
            .finish_non_exhaustive()
    }
}

impl PeriodicRefresher {
    /// Create a stopped refresher.
    ///
    /// A zero `period` is replaced by [`DEFAULT_REFRESH_INTERVAL`].
    #[must_use]
    pub fn new(port: Arc<dyn MarketDataPort>, store: Arc<ViewModelStore>, period: Duration) -> Self {
        let period = if period.is_zero() {
            tracing::warn!(
                default_ms = DEFAULT_REFRESH_INTERVAL.as_millis(),
                "Zero refresh interval, using default"
            );
            DEFAULT_REFRESH_INTERVAL
        } else {
            period
        };
        Self {
            port,
            store,
            period,
            task: Mutex::new(None),
        }
    }

    /// Polling period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Whether a polling task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Symbol currently being polled.
    #[must_use]
    pub fn current_symbol(&self) -> Option<Symbol> {
        self.task.lock().as_ref().map(|task| task.symbol.clone())
    }

    /// Start polling `symbol`, replacing any running task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, symbol: Symbol) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.port),
            Arc::clone(&self.store),
            symbol.clone(),
            self.period,
            cancel.clone(),
        ));

        let previous = self.task.lock().replace(PollTask {
            symbol: symbol.clone(),
            cancel,
            handle,
        });
        if let Some(previous) = previous {
            halt(previous);
        }

        tracing::debug!(symbol = %symbol, period_ms = self.period.as_millis(), "Ticker polling started");
    }

    /// Stop polling and wait for the task to exit.
    ///
    /// A request in flight is abandoned; its result is never applied.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };
        task.cancel.cancel();
        let symbol = task.symbol;
        if let Err(e) = task.handle.await
            && e.is_panic()
        {
            tracing::error!(symbol = %symbol, error = %e, "Ticker polling task panicked");
        }
        tracing::debug!(symbol = %symbol, "Ticker polling stopped");
    }
}

impl Drop for PeriodicRefresher {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            halt(task);
        }
    }
}

fn halt(task: PollTask) {
    task.cancel.cancel();
    task.handle.abort();
}

async fn poll_loop(
    port: Arc<dyn MarketDataPort>,
    store: Arc<ViewModelStore>,
    symbol: Symbol,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = port.ticker(&symbol) => result,
        };

        match result {
            Ok(ticker) => {
                let applied = store.apply_symbol_ticker(&symbol, ticker, TickerOrigin::Poll);
                let outcome = if applied {
                    metrics::FetchOutcome::Applied
                } else {
                    metrics::FetchOutcome::Stale
                };
                metrics::record_fetch(Source::Ticker, outcome);
            }
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "Ticker poll failed");
                metrics::record_fetch(Source::Ticker, metrics::FetchOutcome::Failed);
            }
        }
    }
}
