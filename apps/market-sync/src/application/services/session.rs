//! Dashboard Session
//!
//! Turns presentation intents (mount, symbol change, timeframe change,
//! manual refresh, unmount) into fetch, polling and push-channel actions.
//! Work tied to a superseded selection is cancelled where possible and
//! otherwise rejected by the generation guard in the view model.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::orchestrator::FetchOrchestrator;
use super::refresher::{DEFAULT_REFRESH_INTERVAL, PeriodicRefresher};
use crate::application::ports::{FavoritesError, FavoritesStore, MarketDataPort, TickerStreamPort};
use crate::application::state::ViewModelStore;
use crate::domain::market::{Symbol, Timeframe};
use crate::domain::view::{ConnectionState, Generation, Selection};

/// Errors returned by session intents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The intent needs a selection but the dashboard is not mounted.
    #[error("dashboard is not mounted")]
    NotMounted,
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Exchange whose symbol list is loaded on mount.
    pub exchange: String,
    /// Ticker polling period; zero means the default.
    pub refresh_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            exchange: "binance".to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// The dashboard's synchronisation core.
pub struct DashboardSession {
    settings: SessionSettings,
    store: Arc<ViewModelStore>,
    orchestrator: Arc<FetchOrchestrator>,
    refresher: PeriodicRefresher,
    stream: Arc<dyn TickerStreamPort>,
    favorites: Arc<dyn FavoritesStore>,
    fetch_task: Mutex<Option<JoinHandle<()>>>,
    symbols_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSession")
            .field("settings", &self.settings)
            .field("selection", &self.store.selection())
            .field("connection", &self.stream.state())
            .finish_non_exhaustive()
    }
}

impl DashboardSession {
    /// Wire a session from its collaborators.
    ///
    /// `store` must be the same view model the push adapter behind `stream`
    /// writes into.
    #[must_use]
    pub fn new(
        settings: SessionSettings,
        store: Arc<ViewModelStore>,
        port: Arc<dyn MarketDataPort>,
        stream: Arc<dyn TickerStreamPort>,
        favorites: Arc<dyn FavoritesStore>,
    ) -> Self {
        let orchestrator = Arc::new(FetchOrchestrator::new(Arc::clone(&port), Arc::clone(&store)));
        let refresher = PeriodicRefresher::new(port, Arc::clone(&store), settings.refresh_interval);
        Self {
            settings,
            store,
            orchestrator,
            refresher,
            stream,
            favorites,
            fetch_task: Mutex::new(None),
            symbols_task: Mutex::new(None),
        }
    }

    /// Shared view model.
    #[must_use]
    pub const fn store(&self) -> &Arc<ViewModelStore> {
        &self.store
    }

    /// Request coordinator, for on-demand secondary data.
    #[must_use]
    pub const fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    /// Push channel state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Whether the ticker poller is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.refresher.is_running()
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Show the dashboard for `symbol` at `timeframe`.
    ///
    /// Loads the symbol list, starts the fetch cycle, ticker polling and the
    /// push channel. Mounting an already mounted session re-targets it.
    #[tracing::instrument(skip_all, fields(symbol = %symbol, timeframe = %timeframe))]
    pub async fn mount(&self, symbol: Symbol, timeframe: Timeframe) -> Generation {
        self.spawn_symbol_load();
        self.teardown_feeds().await;
        self.activate(Selection::new(symbol, timeframe)).await
    }

    /// Change the selected symbol, keeping the timeframe.
    ///
    /// Selecting the displayed symbol again is a manual refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotMounted`] before [`mount`](Self::mount).
    pub async fn set_symbol(&self, symbol: Symbol) -> Result<Generation, SessionError> {
        let current = self.store.selection().ok_or(SessionError::NotMounted)?;
        if current.symbol == symbol {
            return self.refresh();
        }
        self.teardown_feeds().await;
        // A timeframe change may have landed while the feeds were closing.
        let timeframe = self
            .store
            .selection()
            .map_or(current.timeframe, |latest| latest.timeframe);
        Ok(self.activate(Selection::new(symbol, timeframe)).await)
    }

    /// Change the timeframe, keeping the symbol.
    ///
    /// Only the fetch cycle restarts; polling and the push channel are
    /// bound to the symbol and stay untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotMounted`] before [`mount`](Self::mount).
    pub fn set_timeframe(&self, timeframe: Timeframe) -> Result<Generation, SessionError> {
        let current = self.store.selection().ok_or(SessionError::NotMounted)?;
        if current.timeframe == timeframe {
            return self.refresh();
        }
        let selection = Selection::new(current.symbol, timeframe);
        tracing::info!(selection = %selection, "Timeframe changed");
        let generation = self.store.select(selection.clone());
        self.spawn_fetch(generation, selection);
        Ok(generation)
    }

    /// Re-issue the three fetches for the current selection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotMounted`] before [`mount`](Self::mount).
    pub fn refresh(&self) -> Result<Generation, SessionError> {
        let selection = self.store.selection().ok_or(SessionError::NotMounted)?;
        let generation = self.store.generation();
        tracing::debug!(selection = %selection, generation = %generation, "Manual refresh");
        self.spawn_fetch(generation, selection);
        Ok(generation)
    }

    /// Tear down all work and clear the selection.
    pub async fn unmount(&self) {
        abort(&self.fetch_task);
        abort(&self.symbols_task);
        self.refresher.stop().await;
        self.stream.disconnect().await;
        self.store.clear_selection();
        tracing::info!("Dashboard unmounted");
    }

    /// Wait for the in-flight fetch cycle and symbol load to finish.
    pub async fn settle(&self) {
        for slot in [&self.fetch_task, &self.symbols_task] {
            let handle = slot.lock().take();
            if let Some(handle) = handle
                && let Err(e) = handle.await
                && e.is_panic()
            {
                tracing::error!(error = %e, "Fetch task panicked");
            }
        }
    }

    /// Reload the exchange symbol list in place.
    pub async fn load_symbols(&self) {
        self.orchestrator.load_symbols(&self.settings.exchange).await;
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    /// Current favorite symbols.
    ///
    /// # Errors
    ///
    /// Returns the store's [`FavoritesError`].
    pub fn favorites(&self) -> Result<Vec<Symbol>, FavoritesError> {
        self.favorites.get()
    }

    /// Toggle `symbol` as a favorite; returns whether it is one afterwards.
    ///
    /// # Errors
    ///
    /// Returns the store's [`FavoritesError`].
    pub fn toggle_favorite(&self, symbol: &Symbol) -> Result<bool, FavoritesError> {
        let now_favorite = self.favorites.toggle(symbol)?;
        tracing::debug!(symbol = %symbol, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn teardown_feeds(&self) {
        self.stream.disconnect().await;
        self.refresher.stop().await;
    }

    async fn activate(&self, selection: Selection) -> Generation {
        tracing::info!(selection = %selection, "Symbol selected");

        let generation = self.store.select(selection.clone());
        let symbol = selection.symbol.clone();
        self.spawn_fetch(generation, selection);
        self.refresher.start(symbol.clone());
        self.stream.connect(symbol).await;
        generation
    }

    fn spawn_fetch(&self, generation: Generation, selection: Selection) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let handle = tokio::spawn(async move { orchestrator.fetch_all(generation, selection).await });
        if let Some(previous) = self.fetch_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn spawn_symbol_load(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let exchange = self.settings.exchange.clone();
        let handle = tokio::spawn(async move { orchestrator.load_symbols(&exchange).await });
        if let Some(previous) = self.symbols_task.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        abort(&self.fetch_task);
        abort(&self.symbols_task);
    }
}

fn abort(slot: &Mutex<Option<JoinHandle<()>>>) {
    if let Some(handle) = slot.lock().take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{FetchError, MockMarketDataPort};
    use crate::domain::market::{FullAnalysis, OhlcvBar, SymbolList, Ticker};
    use crate::infrastructure::favorites::InMemoryFavorites;

    /// Records connect/disconnect calls.
    #[derive(Default)]
    struct RecordingStream {
        calls: Mutex<Vec<String>>,
        state: Mutex<ConnectionState>,
    }

    #[async_trait]
    impl TickerStreamPort for RecordingStream {
        async fn connect(&self, symbol: Symbol) {
            self.calls.lock().push(format!("connect {symbol}"));
            *self.state.lock() = ConnectionState::Open;
        }

        async fn disconnect(&self) {
            self.calls.lock().push("disconnect".to_string());
            *self.state.lock() = ConnectionState::Idle;
        }

        fn state(&self) -> ConnectionState {
            *self.state.lock()
        }
    }

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn ticker(sym: &Symbol, last: i64) -> Ticker {
        Ticker {
            symbol: sym.clone(),
            last: Decimal::from(last),
            bid: None,
            ask: None,
            high: None,
            low: None,
            volume: None,
            change: None,
            percentage: None,
            timestamp: 1_700_000_000_000,
        }
    }

    fn bars(n: i64) -> Vec<OhlcvBar> {
        (0..n)
            .map(|i| OhlcvBar {
                timestamp: i,
                datetime: None,
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::ONE,
            })
            .collect()
    }

    fn happy_port(ohlcv_calls: Arc<AtomicU32>) -> MockMarketDataPort {
        let mut mock = MockMarketDataPort::new();
        mock.expect_symbols().returning(|exchange| {
            Ok(SymbolList {
                exchange: exchange.to_string(),
                symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
                count: 2,
            })
        });
        mock.expect_ticker().returning(|s| Ok(ticker(s, 100)));
        mock.expect_ohlcv().returning(move |_, timeframe| {
            ohlcv_calls.fetch_add(1, Ordering::SeqCst);
            Ok(bars(if timeframe == Timeframe::D1 { 3 } else { 2 }))
        });
        mock.expect_full_analysis().returning(|s| {
            Ok(FullAnalysis::try_from(serde_json::json!({"symbol": s.as_str()})).unwrap())
        });
        mock
    }

    fn session(port: MockMarketDataPort) -> (DashboardSession, Arc<RecordingStream>) {
        let stream = Arc::new(RecordingStream::default());
        let session = DashboardSession::new(
            SessionSettings::default(),
            Arc::new(ViewModelStore::default()),
            Arc::new(port),
            Arc::clone(&stream) as Arc<dyn TickerStreamPort>,
            Arc::new(InMemoryFavorites::default()),
        );
        (session, stream)
    }

    #[tokio::test]
    async fn mount_fetches_everything_and_starts_feeds() {
        let (session, stream) = session(happy_port(Arc::new(AtomicU32::new(0))));

        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;

        let state = session.store().snapshot();
        assert_eq!(state.symbols.len(), 2);
        assert!(state.ticker.is_some());
        assert_eq!(state.ohlcv.len(), 2);
        assert!(state.analysis.is_some());
        assert!(session.is_polling());
        assert!(session.connection_state().is_open());
        assert_eq!(
            *stream.calls.lock(),
            vec!["disconnect".to_string(), "connect BTC/USDT".to_string()]
        );

        session.unmount().await;
    }

    #[tokio::test]
    async fn symbol_change_rebinds_push_channel() {
        let (session, stream) = session(happy_port(Arc::new(AtomicU32::new(0))));
        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;

        let before = session.store().generation();
        let after = session.set_symbol(symbol("ETH/USDT")).await.unwrap();
        session.settle().await;

        assert!(after > before);
        let state = session.store().snapshot();
        assert_eq!(state.ticker.unwrap().symbol.as_str(), "ETH/USDT");
        assert_eq!(state.analysis.unwrap().symbol(), Some("ETH/USDT"));
        assert_eq!(
            stream.calls.lock().last().map(String::as_str),
            Some("connect ETH/USDT")
        );

        session.unmount().await;
    }

    #[tokio::test]
    async fn timeframe_change_leaves_push_channel_alone() {
        let ohlcv_calls = Arc::new(AtomicU32::new(0));
        let (session, stream) = session(happy_port(Arc::clone(&ohlcv_calls)));
        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;
        let calls_before = stream.calls.lock().len();

        session.set_timeframe(Timeframe::D1).unwrap();
        session.settle().await;

        assert_eq!(stream.calls.lock().len(), calls_before);
        assert_eq!(ohlcv_calls.load(Ordering::SeqCst), 2);
        let state = session.store().snapshot();
        assert_eq!(state.ohlcv.len(), 3);
        assert_eq!(state.selection.unwrap().timeframe, Timeframe::D1);

        session.unmount().await;
    }

    /// Stream whose disconnect can be held open until released.
    #[derive(Default)]
    struct GatedStream {
        hold: Mutex<bool>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        connected: Mutex<Option<Symbol>>,
    }

    #[async_trait]
    impl TickerStreamPort for GatedStream {
        async fn connect(&self, symbol: Symbol) {
            *self.connected.lock() = Some(symbol);
        }

        async fn disconnect(&self) {
            let held = std::mem::take(&mut *self.hold.lock());
            if held {
                self.entered.notify_one();
                self.release.notified().await;
            }
            *self.connected.lock() = None;
        }

        fn state(&self) -> ConnectionState {
            if self.connected.lock().is_some() {
                ConnectionState::Open
            } else {
                ConnectionState::Idle
            }
        }
    }

    #[tokio::test]
    async fn timeframe_change_during_symbol_switch_is_kept() {
        let stream = Arc::new(GatedStream::default());
        let session = DashboardSession::new(
            SessionSettings::default(),
            Arc::new(ViewModelStore::default()),
            Arc::new(happy_port(Arc::new(AtomicU32::new(0)))),
            Arc::clone(&stream) as Arc<dyn TickerStreamPort>,
            Arc::new(InMemoryFavorites::default()),
        );
        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;

        *stream.hold.lock() = true;
        let (switched, ()) = tokio::join!(session.set_symbol(symbol("ETH/USDT")), async {
            stream.entered.notified().await;
            session.set_timeframe(Timeframe::D1).unwrap();
            stream.release.notify_one();
        });
        switched.unwrap();
        session.settle().await;

        let state = session.store().snapshot();
        let selection = state.selection.unwrap();
        assert_eq!(selection.symbol.as_str(), "ETH/USDT");
        assert_eq!(selection.timeframe, Timeframe::D1);
        assert_eq!(state.ohlcv.len(), 3);
        assert_eq!(stream.connected.lock().as_ref().map(Symbol::as_str), Some("ETH/USDT"));

        session.unmount().await;
    }

    #[tokio::test]
    async fn zero_refresh_interval_still_mounts() {
        let settings = SessionSettings {
            refresh_interval: Duration::ZERO,
            ..SessionSettings::default()
        };
        let session = DashboardSession::new(
            settings,
            Arc::new(ViewModelStore::default()),
            Arc::new(happy_port(Arc::new(AtomicU32::new(0)))),
            Arc::new(RecordingStream::default()),
            Arc::new(InMemoryFavorites::default()),
        );

        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;

        assert!(session.is_polling());
        assert!(session.store().snapshot().ticker.is_some());

        session.unmount().await;
    }

    #[tokio::test]
    async fn reselecting_same_symbol_refreshes_in_place() {
        let ohlcv_calls = Arc::new(AtomicU32::new(0));
        let (session, stream) = session(happy_port(Arc::clone(&ohlcv_calls)));
        let generation = session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;
        let calls_before = stream.calls.lock().len();

        let again = session.set_symbol(symbol("BTC/USDT")).await.unwrap();
        session.settle().await;

        assert_eq!(again, generation);
        assert_eq!(ohlcv_calls.load(Ordering::SeqCst), 2);
        assert_eq!(stream.calls.lock().len(), calls_before);

        session.unmount().await;
    }

    #[tokio::test]
    async fn analysis_error_clears_on_successful_refresh() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_symbols().returning(|_| Err(FetchError::Transport("down".to_string())));
        mock.expect_ticker().returning(|s| Ok(ticker(s, 100)));
        mock.expect_ohlcv().returning(|_, _| Ok(bars(1)));
        let mut first = true;
        mock.expect_full_analysis().returning(move |s| {
            if std::mem::take(&mut first) {
                Err(FetchError::Remote {
                    status: 500,
                    message: Some("upstream down".to_string()),
                })
            } else {
                Ok(FullAnalysis::try_from(serde_json::json!({"symbol": s.as_str()})).unwrap())
            }
        });
        let (session, _stream) = session(mock);

        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;
        assert_eq!(session.store().snapshot().error.as_deref(), Some("upstream down"));

        session.refresh().unwrap();
        session.settle().await;
        let state = session.store().snapshot();
        assert!(state.error.is_none());
        assert!(state.analysis.is_some());
        assert!(state.last_update.is_some());

        session.unmount().await;
    }

    #[tokio::test]
    async fn unmount_stops_everything() {
        let (session, stream) = session(happy_port(Arc::new(AtomicU32::new(0))));
        session.mount(symbol("BTC/USDT"), Timeframe::H1).await;
        session.settle().await;

        session.unmount().await;

        assert!(!session.is_polling());
        assert_eq!(session.connection_state(), ConnectionState::Idle);
        assert!(session.store().selection().is_none());
        assert_eq!(stream.calls.lock().last().map(String::as_str), Some("disconnect"));
        assert_eq!(session.refresh(), Err(SessionError::NotMounted));
    }

    #[tokio::test]
    async fn intents_before_mount_are_rejected() {
        let (session, _stream) = session(MockMarketDataPort::new());

        assert_eq!(
            session.set_symbol(symbol("BTC/USDT")).await,
            Err(SessionError::NotMounted)
        );
        assert_eq!(
            session.set_timeframe(Timeframe::D1),
            Err(SessionError::NotMounted)
        );
    }

    #[tokio::test]
    async fn favorites_toggle_through_session() {
        let (session, _stream) = session(MockMarketDataPort::new());
        let btc = symbol("BTC/USDT");

        assert!(session.toggle_favorite(&btc).unwrap());
        assert_eq!(session.favorites().unwrap(), vec![btc.clone()]);
        assert!(!session.toggle_favorite(&btc).unwrap());
        assert!(session.favorites().unwrap().is_empty());
    }
}
