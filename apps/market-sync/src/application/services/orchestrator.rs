//! Fetch Orchestrator
//!
//! Issues the ticker, OHLCV and full-analysis requests for one generation
//! concurrently. Each source tracks its own loading flag and failure; none
//! waits for or blocks another. Only analysis failures become visible to
//! the user.

use std::sync::Arc;

use crate::application::ports::{FetchError, MarketDataPort};
use crate::application::state::{TickerApply, ViewModelStore};
use crate::domain::market::{AnalysisSection, OrderBook, Symbol, Timeframe};
use crate::domain::view::{Generation, Selection, Source};
use crate::infrastructure::metrics;

/// Coordinates the per-selection fetch cycle.
pub struct FetchOrchestrator {
    port: Arc<dyn MarketDataPort>,
    store: Arc<ViewModelStore>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("generation", &self.store.generation())
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(port: Arc<dyn MarketDataPort>, store: Arc<ViewModelStore>) -> Self {
        Self { port, store }
    }

    /// Shared view model.
    #[must_use]
    pub const fn store(&self) -> &Arc<ViewModelStore> {
        &self.store
    }

    /// Run the three fetches for `selection` under `generation`.
    ///
    /// Completes when all three have settled. Results that arrive after the
    /// generation was superseded are discarded.
    #[tracing::instrument(skip_all, fields(selection = %selection, generation = %generation))]
    pub async fn fetch_all(&self, generation: Generation, selection: Selection) {
        tokio::join!(
            self.fetch_ticker(generation, &selection.symbol),
            self.fetch_ohlcv(generation, &selection.symbol, selection.timeframe),
            self.fetch_analysis(generation, &selection.symbol),
        );
    }

    /// Fetch the ticker; failures are silent.
    pub async fn fetch_ticker(&self, generation: Generation, symbol: &Symbol) {
        if !self.store.begin(generation, Source::Ticker) {
            return;
        }

        match self.port.ticker(symbol).await {
            Ok(ticker) => {
                match self.store.apply_ticker(generation, ticker) {
                    TickerApply::Applied => self.record_success(Source::Ticker, true),
                    TickerApply::Stale => self.record_success(Source::Ticker, false),
                    TickerApply::Rejected => {
                        tracing::debug!(symbol = %symbol, "Fetched ticker older than displayed one");
                        metrics::record_fetch(Source::Ticker, metrics::FetchOutcome::Rejected);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Ticker fetch failed");
                self.record_failure(generation, Source::Ticker, &e);
                self.store.fail(generation, Source::Ticker);
            }
        }
    }

    /// Fetch chart bars; failures are silent.
    pub async fn fetch_ohlcv(&self, generation: Generation, symbol: &Symbol, timeframe: Timeframe) {
        if !self.store.begin(generation, Source::Chart) {
            return;
        }

        match self.port.ohlcv(symbol, timeframe).await {
            Ok(bars) => {
                let count = bars.len();
                let applied = self.store.apply_ohlcv(generation, bars);
                if applied {
                    tracing::debug!(symbol = %symbol, timeframe = %timeframe, count, "Chart bars applied");
                }
                self.record_success(Source::Chart, applied);
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "OHLCV fetch failed");
                self.record_failure(generation, Source::Chart, &e);
                self.store.fail(generation, Source::Chart);
            }
        }
    }

    /// Fetch the full analysis; failures set the user-visible error.
    pub async fn fetch_analysis(&self, generation: Generation, symbol: &Symbol) {
        if !self.store.begin(generation, Source::Analysis) {
            return;
        }

        match self.port.full_analysis(symbol).await {
            Ok(analysis) => {
                let applied = self.store.apply_analysis(generation, analysis);
                self.record_success(Source::Analysis, applied);
            }
            Err(e) => {
                tracing::error!(symbol = %symbol, error = %e, "Analysis fetch failed");
                self.record_failure(generation, Source::Analysis, &e);
                self.store.fail_analysis(generation, e.analysis_message());
            }
        }
    }

    /// Load the exchange symbol list; failures keep the previous list.
    pub async fn load_symbols(&self, exchange: &str) {
        self.store.begin_symbols();

        match self.port.symbols(exchange).await {
            Ok(list) => {
                let parsed = list.parsed();
                tracing::info!(
                    exchange,
                    listed = list.symbols.len(),
                    usable = parsed.len(),
                    "Symbol list loaded"
                );
                metrics::record_fetch(Source::Symbols, metrics::FetchOutcome::Applied);
                self.store.apply_symbols(parsed);
            }
            Err(e) => {
                tracing::warn!(exchange, error = %e, "Symbol list fetch failed");
                metrics::record_fetch(Source::Symbols, metrics::FetchOutcome::Failed);
                self.store.fail_symbols();
            }
        }
    }

    /// Order book depth for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns the request's [`FetchError`].
    pub async fn order_book(&self, symbol: &Symbol, limit: u16) -> Result<OrderBook, FetchError> {
        self.port.order_book(symbol, limit).await
    }

    /// Technical indicators for `symbol` at `timeframe`.
    ///
    /// # Errors
    ///
    /// Returns the request's [`FetchError`].
    pub async fn indicators(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError> {
        self.port.indicators(symbol, timeframe).await
    }

    /// Market structure for `symbol` at `timeframe`.
    ///
    /// # Errors
    ///
    /// Returns the request's [`FetchError`].
    pub async fn structure(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError> {
        self.port.structure(symbol, timeframe).await
    }

    /// Fibonacci levels for `symbol` at `timeframe`.
    ///
    /// # Errors
    ///
    /// Returns the request's [`FetchError`].
    pub async fn fibonacci(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback: u16,
    ) -> Result<AnalysisSection, FetchError> {
        self.port.fibonacci(symbol, timeframe, lookback).await
    }

    fn record_success(&self, source: Source, applied: bool) {
        if applied {
            metrics::record_fetch(source, metrics::FetchOutcome::Applied);
        } else {
            tracing::debug!(
                source = source.as_str(),
                generation = %self.store.generation(),
                "Discarding stale result"
            );
            metrics::record_fetch(source, metrics::FetchOutcome::Stale);
        }
    }

    fn record_failure(&self, generation: Generation, source: Source, error: &FetchError) {
        let outcome = if self.store.is_current(generation) {
            metrics::FetchOutcome::Failed
        } else {
            metrics::FetchOutcome::Stale
        };
        tracing::debug!(source = source.as_str(), kind = error.kind(), "Fetch error classified");
        metrics::record_fetch(source, outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{ANALYSIS_FAILURE_MESSAGE, MockMarketDataPort};
    use crate::application::state::TickerOrigin;
    use crate::domain::market::{FullAnalysis, OhlcvBar, SymbolList, Ticker};
    use crate::domain::view::TickerMergePolicy;

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn ticker(sym: &str, last: i64) -> Ticker {
        Ticker {
            symbol: symbol(sym),
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

    fn analysis(sym: &str) -> FullAnalysis {
        FullAnalysis::try_from(serde_json::json!({"symbol": sym, "current_price": 100.0})).unwrap()
    }

    fn bar(ts: i64) -> OhlcvBar {
        OhlcvBar {
            timestamp: ts,
            datetime: None,
            open: Decimal::ONE,
            high: Decimal::TWO,
            low: Decimal::ONE,
            close: Decimal::TWO,
            volume: Decimal::TEN,
        }
    }

    fn setup(mock: MockMarketDataPort) -> (FetchOrchestrator, Arc<ViewModelStore>) {
        let store = Arc::new(ViewModelStore::default());
        (FetchOrchestrator::new(Arc::new(mock), Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn fetch_all_populates_every_source() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_ticker().returning(|s| Ok(ticker(s.as_str(), 100)));
        mock.expect_ohlcv().returning(|_, _| Ok(vec![bar(1), bar(2)]));
        mock.expect_full_analysis()
            .returning(|s| Ok(analysis(s.as_str())));

        let (orchestrator, store) = setup(mock);
        let selection = Selection::new(symbol("BTC/USDT"), Timeframe::H1);
        let generation = store.select(selection.clone());

        orchestrator.fetch_all(generation, selection).await;

        let state = store.snapshot();
        assert_eq!(state.ticker.unwrap().last, Decimal::from(100));
        assert_eq!(state.ohlcv.len(), 2);
        assert!(state.analysis.is_some());
        assert!(state.error.is_none());
        assert!(state.last_update.is_some());
        assert!(!state.loading.any());
    }

    #[tokio::test]
    async fn ticker_failure_is_silent_and_isolated() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_ticker()
            .returning(|_| Err(FetchError::Transport("connection refused".to_string())));
        mock.expect_ohlcv().returning(|_, _| Ok(vec![bar(1)]));
        mock.expect_full_analysis()
            .returning(|s| Ok(analysis(s.as_str())));

        let (orchestrator, store) = setup(mock);
        let selection = Selection::new(symbol("BTC/USDT"), Timeframe::H1);
        let generation = store.select(selection.clone());

        orchestrator.fetch_all(generation, selection).await;

        let state = store.snapshot();
        assert!(state.ticker.is_none());
        assert!(!state.loading.ticker);
        assert!(state.error.is_none());
        assert!(state.analysis.is_some());
        assert_eq!(state.ohlcv.len(), 1);
    }

    #[tokio::test]
    async fn older_fetched_ticker_keeps_pushed_one() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_ticker().returning(|s| Ok(ticker(s.as_str(), 100)));

        let store = Arc::new(ViewModelStore::new(TickerMergePolicy::MonotonicTimestamp));
        let orchestrator = FetchOrchestrator::new(Arc::new(mock), Arc::clone(&store));
        let sym = symbol("BTC/USDT");
        let generation = store.select(Selection::new(sym.clone(), Timeframe::H1));

        let mut pushed = ticker("BTC/USDT", 105);
        pushed.timestamp += 1_000;
        store.apply_symbol_ticker(&sym, pushed, TickerOrigin::Push);

        orchestrator.fetch_ticker(generation, &sym).await;

        let state = store.snapshot();
        assert_eq!(state.ticker.unwrap().last, Decimal::from(105));
        assert!(!state.loading.ticker);
        assert!(state.error.is_none());
        assert!(store.is_current(generation));
    }

    #[tokio::test]
    async fn analysis_failure_surfaces_remote_message() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_ticker().returning(|s| Ok(ticker(s.as_str(), 100)));
        mock.expect_ohlcv().returning(|_, _| Ok(vec![]));
        mock.expect_full_analysis().returning(|_| {
            Err(FetchError::Remote {
                status: 500,
                message: Some("upstream down".to_string()),
            })
        });

        let (orchestrator, store) = setup(mock);
        let selection = Selection::new(symbol("BTC/USDT"), Timeframe::H1);
        let generation = store.select(selection.clone());

        orchestrator.fetch_all(generation, selection).await;

        let state = store.snapshot();
        assert_eq!(state.error.as_deref(), Some("upstream down"));
        assert!(!state.loading.analysis);
        assert!(state.ticker.is_some());
        assert!(!state.loading.ticker);
    }

    #[tokio::test]
    async fn analysis_decode_failure_uses_fallback_message() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_full_analysis()
            .returning(|_| Err(FetchError::Decode("expected value".to_string())));

        let (orchestrator, store) = setup(mock);
        let generation = store.select(Selection::new(symbol("BTC/USDT"), Timeframe::H1));

        orchestrator
            .fetch_analysis(generation, &symbol("BTC/USDT"))
            .await;

        assert_eq!(
            store.snapshot().error.as_deref(),
            Some(ANALYSIS_FAILURE_MESSAGE)
        );
    }

    #[tokio::test]
    async fn stale_generation_skips_request_entirely() {
        let mut mock = MockMarketDataPort::new();
        mock.expect_ticker().never();
        mock.expect_ohlcv().never();
        mock.expect_full_analysis().never();

        let (orchestrator, store) = setup(mock);
        let old = store.select(Selection::new(symbol("BTC/USDT"), Timeframe::H1));
        store.select(Selection::new(symbol("ETH/USDT"), Timeframe::H1));

        orchestrator
            .fetch_all(old, Selection::new(symbol("BTC/USDT"), Timeframe::H1))
            .await;

        assert!(store.snapshot().ticker.is_none());
    }

    /// Port that answers BTC slowly and everything else immediately.
    struct SlowBtcPort;

    #[async_trait::async_trait]
    impl MarketDataPort for SlowBtcPort {
        async fn symbols(&self, _exchange: &str) -> Result<SymbolList, FetchError> {
            Err(FetchError::Transport("unused".to_string()))
        }

        async fn ticker(&self, symbol: &Symbol) -> Result<Ticker, FetchError> {
            if symbol.base() == "BTC" {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Ok(ticker(symbol.as_str(), if symbol.base() == "BTC" { 1 } else { 2 }))
        }

        async fn ohlcv(
            &self,
            symbol: &Symbol,
            _timeframe: Timeframe,
        ) -> Result<Vec<OhlcvBar>, FetchError> {
            if symbol.base() == "BTC" {
                tokio::time::sleep(Duration::from_secs(2)).await;
                return Ok(vec![bar(1), bar(2), bar(3)]);
            }
            Ok(vec![bar(10)])
        }

        async fn full_analysis(&self, symbol: &Symbol) -> Result<FullAnalysis, FetchError> {
            if symbol.base() == "BTC" {
                tokio::time::sleep(Duration::from_secs(2)).await;
                return Err(FetchError::Remote {
                    status: 500,
                    message: Some("late failure".to_string()),
                });
            }
            Ok(analysis(symbol.as_str()))
        }

        async fn order_book(&self, _: &Symbol, _: u16) -> Result<OrderBook, FetchError> {
            Err(FetchError::Transport("unused".to_string()))
        }

        async fn indicators(&self, _: &Symbol, _: Timeframe) -> Result<AnalysisSection, FetchError> {
            Err(FetchError::Transport("unused".to_string()))
        }

        async fn structure(&self, _: &Symbol, _: Timeframe) -> Result<AnalysisSection, FetchError> {
            Err(FetchError::Transport("unused".to_string()))
        }

        async fn fibonacci(
            &self,
            _: &Symbol,
            _: Timeframe,
            _: u16,
        ) -> Result<AnalysisSection, FetchError> {
            Err(FetchError::Transport("unused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_results_for_previous_symbol_are_discarded() {
        let store = Arc::new(ViewModelStore::default());
        let orchestrator = Arc::new(FetchOrchestrator::new(
            Arc::new(SlowBtcPort),
            Arc::clone(&store),
        ));

        let btc = Selection::new(symbol("BTC/USDT"), Timeframe::H1);
        let btc_generation = store.select(btc.clone());
        let slow = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.fetch_all(btc_generation, btc).await })
        };
        tokio::task::yield_now().await;

        let eth = Selection::new(symbol("ETH/USDT"), Timeframe::H1);
        let eth_generation = store.select(eth.clone());
        orchestrator.fetch_all(eth_generation, eth).await;
        slow.await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.ticker.unwrap().symbol.as_str(), "ETH/USDT");
        assert_eq!(state.ohlcv.len(), 1);
        assert_eq!(state.analysis.unwrap().symbol(), Some("ETH/USDT"));
        assert!(state.error.is_none());
        assert!(!state.loading.any());
    }

    #[tokio::test]
    async fn load_symbols_keeps_previous_list_on_failure() {
        let mut mock = MockMarketDataPort::new();
        let mut calls = 0;
        mock.expect_symbols().times(2).returning(move |exchange| {
            calls += 1;
            if calls == 1 {
                Ok(SymbolList {
                    exchange: exchange.to_string(),
                    symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
                    count: 2,
                })
            } else {
                Err(FetchError::Remote {
                    status: 503,
                    message: None,
                })
            }
        });

        let (orchestrator, store) = setup(mock);
        orchestrator.load_symbols("binance").await;
        orchestrator.load_symbols("binance").await;

        let state = store.snapshot();
        assert_eq!(state.symbols.len(), 2);
        assert!(!state.loading.symbols);
    }
}
