//! View Model State
//!
//! The aggregated state the dashboard renders from. Only the fetch
//! orchestrator, the periodic refresher and the push client write to it;
//! presentation reads snapshots or subscribes to changes.
//!
//! Every write names the generation (REST fetches) or symbol (polling and
//! push) it belongs to and is dropped when that no longer matches the
//! current selection. Completion order is independent of issue order, so
//! this check is what keeps late responses from overwriting newer data.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::market::{FullAnalysis, OhlcvBar, Symbol, Ticker};
use crate::domain::view::{Generation, LoadingState, Selection, Source, TickerMergePolicy};

// =============================================================================
// View State
// =============================================================================

/// Snapshot of everything the dashboard displays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Current selection, `None` before mount.
    pub selection: Option<Selection>,
    /// Generation of the current selection.
    pub generation: Generation,
    /// Latest ticker for the selected symbol.
    pub ticker: Option<Ticker>,
    /// Chart bars for the selected symbol and timeframe.
    pub ohlcv: Vec<OhlcvBar>,
    /// Full analysis for the selected symbol.
    pub analysis: Option<FullAnalysis>,
    /// Symbols available on the configured exchange.
    pub symbols: Vec<Symbol>,
    /// Per-source loading flags.
    pub loading: LoadingState,
    /// User-visible error (only set by analysis failures).
    pub error: Option<String>,
    /// When the last analysis was applied.
    pub last_update: Option<DateTime<Utc>>,
}

impl ViewState {
    fn is_current(&self, generation: Generation) -> bool {
        self.selection.is_some() && self.generation == generation
    }

    fn is_selected(&self, symbol: &Symbol) -> bool {
        self.selection.as_ref().is_some_and(|s| &s.symbol == symbol)
    }
}

/// Which path delivered a ticker; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerOrigin {
    /// Full fetch cycle.
    Fetch,
    /// Periodic refresher.
    Poll,
    /// Push channel.
    Push,
}

impl TickerOrigin {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Poll => "poll",
            Self::Push => "push",
        }
    }
}

/// What happened to a fetched ticker handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerApply {
    /// Written into the view model.
    Applied,
    /// Dropped because its generation was superseded.
    Stale,
    /// Dropped by the merge policy as older than the displayed ticker.
    Rejected,
}

impl TickerApply {
    /// Whether the ticker was written.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Shared, observable view model.
#[derive(Debug)]
pub struct ViewModelStore {
    tx: watch::Sender<ViewState>,
    merge_policy: TickerMergePolicy,
}

impl Default for ViewModelStore {
    fn default() -> Self {
        Self::new(TickerMergePolicy::default())
    }
}

impl ViewModelStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(merge_policy: TickerMergePolicy) -> Self {
        let (tx, _rx) = watch::channel(ViewState::default());
        Self { tx, merge_policy }
    }

    /// Policy used to reconcile polled and pushed tickers.
    #[must_use]
    pub const fn merge_policy(&self) -> TickerMergePolicy {
        self.merge_policy
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ViewState {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every applied change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.tx.borrow().selection.clone()
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.tx.borrow().generation
    }

    /// Whether `generation` is still the displayed one.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.tx.borrow().is_current(generation)
    }

    /// Make `selection` current and start a new generation.
    ///
    /// Switching symbol clears every entity of the old symbol and the error
    /// banner. Switching only the timeframe clears the chart bars.
    pub fn select(&self, selection: Selection) -> Generation {
        let mut generation = Generation::default();
        self.tx.send_modify(|state| {
            let symbol_changed = !state.is_selected(&selection.symbol);

            state.generation = state.generation.next();
            generation = state.generation;

            if symbol_changed {
                state.ticker = None;
                state.analysis = None;
                state.error = None;
                state.last_update = None;
            }
            state.ohlcv.clear();
            state.loading.ticker = false;
            state.loading.chart = false;
            state.loading.analysis = false;
            state.selection = Some(selection);
        });
        generation
    }

    /// Drop the selection; every in-flight result becomes stale.
    pub fn clear_selection(&self) {
        self.tx.send_modify(|state| {
            state.generation = state.generation.next();
            state.selection = None;
            state.ticker = None;
            state.ohlcv.clear();
            state.analysis = None;
            state.error = None;
            state.last_update = None;
            state.loading.ticker = false;
            state.loading.chart = false;
            state.loading.analysis = false;
        });
    }

    /// Mark `source` as loading for `generation`.
    ///
    /// Starting an analysis fetch also clears the error banner. Returns
    /// `false` (and changes nothing) when the generation is stale.
    pub fn begin(&self, generation: Generation, source: Source) -> bool {
        let mut accepted = false;
        self.tx.send_if_modified(|state| {
            if !state.is_current(generation) {
                return false;
            }
            accepted = true;
            let mut changed = state.loading.set(source, true);
            if source == Source::Analysis && state.error.take().is_some() {
                changed = true;
            }
            changed
        });
        accepted
    }

    /// Clear the loading flag of a failed fetch without touching data.
    ///
    /// Returns `false` when the generation is stale.
    pub fn fail(&self, generation: Generation, source: Source) -> bool {
        self.commit(generation, |state| {
            state.loading.set(source, false);
        })
    }

    /// Apply a fetched ticker.
    ///
    /// A current-generation ticker always clears the loading flag, even when
    /// the merge policy rejects it.
    pub fn apply_ticker(&self, generation: Generation, ticker: Ticker) -> TickerApply {
        let policy = self.merge_policy;
        let mut outcome = TickerApply::Stale;
        self.tx.send_if_modified(|state| {
            if !state.is_current(generation) {
                return false;
            }
            state.loading.ticker = false;
            outcome = if merge_ticker(state, ticker, policy, TickerOrigin::Fetch) {
                TickerApply::Applied
            } else {
                TickerApply::Rejected
            };
            true
        });
        outcome
    }

    /// Apply fetched chart bars.
    pub fn apply_ohlcv(&self, generation: Generation, bars: Vec<OhlcvBar>) -> bool {
        self.commit(generation, |state| {
            state.ohlcv = bars;
            state.loading.chart = false;
        })
    }

    /// Apply a fetched analysis, clearing the error and stamping the update time.
    pub fn apply_analysis(&self, generation: Generation, analysis: FullAnalysis) -> bool {
        self.commit(generation, |state| {
            state.analysis = Some(analysis);
            state.error = None;
            state.last_update = Some(Utc::now());
            state.loading.analysis = false;
        })
    }

    /// Record a failed analysis fetch as the user-visible error.
    pub fn fail_analysis(&self, generation: Generation, message: String) -> bool {
        self.commit(generation, |state| {
            state.error = Some(message);
            state.loading.analysis = false;
        })
    }

    /// Apply a ticker delivered for `symbol` by the polling or push path.
    ///
    /// Dropped when `symbol` is no longer selected or when the merge policy
    /// rejects it as older than the displayed ticker.
    pub fn apply_symbol_ticker(&self, symbol: &Symbol, ticker: Ticker, origin: TickerOrigin) -> bool {
        let policy = self.merge_policy;
        self.tx.send_if_modified(|state| {
            if !state.is_selected(symbol) {
                tracing::debug!(
                    symbol = %symbol,
                    origin = origin.as_str(),
                    "Dropping ticker for deselected symbol"
                );
                return false;
            }
            merge_ticker(state, ticker, policy, origin)
        })
    }

    /// Mark the symbol list as loading.
    pub fn begin_symbols(&self) {
        self.tx.send_if_modified(|state| state.loading.set(Source::Symbols, true));
    }

    /// Replace the symbol list.
    pub fn apply_symbols(&self, symbols: Vec<Symbol>) {
        self.tx.send_modify(|state| {
            state.symbols = symbols;
            state.loading.symbols = false;
        });
    }

    /// Clear the symbol list loading flag, keeping the previous list.
    pub fn fail_symbols(&self) {
        self.tx.send_if_modified(|state| state.loading.set(Source::Symbols, false));
    }

    fn commit(&self, generation: Generation, apply: impl FnOnce(&mut ViewState)) -> bool {
        self.tx.send_if_modified(|state| {
            if !state.is_current(generation) {
                return false;
            }
            apply(state);
            true
        })
    }
}

fn merge_ticker(
    state: &mut ViewState,
    ticker: Ticker,
    policy: TickerMergePolicy,
    origin: TickerOrigin,
) -> bool {
    if policy == TickerMergePolicy::MonotonicTimestamp
        && let Some(current) = &state.ticker
        && ticker.timestamp < current.timestamp
    {
        tracing::debug!(
            origin = origin.as_str(),
            current_ts = current.timestamp,
            incoming_ts = ticker.timestamp,
            "Dropping out-of-order ticker"
        );
        return false;
    }

    state.ticker = Some(ticker);
    true
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::market::Timeframe;

    fn symbol(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn ticker(sym: &str, last: i64, timestamp: i64) -> Ticker {
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
            timestamp,
        }
    }

    fn analysis() -> FullAnalysis {
        FullAnalysis::try_from(serde_json::json!({"symbol": "BTC/USDT"})).unwrap()
    }

    fn store_with(sym: &str) -> (ViewModelStore, Generation) {
        let store = ViewModelStore::default();
        let generation = store.select(Selection::new(symbol(sym), Timeframe::H1));
        (store, generation)
    }

    #[test]
    fn select_starts_new_generation() {
        let store = ViewModelStore::default();
        let g1 = store.select(Selection::new(symbol("BTC/USDT"), Timeframe::H1));
        let g2 = store.select(Selection::new(symbol("BTC/USDT"), Timeframe::H4));
        assert!(g2 > g1);
        assert_eq!(store.generation(), g2);
        assert!(!store.is_current(g1));
    }

    #[test]
    fn stale_generation_is_discarded() {
        let (store, old) = store_with("BTC/USDT");
        store.select(Selection::new(symbol("ETH/USDT"), Timeframe::H1));

        assert!(!store.begin(old, Source::Ticker));
        assert_eq!(store.apply_ticker(old, ticker("BTC/USDT", 100, 1)), TickerApply::Stale);
        assert!(!store.apply_analysis(old, analysis()));
        assert!(!store.fail_analysis(old, "boom".to_string()));

        let state = store.snapshot();
        assert!(state.ticker.is_none());
        assert!(state.analysis.is_none());
        assert!(state.error.is_none());
        assert!(!state.loading.any());
    }

    #[test]
    fn symbol_change_clears_previous_entities() {
        let (store, generation) = store_with("BTC/USDT");
        store.apply_ticker(generation, ticker("BTC/USDT", 100, 1));
        store.apply_analysis(generation, analysis());
        store.apply_ohlcv(generation, vec![]);

        store.select(Selection::new(symbol("ETH/USDT"), Timeframe::H1));

        let state = store.snapshot();
        assert!(state.ticker.is_none());
        assert!(state.analysis.is_none());
        assert!(state.last_update.is_none());
    }

    #[test]
    fn timeframe_change_keeps_symbol_entities() {
        let (store, generation) = store_with("BTC/USDT");
        store.apply_ticker(generation, ticker("BTC/USDT", 100, 1));
        store.apply_analysis(generation, analysis());

        store.select(Selection::new(symbol("BTC/USDT"), Timeframe::D1));

        let state = store.snapshot();
        assert!(state.ticker.is_some());
        assert!(state.analysis.is_some());
        assert!(state.ohlcv.is_empty());
    }

    #[test]
    fn analysis_error_lifecycle() {
        let (store, generation) = store_with("BTC/USDT");

        assert!(store.begin(generation, Source::Analysis));
        assert!(store.fail_analysis(generation, "upstream down".to_string()));
        let state = store.snapshot();
        assert_eq!(state.error.as_deref(), Some("upstream down"));
        assert!(!state.loading.analysis);

        // A new attempt replaces the banner.
        store.begin(generation, Source::Analysis);
        assert!(store.snapshot().error.is_none());

        store.apply_analysis(generation, analysis());
        let state = store.snapshot();
        assert!(state.error.is_none());
        assert!(state.analysis.is_some());
        assert!(state.last_update.is_some());
    }

    #[test]
    fn failure_only_clears_its_own_flag() {
        let (store, generation) = store_with("BTC/USDT");
        store.begin(generation, Source::Ticker);
        store.begin(generation, Source::Analysis);

        store.fail(generation, Source::Ticker);

        let state = store.snapshot();
        assert!(!state.loading.ticker);
        assert!(state.loading.analysis);
        assert!(state.error.is_none());
    }

    #[test]
    fn symbol_ticker_requires_selected_symbol() {
        let (store, _) = store_with("BTC/USDT");

        assert!(!store.apply_symbol_ticker(
            &symbol("ETH/USDT"),
            ticker("ETH/USDT", 5, 1),
            TickerOrigin::Push
        ));
        assert!(store.apply_symbol_ticker(
            &symbol("BTC/USDT"),
            ticker("BTC/USDT", 101, 2),
            TickerOrigin::Poll
        ));
        assert_eq!(store.snapshot().ticker.unwrap().last, Decimal::from(101));
    }

    #[test]
    fn arrival_order_policy_accepts_older_timestamp() {
        let (store, _) = store_with("BTC/USDT");
        let sym = symbol("BTC/USDT");
        store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 101, 20), TickerOrigin::Push);
        assert!(store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 100, 10), TickerOrigin::Poll));
        assert_eq!(store.snapshot().ticker.unwrap().last, Decimal::from(100));
    }

    #[test]
    fn monotonic_policy_drops_older_timestamp() {
        let store = ViewModelStore::new(TickerMergePolicy::MonotonicTimestamp);
        let sym = symbol("BTC/USDT");
        store.select(Selection::new(sym.clone(), Timeframe::H1));

        store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 101, 20), TickerOrigin::Push);
        assert!(!store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 100, 10), TickerOrigin::Poll));
        assert!(store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 102, 20), TickerOrigin::Poll));
        assert_eq!(store.snapshot().ticker.unwrap().last, Decimal::from(102));
    }

    #[test]
    fn symbols_loading_keeps_previous_list_on_failure() {
        let store = ViewModelStore::default();
        store.begin_symbols();
        store.apply_symbols(vec![symbol("BTC/USDT")]);
        store.begin_symbols();
        assert!(store.snapshot().loading.symbols);

        store.fail_symbols();
        let state = store.snapshot();
        assert!(!state.loading.symbols);
        assert_eq!(state.symbols.len(), 1);
    }

    #[test]
    fn subscribers_see_applied_changes_only() {
        let (store, generation) = store_with("BTC/USDT");
        let mut rx = store.subscribe();
        rx.mark_unchanged();

        store.apply_ticker(Generation::default(), ticker("BTC/USDT", 1, 1));
        assert!(!rx.has_changed().unwrap());

        store.apply_ticker(generation, ticker("BTC/USDT", 1, 1));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn older_fetched_ticker_is_rejected_not_stale() {
        let store = ViewModelStore::new(TickerMergePolicy::MonotonicTimestamp);
        let sym = symbol("BTC/USDT");
        let generation = store.select(Selection::new(sym.clone(), Timeframe::H1));
        store.apply_symbol_ticker(&sym, ticker("BTC/USDT", 101, 20), TickerOrigin::Push);

        assert!(store.begin(generation, Source::Ticker));
        assert_eq!(
            store.apply_ticker(generation, ticker("BTC/USDT", 100, 10)),
            TickerApply::Rejected
        );

        let state = store.snapshot();
        assert_eq!(state.ticker.unwrap().last, Decimal::from(101));
        assert!(!state.loading.ticker);

        assert!(
            store
                .apply_ticker(generation, ticker("BTC/USDT", 102, 30))
                .is_applied()
        );
    }

    #[test]
    fn clear_selection_makes_everything_stale() {
        let (store, generation) = store_with("BTC/USDT");
        store.clear_selection();
        assert!(store.selection().is_none());
        assert_eq!(store.apply_ticker(generation, ticker("BTC/USDT", 1, 1)), TickerApply::Stale);
        assert!(!store.apply_symbol_ticker(
            &symbol("BTC/USDT"),
            ticker("BTC/USDT", 1, 1),
            TickerOrigin::Push
        ));
    }
}
