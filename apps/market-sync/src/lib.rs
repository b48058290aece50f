#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Sync - Dashboard View-Model Synchronization
//!
//! Keeps a trading dashboard's view model consistent with a remote
//! market-data and analysis service over an unreliable network. Three
//! request/response sources (ticker, OHLCV, full analysis) and a push
//! ticker feed write into one view model that presentation only reads.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types
//!   - `market`: Symbols, timeframes, tickers, bars, analysis payloads
//!   - `view`: Selection, generations, loading flags, connection state
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for REST data, the push feed, favorites
//!   - `services`: Fetch orchestration, ticker polling, session intents
//!   - `state`: Generation-guarded view model
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `http`: REST client
//!   - `push`: WebSocket ticker feed with fixed-delay reconnection
//!   - `favorites`: In-memory and JSON file favorites
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                 ┌───────────────────┐
//!   REST ────────►│ FetchOrchestrator │──┐
//!     │           └───────────────────┘  │    ┌────────────────┐
//!     │           ┌───────────────────┐  ├───►│ ViewModelStore │──► presentation
//!     └──────────►│ PeriodicRefresher │──┤    └────────────────┘
//!                 └───────────────────┘  │
//!   WebSocket ───► PushChannelClient ────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market and view types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market::{
    AnalysisSection, FullAnalysis, OhlcvBar, OrderBook, Symbol, SymbolError, SymbolList, Ticker,
    Timeframe,
};
pub use domain::view::{
    ConnectionState, Generation, LoadingState, Selection, Source, TickerMergePolicy,
};

// Application
pub use application::ports::{
    ANALYSIS_FAILURE_MESSAGE, FavoritesError, FavoritesStore, FetchError, MarketDataPort,
    TickerStreamPort,
};
pub use application::services::{
    DashboardSession, FetchOrchestrator, PeriodicRefresher, SessionError, SessionSettings,
};
pub use application::state::{TickerApply, TickerOrigin, ViewModelStore, ViewState};

// Adapters
pub use infrastructure::favorites::{InMemoryFavorites, JsonFileFavorites};
pub use infrastructure::http::{RestClient, RestClientConfig};
pub use infrastructure::push::{
    ChannelError, PushChannelClient, PushClientConfig, PushEvent, ReconnectConfig,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, SyncConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
