//! Market Data Port (Driven Port)
//!
//! Request/response access to the market-data and analysis service.
//! The REST client in the infrastructure layer is the production adapter.

use async_trait::async_trait;

use crate::domain::market::{
    AnalysisSection, FullAnalysis, OhlcvBar, OrderBook, Symbol, SymbolList, Ticker, Timeframe,
};

/// Fallback message when a failed analysis fetch carries no usable detail.
pub const ANALYSIS_FAILURE_MESSAGE: &str = "Failed to fetch analysis";

/// Errors from a single request to the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No response was received (connect failure or timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service rejected the request.
    #[error("remote error (status {status}): {}", .message.as_deref().unwrap_or("no detail"))]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body, if any.
        message: Option<String>,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Message carried by a remote error payload.
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => message.as_deref(),
            Self::Transport(_) | Self::Decode(_) => None,
        }
    }

    /// Message shown to the user when this error ends an analysis fetch.
    #[must_use]
    pub fn analysis_message(&self) -> String {
        self.remote_message()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(ANALYSIS_FAILURE_MESSAGE)
            .to_string()
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Remote { .. } => "remote",
            Self::Decode(_) => "decode",
        }
    }
}

/// Port for request/response market data.
///
/// Every method is an independent request; implementations must not
/// serialize calls against each other.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// List the symbols traded on an exchange.
    async fn symbols(&self, exchange: &str) -> Result<SymbolList, FetchError>;

    /// Latest ticker snapshot.
    async fn ticker(&self, symbol: &Symbol) -> Result<Ticker, FetchError>;

    /// OHLCV bars, ascending by timestamp.
    async fn ohlcv(&self, symbol: &Symbol, timeframe: Timeframe)
    -> Result<Vec<OhlcvBar>, FetchError>;

    /// Full multi-timeframe analysis.
    async fn full_analysis(&self, symbol: &Symbol) -> Result<FullAnalysis, FetchError>;

    /// Order book depth.
    async fn order_book(&self, symbol: &Symbol, limit: u16) -> Result<OrderBook, FetchError>;

    /// Technical indicators for one timeframe.
    async fn indicators(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError>;

    /// Market structure for one timeframe.
    async fn structure(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError>;

    /// Fibonacci retracement levels over a lookback window.
    async fn fibonacci(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback: u16,
    ) -> Result<AnalysisSection, FetchError>;
}
