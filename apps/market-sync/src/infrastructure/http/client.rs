//! REST client for the market-data and analysis service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::application::ports::{FetchError, MarketDataPort};
use crate::domain::market::{
    AnalysisSection, FullAnalysis, OhlcvBar, OhlcvResponse, OrderBook, Symbol, SymbolList, Ticker,
    Timeframe,
};

/// Accepted OHLCV `limit` range.
pub const OHLCV_LIMIT_RANGE: (u16, u16) = (1, 1000);
/// Accepted order book `limit` range.
pub const ORDER_BOOK_LIMIT_RANGE: (u16, u16) = (1, 100);
/// Accepted Fibonacci `lookback` range.
pub const FIBONACCI_LOOKBACK_RANGE: (u16, u16) = (20, 500);

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// API base URL including the version prefix.
    pub base_url: String,
    /// Exchange passed on every market request.
    pub exchange: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bars requested per OHLCV fetch.
    pub ohlcv_limit: u16,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            exchange: "binance".to_string(),
            timeout: Duration::from_secs(30),
            ohlcv_limit: 500,
        }
    }
}

/// Error payload shapes returned by the service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        [self.message, self.detail]
            .into_iter()
            .flatten()
            .find_map(|v| match v {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
    }
}

/// HTTP adapter for [`MarketDataPort`].
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    exchange: String,
    ohlcv_limit: u16,
}

impl RestClient {
    /// Create a new client from config.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &RestClientConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            exchange: config.exchange.clone(),
            ohlcv_limit: clamp(config.ohlcv_limit, OHLCV_LIMIT_RANGE),
        })
    }

    /// Exchange used for market requests.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// GET `path` with `query` and decode the JSON body.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(ErrorBody::into_message);
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "Request rejected"
            );
            return Err(FetchError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn exchange_query(&self) -> (&'static str, String) {
        ("exchange", self.exchange.clone())
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transport(format!("request timed out: {e}"))
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

fn clamp(value: u16, (min, max): (u16, u16)) -> u16 {
    value.clamp(min, max)
}

#[async_trait]
impl MarketDataPort for RestClient {
    async fn symbols(&self, exchange: &str) -> Result<SymbolList, FetchError> {
        self.get(&format!("/market/symbols/{exchange}"), &[]).await
    }

    async fn ticker(&self, symbol: &Symbol) -> Result<Ticker, FetchError> {
        self.get(
            &format!("/market/ticker/{}", symbol.to_path_segment()),
            &[self.exchange_query()],
        )
        .await
    }

    async fn ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<Vec<OhlcvBar>, FetchError> {
        let response: OhlcvResponse = self
            .get(
                &format!("/market/ohlcv/{}", symbol.to_path_segment()),
                &[
                    ("timeframe", timeframe.as_str().to_string()),
                    self.exchange_query(),
                    ("limit", self.ohlcv_limit.to_string()),
                ],
            )
            .await?;
        Ok(response.data)
    }

    async fn full_analysis(&self, symbol: &Symbol) -> Result<FullAnalysis, FetchError> {
        let value: serde_json::Value = self
            .get(
                &format!("/analysis/full/{}", symbol.to_path_segment()),
                &[self.exchange_query()],
            )
            .await?;
        FullAnalysis::try_from(value).map_err(FetchError::Decode)
    }

    async fn order_book(&self, symbol: &Symbol, limit: u16) -> Result<OrderBook, FetchError> {
        self.get(
            &format!("/market/orderbook/{}", symbol.to_path_segment()),
            &[
                self.exchange_query(),
                ("limit", clamp(limit, ORDER_BOOK_LIMIT_RANGE).to_string()),
            ],
        )
        .await
    }

    async fn indicators(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError> {
        self.get(
            &format!("/analysis/indicators/{}", symbol.to_path_segment()),
            &[("timeframe", timeframe.as_str().to_string()), self.exchange_query()],
        )
        .await
    }

    async fn structure(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
    ) -> Result<AnalysisSection, FetchError> {
        self.get(
            &format!("/analysis/structure/{}", symbol.to_path_segment()),
            &[("timeframe", timeframe.as_str().to_string()), self.exchange_query()],
        )
        .await
    }

    async fn fibonacci(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback: u16,
    ) -> Result<AnalysisSection, FetchError> {
        self.get(
            &format!("/analysis/fibonacci/{}", symbol.to_path_segment()),
            &[
                ("timeframe", timeframe.as_str().to_string()),
                self.exchange_query(),
                ("lookback", clamp(lookback, FIBONACCI_LOOKBACK_RANGE).to_string()),
            ],
        )
        .await
    }
}
