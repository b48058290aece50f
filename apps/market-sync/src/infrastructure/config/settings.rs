//! Market Sync Configuration Settings
//!
//! Configuration types for the sync core, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::SessionSettings;
use crate::domain::market::{Symbol, SymbolError, Timeframe};
use crate::domain::view::{Selection, TickerMergePolicy};
use crate::infrastructure::http::RestClientConfig;
use crate::infrastructure::push::{PushClientConfig, ReconnectConfig};

/// Default REST base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Market-data service settings.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// REST base URL including the version prefix.
    pub api_base_url: String,
    /// WebSocket base URL (scheme and authority only).
    pub ws_base_url: String,
    /// Exchange identifier.
    pub exchange: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Bars requested per OHLCV fetch.
    pub ohlcv_limit: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_base_url: "ws://localhost:8000".to_string(),
            exchange: "binance".to_string(),
            request_timeout: Duration::from_millis(30_000),
            ohlcv_limit: 500,
        }
    }
}

/// Ticker polling and push channel settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Ticker polling period.
    pub refresh_interval: Duration,
    /// Delay before each push reconnection attempt.
    pub reconnect_delay: Duration,
    /// Consecutive push reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// How polled and pushed tickers are reconciled.
    pub ticker_merge: TickerMergePolicy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(5_000),
            reconnect_delay: Duration::from_millis(3_000),
            max_reconnect_attempts: 5,
            ticker_merge: TickerMergePolicy::default(),
        }
    }
}

/// Complete sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Market-data service settings.
    pub service: ServiceSettings,
    /// Polling and push settings.
    pub feed: FeedSettings,
    /// Selection shown on mount.
    pub initial_selection: Selection,
    /// Favorites file (in-memory favorites when unset).
    pub favorites_path: Option<PathBuf>,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl SyncConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL, symbol or timeframe variable is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL, symbol or timeframe variable is invalid.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_defaults = ServiceSettings::default();
        let feed_defaults = FeedSettings::default();

        let api_base_url = non_empty(&lookup, "MARKET_SYNC_API_BASE_URL")?
            .unwrap_or(service_defaults.api_base_url)
            .trim_end_matches('/')
            .to_string();

        let ws_base_url = match non_empty(&lookup, "MARKET_SYNC_WS_BASE_URL")? {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => derive_ws_base(&api_base_url).ok_or_else(|| ConfigError::InvalidValue {
                key: "MARKET_SYNC_API_BASE_URL".to_string(),
                reason: format!("cannot derive a WebSocket URL from '{api_base_url}'"),
            })?,
        };

        let exchange = non_empty(&lookup, "MARKET_SYNC_EXCHANGE")?
            .unwrap_or(service_defaults.exchange)
            .to_lowercase();

        let service = ServiceSettings {
            api_base_url,
            ws_base_url,
            exchange,
            request_timeout: parse_env_duration_millis(
                &lookup,
                "MARKET_SYNC_REQUEST_TIMEOUT_MS",
                service_defaults.request_timeout,
            ),
            ohlcv_limit: parse_env_u16(
                &lookup,
                "MARKET_SYNC_OHLCV_LIMIT",
                service_defaults.ohlcv_limit,
            ),
        };

        let feed = FeedSettings {
            refresh_interval: parse_env_duration_millis(
                &lookup,
                "MARKET_SYNC_REFRESH_INTERVAL_MS",
                feed_defaults.refresh_interval,
            ),
            reconnect_delay: parse_env_duration_millis(
                &lookup,
                "MARKET_SYNC_RECONNECT_DELAY_MS",
                feed_defaults.reconnect_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                &lookup,
                "MARKET_SYNC_MAX_RECONNECT_ATTEMPTS",
                feed_defaults.max_reconnect_attempts,
            ),
            ticker_merge: lookup("MARKET_SYNC_TICKER_MERGE")
                .map(|s| TickerMergePolicy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
        };

        let symbol = match non_empty(&lookup, "MARKET_SYNC_SYMBOL")? {
            Some(raw) => Symbol::parse(&raw).map_err(|e| invalid("MARKET_SYNC_SYMBOL", &e))?,
            None => Symbol::parse("BTC/USDT").map_err(|e| invalid("MARKET_SYNC_SYMBOL", &e))?,
        };
        let timeframe = match non_empty(&lookup, "MARKET_SYNC_TIMEFRAME")? {
            Some(raw) => raw
                .parse::<Timeframe>()
                .map_err(|e| invalid("MARKET_SYNC_TIMEFRAME", &e))?,
            None => Timeframe::default(),
        };

        Ok(Self {
            service,
            feed,
            initial_selection: Selection::new(symbol, timeframe),
            favorites_path: non_empty(&lookup, "MARKET_SYNC_FAVORITES_PATH")?.map(PathBuf::from),
            metrics_port: parse_env_u16(&lookup, "MARKET_SYNC_METRICS_PORT", 0),
        })
    }

    /// REST client configuration.
    #[must_use]
    pub fn rest_client(&self) -> RestClientConfig {
        RestClientConfig {
            base_url: self.service.api_base_url.clone(),
            exchange: self.service.exchange.clone(),
            timeout: self.service.request_timeout,
            ohlcv_limit: self.service.ohlcv_limit,
        }
    }

    /// Push client configuration.
    #[must_use]
    pub fn push_client(&self) -> PushClientConfig {
        PushClientConfig::new(self.service.ws_base_url.clone())
            .with_reconnect(ReconnectConfig::new(
                self.feed.reconnect_delay,
                self.feed.max_reconnect_attempts,
            ))
            .with_connect_timeout(self.service.request_timeout)
    }

    /// Session settings.
    #[must_use]
    pub fn session(&self) -> SessionSettings {
        SessionSettings {
            exchange: self.service.exchange.clone(),
            refresh_interval: self.feed.refresh_interval,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be interpreted.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn invalid(key: &str, error: &SymbolError) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: error.to_string(),
    }
}

/// Derive the WebSocket base from the REST base: `http` becomes `ws`,
/// `https` becomes `wss`, and any path is dropped.
#[must_use]
pub fn derive_ws_base(api_base_url: &str) -> Option<String> {
    let (scheme, rest) = api_base_url.split_once("://")?;
    let ws_scheme = match scheme.to_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return None,
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return None;
    }
    Some(format!("{ws_scheme}://{authority}"))
}

/// Lookup that treats a set-but-blank variable as an error.
fn non_empty<F>(lookup: &F, key: &str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map_or(default, Duration::from_millis)
}
