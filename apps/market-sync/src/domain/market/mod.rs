//! Market Data Types
//!
//! Canonical representations of the payloads served by the market-data and
//! analysis service. Entities are replaced wholesale when new data arrives;
//! nothing here supports field-level merging.

mod symbol;

pub use symbol::{Symbol, SymbolError, Timeframe};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Ticker
// =============================================================================

/// Latest price/volume snapshot for a trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Trading pair.
    pub symbol: Symbol,
    /// Last traded price.
    pub last: Decimal,
    /// Best bid.
    #[serde(default)]
    pub bid: Option<Decimal>,
    /// Best ask.
    #[serde(default)]
    pub ask: Option<Decimal>,
    /// 24h high.
    #[serde(default)]
    pub high: Option<Decimal>,
    /// 24h low.
    #[serde(default)]
    pub low: Option<Decimal>,
    /// 24h base volume.
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// 24h absolute change.
    #[serde(default)]
    pub change: Option<Decimal>,
    /// 24h percentage change.
    #[serde(default)]
    pub percentage: Option<Decimal>,
    /// Exchange timestamp in epoch milliseconds.
    pub timestamp: i64,
}

impl Ticker {
    /// Exchange timestamp as a UTC datetime, if representable.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Bid/ask spread when both sides are present.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

// =============================================================================
// OHLCV
// =============================================================================

/// One Open/High/Low/Close/Volume bar.
///
/// Sequences are ascending by `timestamp` with no duplicates; this is
/// guaranteed upstream and not re-validated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Bar open time in epoch milliseconds.
    pub timestamp: i64,
    /// ISO-8601 rendering of `timestamp`, when the service provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

/// Envelope of the OHLCV endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvResponse {
    /// Bars, ascending by timestamp.
    pub data: Vec<OhlcvBar>,
}

// =============================================================================
// Full Analysis
// =============================================================================

/// Aggregate analysis result.
///
/// Treated as an opaque atomic value: it is stored and replaced as a whole
/// and only a few top-level fields are exposed for logging and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct FullAnalysis(serde_json::Value);

impl FullAnalysis {
    /// Borrow the raw payload.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume into the raw payload.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Symbol the analysis was computed for.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(serde_json::Value::as_str)
    }

    /// Price the analysis was computed at.
    #[must_use]
    pub fn current_price(&self) -> Option<f64> {
        self.0
            .get("current_price")
            .and_then(serde_json::Value::as_f64)
    }

    /// Generation timestamp reported by the service.
    #[must_use]
    pub fn generated_at(&self) -> Option<&str> {
        self.0
            .get("generated_at")
            .and_then(serde_json::Value::as_str)
    }
}

impl TryFrom<serde_json::Value> for FullAnalysis {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err("full analysis payload must be a JSON object".to_string())
        }
    }
}

impl From<FullAnalysis> for serde_json::Value {
    fn from(analysis: FullAnalysis) -> Self {
        analysis.0
    }
}

// =============================================================================
// Secondary Endpoints
// =============================================================================

/// Symbols listed on an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolList {
    /// Exchange identifier.
    #[serde(default)]
    pub exchange: String,
    /// Raw symbol strings as reported by the exchange.
    pub symbols: Vec<String>,
    /// Number of symbols reported by the service.
    #[serde(default)]
    pub count: usize,
}

impl SymbolList {
    /// Symbols that parse as canonical `BASE/QUOTE` pairs.
    ///
    /// Derivative or otherwise unusual listings are skipped.
    #[must_use]
    pub fn parsed(&self) -> Vec<Symbol> {
        self.symbols
            .iter()
            .filter_map(|raw| Symbol::parse(raw).ok())
            .collect()
    }
}

/// Order book depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bid levels as `(price, amount)`, best first.
    #[serde(deserialize_with = "book_levels")]
    pub bids: Vec<(Decimal, Decimal)>,
    /// Ask levels as `(price, amount)`, best first.
    #[serde(deserialize_with = "book_levels")]
    pub asks: Vec<(Decimal, Decimal)>,
    /// Exchange timestamp in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Best ask minus best bid (zero when a side is empty).
    #[serde(default)]
    pub spread: Decimal,
}

/// One `[price, amount, ...]` level; exchanges may append extra fields
/// (order count, id) which are skipped.
struct BookLevel(Decimal, Decimal);

impl<'de> Deserialize<'de> for BookLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct LevelVisitor;

        impl<'de> serde::de::Visitor<'de> for LevelVisitor {
            type Value = BookLevel;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an order book level [price, amount, ...]")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<BookLevel, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                use serde::de::Error;

                let price = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(0, &self))?;
                let amount = seq
                    .next_element()?
                    .ok_or_else(|| A::Error::invalid_length(1, &self))?;
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(BookLevel(price, amount))
            }
        }

        deserializer.deserialize_seq(LevelVisitor)
    }
}

fn book_levels<'de, D>(deserializer: D) -> Result<Vec<(Decimal, Decimal)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let levels = Vec::<BookLevel>::deserialize(deserializer)?;
    Ok(levels.into_iter().map(|BookLevel(p, a)| (p, a)).collect())
}

/// Opaque payload of the indicator, structure and fibonacci endpoints.
pub type AnalysisSection = serde_json::Value;
