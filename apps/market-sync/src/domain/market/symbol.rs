//! Trading Pair Symbols and Timeframes
//!
//! A [`Symbol`] is always held in its canonical `BASE/QUOTE` form. The REST
//! and WebSocket paths carry it as `BASE-QUOTE`; [`Symbol::to_path_segment`]
//! and [`Symbol::from_path_segment`] convert between the two losslessly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator of the canonical display form.
const DISPLAY_SEPARATOR: char = '/';

/// Separator used in URL path segments.
const PATH_SEPARATOR: char = '-';

// =============================================================================
// Errors
// =============================================================================

/// Errors produced when parsing symbols or timeframes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol is not of the form `BASE/QUOTE`.
    #[error("invalid symbol '{0}': expected BASE/QUOTE")]
    InvalidFormat(String),

    /// Path segment is not of the form `BASE-QUOTE`.
    #[error("invalid symbol path segment '{0}': expected BASE-QUOTE")]
    InvalidPathSegment(String),

    /// Timeframe is not one of the supported bar granularities.
    #[error("unsupported timeframe '{0}'")]
    UnsupportedTimeframe(String),
}

// =============================================================================
// Symbol
// =============================================================================

/// A trading pair in canonical `BASE/QUOTE` form (e.g. `BTC/USDT`).
///
/// Neither half may be empty or contain `/` or `-`, which keeps the path
/// segment transform reversible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol {
    canonical: String,
    split: usize,
}

impl Symbol {
    /// Parse a symbol from its canonical `BASE/QUOTE` form.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::InvalidFormat`] if the input does not contain
    /// exactly one `/` with non-empty halves.
    pub fn parse(input: &str) -> Result<Self, SymbolError> {
        Self::from_parts(input, DISPLAY_SEPARATOR)
            .ok_or_else(|| SymbolError::InvalidFormat(input.to_string()))
    }

    /// Parse a symbol from its URL path segment form `BASE-QUOTE`.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::InvalidPathSegment`] if the input does not
    /// contain exactly one `-` with non-empty halves.
    pub fn from_path_segment(segment: &str) -> Result<Self, SymbolError> {
        Self::from_parts(segment, PATH_SEPARATOR)
            .ok_or_else(|| SymbolError::InvalidPathSegment(segment.to_string()))
    }

    fn from_parts(input: &str, separator: char) -> Option<Self> {
        let (base, quote) = input.split_once(separator)?;
        let valid_half = |half: &str| {
            !half.is_empty()
                && !half.contains(DISPLAY_SEPARATOR)
                && !half.contains(PATH_SEPARATOR)
                && !half.chars().any(char::is_whitespace)
        };

        if !valid_half(base) || !valid_half(quote) {
            return None;
        }

        Some(Self {
            canonical: format!("{base}{DISPLAY_SEPARATOR}{quote}"),
            split: base.len(),
        })
    }

    /// Canonical `BASE/QUOTE` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Base asset (e.g. `BTC`).
    #[must_use]
    pub fn base(&self) -> &str {
        &self.canonical[..self.split]
    }

    /// Quote asset (e.g. `USDT`).
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.canonical[self.split + 1..]
    }

    /// URL path segment form `BASE-QUOTE`.
    #[must_use]
    pub fn to_path_segment(&self) -> String {
        format!("{}{PATH_SEPARATOR}{}", self.base(), self.quote())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.canonical
    }
}

// =============================================================================
// Timeframe
// =============================================================================

/// Bar granularity supported by the analysis service.
///
/// Variants are declared shortest first so the derived ordering follows bar
/// duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Timeframe {
    /// One minute.
    #[serde(rename = "1m")]
    M1,
    /// Five minutes.
    #[serde(rename = "5m")]
    M5,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    M15,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    M30,
    /// One hour.
    #[default]
    #[serde(rename = "1h")]
    H1,
    /// Two hours.
    #[serde(rename = "2h")]
    H2,
    /// Four hours.
    #[serde(rename = "4h")]
    H4,
    /// Eight hours.
    #[serde(rename = "8h")]
    H8,
    /// One day.
    #[serde(rename = "1d")]
    D1,
    /// One week.
    #[serde(rename = "1w")]
    W1,
    /// One month.
    #[serde(rename = "1M")]
    Mo1,
}

impl Timeframe {
    /// All timeframes in ascending duration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::M1,
            Self::M5,
            Self::M15,
            Self::M30,
            Self::H1,
            Self::H2,
            Self::H4,
            Self::H8,
            Self::D1,
            Self::W1,
            Self::Mo1,
        ]
    }

    /// Wire name used in query strings (`1m`, `4h`, `1M`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H8 => "8h",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| SymbolError::UnsupportedTimeframe(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test]
    fn parse_canonical_symbol() {
        let symbol = Symbol::parse("BTC/USDT").unwrap();
        assert_eq!(symbol.as_str(), "BTC/USDT");
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.quote(), "USDT");
    }

    #[test]
    fn path_segment_round_trip() {
        let symbol = Symbol::parse("ETH/USDT").unwrap();
        let segment = symbol.to_path_segment();
        assert_eq!(segment, "ETH-USDT");
        assert_eq!(Symbol::from_path_segment(&segment).unwrap(), symbol);
    }

    #[test_case("BTCUSDT" ; "no separator")]
    #[test_case("BTC/USDT/X" ; "two separators")]
    #[test_case("/USDT" ; "empty base")]
    #[test_case("BTC/" ; "empty quote")]
    #[test_case("BTC-X/USDT" ; "dash in base")]
    #[test_case("BTC /USDT" ; "whitespace")]
    fn rejects_malformed_symbols(input: &str) {
        assert!(matches!(
            Symbol::parse(input),
            Err(SymbolError::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_malformed_path_segment() {
        assert!(matches!(
            Symbol::from_path_segment("BTC/USDT"),
            Err(SymbolError::InvalidPathSegment(_))
        ));
        assert!(Symbol::from_path_segment("A-B-C").is_err());
    }

    #[test]
    fn symbol_serde_as_string() {
        let symbol = Symbol::parse("SOL/USDT").unwrap();
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"SOL/USDT\"");

        let parsed: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, symbol);

        assert!(serde_json::from_str::<Symbol>("\"SOLUSDT\"").is_err());
    }

    #[test_case("1m", Timeframe::M1)]
    #[test_case("15m", Timeframe::M15)]
    #[test_case("4h", Timeframe::H4)]
    #[test_case("1w", Timeframe::W1)]
    #[test_case("1M", Timeframe::Mo1)]
    fn timeframe_parsing(input: &str, expected: Timeframe) {
        assert_eq!(input.parse::<Timeframe>().unwrap(), expected);
        assert_eq!(expected.as_str(), input);
    }

    #[test]
    fn timeframe_rejects_unknown() {
        assert!(matches!(
            "3h".parse::<Timeframe>(),
            Err(SymbolError::UnsupportedTimeframe(_))
        ));
    }

    #[test]
    fn timeframe_order_follows_duration() {
        let all = Timeframe::all();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Timeframe::default(), Timeframe::H1);
    }

    #[test]
    fn timeframe_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Timeframe::Mo1).unwrap(), "\"1M\"");
        let tf: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(tf, Timeframe::M30);
    }

    proptest! {
        #[test]
        fn any_valid_symbol_round_trips(base in "[A-Z0-9]{1,10}", quote in "[A-Z0-9]{1,10}") {
            let symbol = Symbol::parse(&format!("{base}/{quote}")).unwrap();
            let back = Symbol::from_path_segment(&symbol.to_path_segment()).unwrap();
            prop_assert_eq!(back.as_str(), symbol.as_str());
            prop_assert_eq!(back.base(), base.as_str());
            prop_assert_eq!(back.quote(), quote.as_str());
        }
    }
}
