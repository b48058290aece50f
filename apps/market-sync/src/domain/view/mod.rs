//! View Model Primitives
//!
//! Value types shared by the writers of the dashboard view model: the
//! selection/generation pair used to discard stale results, per-source
//! loading flags, the push channel connection state, and the policy that
//! reconciles ticker updates from the polling and push paths.

use std::fmt;

use super::market::{Symbol, Timeframe};

// =============================================================================
// Selection & Generation
// =============================================================================

/// The (symbol, timeframe) pair the dashboard currently displays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Selected trading pair.
    pub symbol: Symbol,
    /// Selected bar granularity.
    pub timeframe: Timeframe,
}

impl Selection {
    /// Create a new selection.
    #[must_use]
    pub const fn new(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self { symbol, timeframe }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Monotonic identifier of a selection.
///
/// A new generation starts every time the selection changes. Results tagged
/// with an older generation are discarded on arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The generation that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Loading State
// =============================================================================

/// Independently loading data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Exchange symbol list.
    Symbols,
    /// Ticker snapshot.
    Ticker,
    /// OHLCV chart bars.
    Chart,
    /// Full analysis.
    Analysis,
}

impl Source {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Symbols => "symbols",
            Self::Ticker => "ticker",
            Self::Chart => "chart",
            Self::Analysis => "analysis",
        }
    }
}

/// Per-source loading flags.
///
/// Sources are genuinely independent and may be loading in any combination,
/// so the flags are never collapsed into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoadingState {
    /// Symbol list is loading.
    pub symbols: bool,
    /// Ticker is loading.
    pub ticker: bool,
    /// Chart bars are loading.
    pub chart: bool,
    /// Full analysis is loading.
    pub analysis: bool,
}

impl LoadingState {
    /// Flag for one source.
    #[must_use]
    pub const fn get(&self, source: Source) -> bool {
        match source {
            Source::Symbols => self.symbols,
            Source::Ticker => self.ticker,
            Source::Chart => self.chart,
            Source::Analysis => self.analysis,
        }
    }

    /// Set the flag for one source, returning whether it changed.
    pub const fn set(&mut self, source: Source, loading: bool) -> bool {
        let flag = match source {
            Source::Symbols => &mut self.symbols,
            Source::Ticker => &mut self.ticker,
            Source::Chart => &mut self.chart,
            Source::Analysis => &mut self.analysis,
        };
        let changed = *flag != loading;
        *flag = loading;
        changed
    }

    /// Whether any source is loading.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.symbols || self.ticker || self.chart || self.analysis
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel; nothing scheduled.
    #[default]
    Idle,
    /// Opening the channel.
    Connecting,
    /// Channel established and delivering messages.
    Open,
    /// Waiting out the reconnect delay.
    Reconnecting {
        /// Reconnect attempt about to be made (1-based).
        attempt: u32,
    },
    /// Retry budget exhausted; no further automatic action.
    ClosedPermanent,
}

impl ConnectionState {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ClosedPermanent => "closed_permanent",
        }
    }

    /// Whether the channel is delivering messages.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether automatic recovery gave up.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ClosedPermanent)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Ticker Merge Policy
// =============================================================================

/// How ticker updates from the polling and push paths are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TickerMergePolicy {
    /// Last update to arrive wins.
    #[default]
    ArrivalOrder,
    /// Updates older than the displayed ticker's timestamp are dropped.
    MonotonicTimestamp,
}

impl TickerMergePolicy {
    /// Parse policy from string (`arrival` | `timestamp`).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "timestamp" | "monotonic" => Self::MonotonicTimestamp,
            _ => Self::ArrivalOrder,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ArrivalOrder => "arrival",
            Self::MonotonicTimestamp => "timestamp",
        }
    }
}
