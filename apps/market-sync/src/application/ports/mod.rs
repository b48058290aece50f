//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataPort`: REST access to the market-data and analysis service
//! - `TickerStreamPort`: Push ticker feed for the selected symbol
//! - `FavoritesStore`: Persistence of favorite symbols

mod favorites;
mod market_data;
mod ticker_stream;

#[cfg(test)]
pub use market_data::MockMarketDataPort;
pub use favorites::{FavoritesError, FavoritesStore, toggle_in};
pub use market_data::{ANALYSIS_FAILURE_MESSAGE, FetchError, MarketDataPort};
pub use ticker_stream::TickerStreamPort;
