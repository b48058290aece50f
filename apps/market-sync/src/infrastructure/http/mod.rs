//! REST Adapter
//!
//! `reqwest` implementation of the market-data port against the service's
//! `/market` and `/analysis` endpoints.

mod client;

pub use client::{
    FIBONACCI_LOOKBACK_RANGE, OHLCV_LIMIT_RANGE, ORDER_BOOK_LIMIT_RANGE, RestClient,
    RestClientConfig,
};
