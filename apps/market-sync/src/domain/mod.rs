//! Domain Layer - Core market data and view-model types.
//!
//! This layer contains pure value types with serialization support and no
//! I/O. Everything above it (application services, adapters) is expressed
//! in these types.

/// Market data payloads (symbols, tickers, bars, analysis).
pub mod market;

/// View-model primitives (selection, generation, loading, connection state).
pub mod view;
