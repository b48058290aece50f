//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// REST client for the market-data and analysis service.
pub mod http;

/// WebSocket ticker feed client.
pub mod push;

/// Favorites storage adapters.
pub mod favorites;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
