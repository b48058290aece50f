//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services, the view model they
//! write into, and the port interfaces that define how the core reaches
//! the market-data service, the push feed and favorites storage.

/// Port interfaces for external systems (REST, push feed, favorites).
pub mod ports;

/// Application services for fetching, polling and session intents.
pub mod services;

/// Shared view model.
pub mod state;
