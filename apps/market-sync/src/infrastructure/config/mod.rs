//! Configuration Module
//!
//! Configuration loading for the sync core.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_API_BASE_URL, FeedSettings, ServiceSettings, SyncConfig, derive_ws_base,
};
