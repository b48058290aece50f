//! Push Channel Adapter
//!
//! WebSocket client for the per-symbol ticker feed.
//!
//! - `client`: Connection lifecycle and message dispatch
//! - `codec`: JSON envelope decoding
//! - `reconnect`: Fixed-delay reconnection budget

pub mod client;
pub mod codec;
pub mod reconnect;

pub use client::{ChannelError, PushChannelClient, PushClientConfig, PushEvent};
pub use reconnect::ReconnectConfig;
