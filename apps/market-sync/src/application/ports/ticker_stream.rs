//! Ticker Stream Port (Driven Port)
//!
//! Push delivery of ticker updates for one symbol at a time. The WebSocket
//! push client is the production adapter; it writes ticks straight into the
//! view model.

use async_trait::async_trait;

use crate::domain::market::Symbol;
use crate::domain::view::ConnectionState;

/// Port for a single-symbol push ticker feed.
#[async_trait]
pub trait TickerStreamPort: Send + Sync {
    /// Bind the feed to `symbol`.
    ///
    /// An already bound feed (to any symbol, including the same one) is
    /// disconnected first; the retry budget starts from zero.
    async fn connect(&self, symbol: Symbol);

    /// Close the feed without scheduling any reconnection.
    async fn disconnect(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}
