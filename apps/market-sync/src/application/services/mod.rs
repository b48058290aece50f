//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `FetchOrchestrator`: Concurrent ticker/OHLCV/analysis fetch cycle
//! - `PeriodicRefresher`: Fixed-interval ticker polling
//! - `DashboardSession`: Maps presentation intents onto the above

mod orchestrator;
mod refresher;
mod session;

pub use orchestrator::FetchOrchestrator;
pub use refresher::{DEFAULT_REFRESH_INTERVAL, PeriodicRefresher};
pub use session::{DashboardSession, SessionError, SessionSettings};
