//! Collaborators of the decision engine.
//!
//! The engine only sees the traits below. `paper` implements the exchange side
//! in memory, `ticker` feeds prices from the public REST ticker and `webhook`
//! posts notifications.

pub mod paper;
pub mod ticker;
pub mod webhook;

use async_trait::async_trait;

use crate::error::TradeError;
use crate::models::{Fill, StopOrder, TradeSide};

pub use paper::{PaperExchange, PaperOperation};
pub use ticker::TickerClient;
pub use webhook::WebhookNotifier;

/// Places and cancels orders, reports fills for the traded product
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Fills for the product, optionally restricted to one side
    async fn recent_fills(&self, side: Option<TradeSide>) -> Result<Vec<Fill>, TradeError>;

    /// Rest a stop-sell for `quantity` triggering at `stop_price`.
    /// The returned order carries the price the exchange accepted.
    async fn place_stop_sell(&self, quantity: f64, stop_price: f64)
        -> Result<StopOrder, TradeError>;

    /// Fails with `TradeError::OrderNotFound` when no such order is open
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradeError>;

    /// Whether the order still rests on the book
    async fn is_order_open(&self, order_id: &str) -> Result<bool, TradeError>;
}

/// Reports holdings of the traded (base) asset
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn holdings(&self) -> Result<f64, TradeError>;
}

/// Best-effort side channel. Callers log and drop failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), TradeError>;
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<(), TradeError> {
        tracing::info!(target: "trailbot::notify", "{}", message);
        Ok(())
    }
}
