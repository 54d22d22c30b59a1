//! In-memory exchange for paper trading and replays.
//!
//! Implements both `OrderGateway` and `BalanceReader`. Stop-sell orders rest
//! until `on_price` sees the market fall to them, then sell at the stop price.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BalanceReader, OrderGateway};
use crate::error::TradeError;
use crate::execution::evolution::FEE_RATE;
use crate::execution::trailing::round_to_increment;
use crate::models::{Fill, StopOrder, TradeSide};

/// Operations that can be made to fail once, to rehearse outages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOperation {
    Holdings,
    Fills,
    Place,
    Cancel,
}

#[derive(Debug, Default)]
struct PaperBook {
    holdings: f64,
    fills: Vec<Fill>,
    stops: Vec<StopOrder>,
    last_price: Option<f64>,
    next_trade_id: u64,
    failures: Vec<PaperOperation>,
}

impl PaperBook {
    fn take_failure(&mut self, operation: PaperOperation) -> bool {
        match self.failures.iter().position(|f| *f == operation) {
            Some(index) => {
                self.failures.remove(index);
                true
            }
            None => false,
        }
    }

    fn next_trade_id(&mut self) -> u64 {
        self.next_trade_id += 1;
        self.next_trade_id
    }
}

pub struct PaperExchange {
    product_id: String,
    quote_increment: f64,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(product_id: impl Into<String>, quote_increment: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quote_increment: if quote_increment > 0.0 {
                quote_increment
            } else {
                0.01
            },
            book: Mutex::new(PaperBook::default()),
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Record a buy fill and credit the holdings, as if bought before startup
    pub async fn seed_position(&self, price: f64, quantity: f64, fee: f64) -> Fill {
        let mut book = self.book.lock().await;
        let fill = Fill {
            trade_id: book.next_trade_id(),
            order_id: Uuid::new_v4().to_string(),
            product_id: self.product_id.clone(),
            side: TradeSide::Buy,
            price,
            size: quantity,
            fee,
            created_at: Utc::now(),
        };

        book.holdings += quantity;
        book.fills.push(fill.clone());

        tracing::info!(price, quantity, "Paper position seeded");
        fill
    }

    /// Feed a market price; executes every stop at or above it.
    /// Returns the sell fills produced.
    pub async fn on_price(&self, price: f64) -> Vec<Fill> {
        let mut book = self.book.lock().await;
        book.last_price = Some(price);

        let (triggered, resting): (Vec<StopOrder>, Vec<StopOrder>) = book
            .stops
            .drain(..)
            .partition(|stop| price <= stop.price);
        book.stops = resting;

        let mut executed = Vec::with_capacity(triggered.len());
        for stop in triggered {
            let quantity = stop.quantity.min(book.holdings);
            if quantity <= 0.0 {
                continue;
            }

            let fill = Fill {
                trade_id: book.next_trade_id(),
                order_id: stop.id.clone(),
                product_id: self.product_id.clone(),
                side: TradeSide::Sell,
                price: stop.price,
                size: quantity,
                fee: quantity * stop.price * FEE_RATE,
                created_at: Utc::now(),
            };

            book.holdings -= quantity;
            book.fills.push(fill.clone());
            tracing::info!(
                order_id = %stop.id,
                stop_price = stop.price,
                market = price,
                quantity,
                "Paper stop order executed"
            );
            executed.push(fill);
        }

        executed
    }

    /// Make the next call of `operation` fail
    pub async fn fail_next(&self, operation: PaperOperation) {
        self.book.lock().await.failures.push(operation);
    }

    pub async fn resting_stops(&self) -> Vec<StopOrder> {
        self.book.lock().await.stops.clone()
    }

    pub async fn fills(&self) -> Vec<Fill> {
        self.book.lock().await.fills.clone()
    }

    /// Round to the product's quote increment (half-even, like the exchange's formatter)
    fn round_price(&self, price: f64) -> f64 {
        round_to_increment(price, self.quote_increment)
    }
}

#[async_trait]
impl BalanceReader for PaperExchange {
    async fn holdings(&self) -> Result<f64, TradeError> {
        let mut book = self.book.lock().await;
        if book.take_failure(PaperOperation::Holdings) {
            return Err(TradeError::Gateway("simulated accounts outage".to_string()));
        }
        Ok(book.holdings)
    }
}

#[async_trait]
impl OrderGateway for PaperExchange {
    async fn recent_fills(&self, side: Option<TradeSide>) -> Result<Vec<Fill>, TradeError> {
        let mut book = self.book.lock().await;
        if book.take_failure(PaperOperation::Fills) {
            return Err(TradeError::Gateway("simulated fills outage".to_string()));
        }

        Ok(book
            .fills
            .iter()
            .filter(|fill| side.map_or(true, |s| fill.side == s))
            .cloned()
            .collect())
    }

    async fn place_stop_sell(
        &self,
        quantity: f64,
        stop_price: f64,
    ) -> Result<StopOrder, TradeError> {
        let mut book = self.book.lock().await;
        if book.take_failure(PaperOperation::Place) {
            return Err(TradeError::Gateway("simulated order outage".to_string()));
        }

        if quantity.is_nan() || quantity <= 0.0 || stop_price.is_nan() || stop_price <= 0.0 {
            return Err(TradeError::Rejected(format!(
                "invalid stop order {} @ {}",
                quantity, stop_price
            )));
        }

        let price = self.round_price(stop_price);

        if let Some(market) = book.last_price {
            if price >= market {
                return Err(TradeError::Rejected(format!(
                    "stop price {:.2} is not below market {:.2}",
                    price, market
                )));
            }
        }

        let reserved: f64 = book.stops.iter().map(|stop| stop.quantity).sum();
        let available = book.holdings - reserved;
        if quantity > available + f64::EPSILON {
            return Err(TradeError::Rejected(format!(
                "insufficient funds: {} requested, {} available",
                quantity, available
            )));
        }

        let order = StopOrder {
            id: Uuid::new_v4().to_string(),
            price,
            quantity,
            created_at: Utc::now(),
        };
        book.stops.push(order.clone());

        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradeError> {
        let mut book = self.book.lock().await;
        if book.take_failure(PaperOperation::Cancel) {
            return Err(TradeError::Gateway("simulated cancel outage".to_string()));
        }

        let before = book.stops.len();
        book.stops.retain(|stop| stop.id != order_id);
        if book.stops.len() == before {
            return Err(TradeError::OrderNotFound(order_id.to_string()));
        }

        Ok(())
    }

    async fn is_order_open(&self, order_id: &str) -> Result<bool, TradeError> {
        let book = self.book.lock().await;
        Ok(book.stops.iter().any(|stop| stop.id == order_id))
    }
}
