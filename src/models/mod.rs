use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a trade or order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A filled trade reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub trade_id: u64,
    pub order_id: String,
    pub product_id: String,
    pub side: TradeSide,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    pub created_at: DateTime<Utc>,
}

impl Fill {
    /// View this fill as the buy order that opened a position
    pub fn to_buy_order(&self) -> BuyOrder {
        BuyOrder {
            order_id: self.order_id.clone(),
            trade_id: self.trade_id,
            price: self.price,
            quantity: self.size,
            fees: self.fee,
        }
    }
}

/// The filled buy that opened the current position.
/// Captured once and never modified while the position is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyOrder {
    pub order_id: String,
    pub trade_id: u64,
    pub price: f64,
    pub quantity: f64,
    pub fees: f64,
}

/// A resting protective stop-sell order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopOrder {
    pub id: String,
    pub price: f64,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
}

/// Simple price snapshot - just price and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub product_id: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_maps_to_buy_order() {
        let fill = Fill {
            trade_id: 42,
            order_id: "abc".to_string(),
            product_id: "BTC-EUR".to_string(),
            side: TradeSide::Buy,
            price: 100.0,
            size: 0.5,
            fee: 0.125,
            created_at: Utc::now(),
        };

        let order = fill.to_buy_order();
        assert_eq!(order.trade_id, 42);
        assert_eq!(order.order_id, "abc");
        assert_eq!(order.price, 100.0);
        assert_eq!(order.quantity, 0.5);
        assert_eq!(order.fees, 0.125);
    }

    #[test]
    fn test_trade_side_serializes_lowercase() {
        let json = serde_json::to_string(&TradeSide::Sell).unwrap();
        assert_eq!(json, "\"sell\"");
    }
}
