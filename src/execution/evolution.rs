use std::fmt;

use crate::models::BuyOrder;

/// Exchange taker fee applied to the hypothetical sell. Fixed by the fee schedule.
pub const FEE_RATE: f64 = 0.0025;

/// Informational snapshot of an open position at the current price.
/// Has no effect on order state.
#[derive(Debug, Clone, PartialEq)]
pub struct Evolution {
    pub buy_price: f64,
    pub buy_fees: f64,
    pub quantity: f64,
    pub current_price: f64,
    /// Net result if everything were sold at `current_price` now
    pub balance: f64,
    /// Price change since the buy, in percent
    pub percent: f64,
}

impl Evolution {
    pub fn compute(buy: &BuyOrder, current_price: f64) -> Self {
        Self {
            buy_price: buy.price,
            buy_fees: buy.fees,
            quantity: buy.quantity,
            current_price,
            balance: unrealized_balance(buy, current_price),
            percent: percent_difference(current_price, buy.price),
        }
    }
}

impl fmt::Display for Evolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bought {:.2} (fee {:.2}) - now {:.2} - balance {:.2} - evolution {:.2}%",
            self.buy_price, self.buy_fees, self.current_price, self.balance, self.percent
        )
    }
}

/// Sell proceeds at `current_price` minus what the position cost, fees included
pub fn unrealized_balance(buy: &BuyOrder, current_price: f64) -> f64 {
    let sell_fee = buy.quantity * current_price * FEE_RATE;
    let proceeds = buy.quantity * current_price - sell_fee;
    let cost = buy.quantity * buy.price + buy.fees;
    proceeds - cost
}

pub fn percent_difference(current: f64, reference: f64) -> f64 {
    (current - reference) / reference * 100.0
}
