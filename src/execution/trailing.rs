//! Sell-side decision rules.
//!
//! Everything here is pure: given the buy price, the resting stop (if any) and
//! the current market price, work out which stop the engine should hold.
//! `SellMode` is recomputed from those inputs on every call and never stored.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::config::{ProfitConfig, TraderConfig};

/// Whether profit trailing has started for the open position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellMode {
    WaitingForProfit,
    InProfit,
}

/// Why a stop is being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Worst-case floor placed before any profit is made
    Secure,
    /// First stop locking a gain over the buy price
    InitialProfit,
    /// Stop raised behind a rising price
    Trailing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopDecision {
    /// Replace (or create) the resting stop at `price`
    Place { price: f64, kind: StopKind },
    /// Not in profit yet; trailing starts once the market reaches `required_price`
    WaitForProfit { required_price: f64 },
    /// Price pulled back or stayed flat; the resting stop is kept
    Hold { stop_price: f64 },
}

pub fn add_percent(value: f64, percent: f64) -> f64 {
    value * (1.0 + percent / 100.0)
}

pub fn remove_percent(value: f64, percent: f64) -> f64 {
    value * (1.0 - percent / 100.0)
}

/// Snap a price to the exchange's price step, half-even like the exchange.
/// Values the step cannot express are returned unchanged.
pub fn round_to_increment(price: f64, increment: f64) -> f64 {
    let (Some(value), Some(step)) = (Decimal::from_f64(price), Decimal::from_f64(increment)) else {
        return price;
    };
    if step <= Decimal::ZERO {
        return price;
    }

    ((value / step).round() * step).to_f64().unwrap_or(price)
}

/// Market price at which profit trailing starts
pub fn profit_threshold(buy_price: f64, profit: &ProfitConfig) -> f64 {
    add_percent(buy_price, profit.entry_percent)
}

/// Classify the position.
///
/// A resting stop above the buy price means trailing already started, and that
/// sticks whatever the market does afterwards.
pub fn determine_sell_mode(
    current_price: f64,
    buy_price: f64,
    stop_price: Option<f64>,
    profit: &ProfitConfig,
) -> SellMode {
    if let Some(stop) = stop_price {
        if stop > buy_price {
            return SellMode::InProfit;
        }
    }

    if current_price >= profit_threshold(buy_price, profit) {
        return SellMode::InProfit;
    }

    SellMode::WaitingForProfit
}

/// Trailing update, only meaningful once `determine_sell_mode` says `InProfit`.
/// Prices are snapped to `price_increment`; the stop only moves when the new
/// one lands on a higher step.
pub fn trail_in_profit(
    current_price: f64,
    buy_price: f64,
    stop_price: Option<f64>,
    profit: &ProfitConfig,
    price_increment: f64,
) -> StopDecision {
    let initial_stop = StopDecision::Place {
        price: round_to_increment(
            add_percent(buy_price, profit.initial_percent),
            price_increment,
        ),
        kind: StopKind::InitialProfit,
    };

    let current_stop = match stop_price {
        None => return initial_stop,
        // still the secure floor: swap it for the profit lock
        Some(stop) if stop < buy_price => return initial_stop,
        Some(stop) => stop,
    };

    let candidate = round_to_increment(
        remove_percent(current_price, profit.trailing_percent),
        price_increment,
    );
    if candidate > current_stop && candidate - current_stop >= price_increment / 2.0 {
        StopDecision::Place {
            price: candidate,
            kind: StopKind::Trailing,
        }
    } else {
        StopDecision::Hold {
            stop_price: current_stop,
        }
    }
}

/// Full sell-side evaluation for one tick, first matching rule wins:
/// secure bootstrap, then waiting for profit, then trailing.
pub fn decide_sell(
    current_price: f64,
    buy_price: f64,
    stop_price: Option<f64>,
    config: &TraderConfig,
) -> StopDecision {
    if config.secure_stop.enabled && stop_price.is_none() {
        return StopDecision::Place {
            price: round_to_increment(
                remove_percent(current_price, config.secure_stop.percent),
                config.price_increment,
            ),
            kind: StopKind::Secure,
        };
    }

    match determine_sell_mode(current_price, buy_price, stop_price, &config.profit) {
        SellMode::WaitingForProfit => StopDecision::WaitForProfit {
            required_price: profit_threshold(buy_price, &config.profit),
        },
        SellMode::InProfit => trail_in_profit(
            current_price,
            buy_price,
            stop_price,
            &config.profit,
            config.price_increment,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;
    const TICK: f64 = 0.01;

    fn profit(entry: f64, initial: f64, trailing: f64) -> ProfitConfig {
        ProfitConfig {
            entry_percent: entry,
            initial_percent: initial,
            trailing_percent: trailing,
        }
    }

    fn config(secure: bool) -> TraderConfig {
        let mut config = TraderConfig::default();
        config.secure_stop.enabled = secure;
        config.secure_stop.percent = 3.0;
        config.profit = profit(5.0, 2.0, 3.0);
        config
    }

    fn placed_price(decision: &StopDecision) -> f64 {
        match decision {
            StopDecision::Place { price, .. } => *price,
            other => panic!("expected a placement, got {:?}", other),
        }
    }

    #[test]
    fn test_percent_helpers() {
        assert!((add_percent(100.0, 5.0) - 105.0).abs() < EPS);
        assert!((remove_percent(120.0, 3.0) - 116.4).abs() < EPS);
    }

    #[test]
    fn test_waiting_below_threshold() {
        let cfg = profit(5.0, 2.0, 3.0);
        assert_eq!(
            determine_sell_mode(104.0, 100.0, None, &cfg),
            SellMode::WaitingForProfit
        );
    }

    #[test]
    fn test_in_profit_at_or_above_threshold() {
        let cfg = profit(5.0, 2.0, 3.0);
        assert_eq!(determine_sell_mode(106.0, 100.0, None, &cfg), SellMode::InProfit);
        let threshold = profit_threshold(100.0, &cfg);
        assert_eq!(
            determine_sell_mode(threshold, 100.0, None, &cfg),
            SellMode::InProfit
        );
    }

    #[test]
    fn test_profit_mode_is_sticky_once_stop_above_entry() {
        let cfg = profit(5.0, 2.0, 3.0);
        // price collapsed below entry but the stop still locks a gain
        assert_eq!(
            determine_sell_mode(90.0, 100.0, Some(101.0), &cfg),
            SellMode::InProfit
        );
    }

    #[test]
    fn test_secure_stop_does_not_count_as_profit() {
        let cfg = profit(5.0, 2.0, 3.0);
        assert_eq!(
            determine_sell_mode(103.0, 100.0, Some(97.0), &cfg),
            SellMode::WaitingForProfit
        );
        // a stop exactly at entry is not strictly above it
        assert_eq!(
            determine_sell_mode(103.0, 100.0, Some(100.0), &cfg),
            SellMode::WaitingForProfit
        );
    }

    #[test]
    fn test_first_profit_stop_locks_initial_percent() {
        let cfg = profit(5.0, 2.0, 3.0);
        let decision = trail_in_profit(106.0, 100.0, None, &cfg, TICK);
        assert!(matches!(
            decision,
            StopDecision::Place {
                kind: StopKind::InitialProfit,
                ..
            }
        ));
        assert!((placed_price(&decision) - 102.0).abs() < EPS);
    }

    #[test]
    fn test_secure_stop_replaced_by_initial_profit_stop() {
        let cfg = profit(5.0, 2.0, 3.0);
        let decision = trail_in_profit(110.0, 100.0, Some(97.0), &cfg, TICK);
        assert!(matches!(
            decision,
            StopDecision::Place {
                kind: StopKind::InitialProfit,
                ..
            }
        ));
        assert!((placed_price(&decision) - 102.0).abs() < EPS);
    }

    #[test]
    fn test_trailing_ratchets_up() {
        let cfg = profit(5.0, 2.0, 3.0);
        let decision = trail_in_profit(120.0, 100.0, Some(110.0), &cfg, TICK);
        assert!(matches!(
            decision,
            StopDecision::Place {
                kind: StopKind::Trailing,
                ..
            }
        ));
        assert!((placed_price(&decision) - 116.4).abs() < EPS);
    }

    #[test]
    fn test_trailing_holds_on_pullback() {
        let cfg = profit(5.0, 2.0, 3.0);
        let decision = trail_in_profit(112.0, 100.0, Some(116.4), &cfg, TICK);
        assert_eq!(decision, StopDecision::Hold { stop_price: 116.4 });
    }

    #[test]
    fn test_trailing_holds_when_candidate_equals_stop() {
        let cfg = profit(5.0, 2.0, 50.0);
        // 120 - 50% = 60, same as the resting stop
        let decision = trail_in_profit(120.0, 50.0, Some(60.0), &cfg, TICK);
        assert_eq!(decision, StopDecision::Hold { stop_price: 60.0 });
    }

    #[test]
    fn test_trailing_never_lowers_stop() {
        let cfg = profit(5.0, 2.0, 3.0);
        let mut stop = 105.0;
        let prices = [106.0, 120.0, 118.0, 99.0, 125.0, 80.0, 124.0, 130.0];

        for price in prices {
            match trail_in_profit(price, 100.0, Some(stop), &cfg, TICK) {
                StopDecision::Place { price: new_stop, .. } => {
                    assert!(new_stop > stop);
                    stop = new_stop;
                }
                StopDecision::Hold { stop_price } => assert_eq!(stop_price, stop),
                other => panic!("unexpected decision {:?}", other),
            }
        }

        assert!((stop - 126.1).abs() < EPS);
    }

    #[test]
    fn test_round_to_increment() {
        assert!((round_to_increment(116.40388, 0.01) - 116.4).abs() < EPS);
        assert!((round_to_increment(97.126, 0.01) - 97.13).abs() < EPS);
        assert!((round_to_increment(1234.5, 1.0) - 1234.0).abs() < EPS);
        assert_eq!(round_to_increment(42.123, 0.0), 42.123);
    }

    #[test]
    fn test_candidate_on_same_step_holds() {
        let cfg = profit(5.0, 2.0, 3.0);
        // 120.004 and 120.005 trail to 116.40388 and 116.40485, both 116.40 on the book
        for price in [120.004, 120.005] {
            let decision = trail_in_profit(price, 100.0, Some(116.4), &cfg, TICK);
            assert_eq!(decision, StopDecision::Hold { stop_price: 116.4 });
        }

        let decision = trail_in_profit(120.02, 100.0, Some(116.4), &cfg, TICK);
        assert!((placed_price(&decision) - 116.42).abs() < EPS);
    }

    #[test]
    fn test_decide_bootstraps_secure_stop_first() {
        // even deep in profit, the secure bootstrap wins when no stop rests
        let decision = decide_sell(150.0, 100.0, None, &config(true));
        assert!(matches!(
            decision,
            StopDecision::Place {
                kind: StopKind::Secure,
                ..
            }
        ));
        assert!((placed_price(&decision) - 145.5).abs() < EPS);
    }

    #[test]
    fn test_decide_waits_with_required_price() {
        let decision = decide_sell(104.0, 100.0, Some(97.0), &config(true));
        match decision {
            StopDecision::WaitForProfit { required_price } => {
                assert!((required_price - 105.0).abs() < EPS)
            }
            other => panic!("expected WaitForProfit, got {:?}", other),
        }
    }

    #[test]
    fn test_decide_without_secure_stop_goes_straight_to_profit_lock() {
        let decision = decide_sell(106.0, 100.0, None, &config(false));
        assert!(matches!(
            decision,
            StopDecision::Place {
                kind: StopKind::InitialProfit,
                ..
            }
        ));
        assert!((placed_price(&decision) - 102.0).abs() < EPS);
    }

    #[test]
    fn test_decide_without_secure_stop_waits_without_placing() {
        let decision = decide_sell(101.0, 100.0, None, &config(false));
        assert!(matches!(decision, StopDecision::WaitForProfit { .. }));
    }
}
