//! Decision engine.
//!
//! ```text
//! NoOrder ──resolve──> Selling   (holdings > 0 and a buy fill exists)
//!    │                  │
//!    └──resolve──> Buying        (flat, or holdings without a buy fill)
//!                       │
//! Selling ──stop executed──> NoOrder
//! ```
//!
//! All state lives in one `TraderState` owned by the `Trader`; it is only
//! touched from inside a tick (or the notifications a tick triggers).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::api::{BalanceReader, Notifier, OrderGateway};
use crate::config::{CancelFailurePolicy, TraderConfig};
use crate::error::TradeError;
use crate::execution::evolution::{unrealized_balance, Evolution};
use crate::execution::price_feed::LatestPrice;
use crate::execution::trailing::{decide_sell, StopDecision, StopKind};
use crate::models::{BuyOrder, Fill, StopOrder, TradeSide};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TradingMode {
    /// Situation unknown: startup, or a position just closed
    #[default]
    NoOrder,
    /// Flat, waiting to buy (buy placement is not exercised)
    Buying,
    /// Holding a position and managing its protective stop
    Selling,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::NoOrder => write!(f, "NO_ORDER"),
            TradingMode::Buying => write!(f, "BUYING"),
            TradingMode::Selling => write!(f, "SELLING"),
        }
    }
}

/// Everything the engine remembers between ticks
#[derive(Debug, Clone, Default)]
pub struct TraderState {
    pub mode: TradingMode,
    pub last_buy_order: Option<BuyOrder>,
    pub stop_order: Option<StopOrder>,
    /// A cancel of `stop_order` failed: it may or may not still rest
    pub stop_unconfirmed: bool,
}

/// Result of the stop placement primitive
#[derive(Debug, Clone, PartialEq)]
pub enum StopPlacement {
    Placed(StopOrder),
    /// Old stop could not be cancelled and is still the recorded stop
    KeptAfterCancelFailure(StopOrder),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No price received yet
    AwaitingPrice,
    /// Mode resolution ran and settled on this mode
    ModeResolved(TradingMode),
    /// Buying is a placeholder; nothing done
    BuyPending,
    /// Visualization-only: reported, orders untouched
    Observed(Evolution),
    Sell {
        evolution: Evolution,
        decision: StopDecision,
        placement: Option<StopPlacement>,
    },
}

pub struct Trader {
    config: TraderConfig,
    gateway: Arc<dyn OrderGateway>,
    balances: Arc<dyn BalanceReader>,
    notifier: Arc<dyn Notifier>,
    state: TraderState,
}

impl Trader {
    pub fn new(
        config: TraderConfig,
        gateway: Arc<dyn OrderGateway>,
        balances: Arc<dyn BalanceReader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            gateway,
            balances,
            notifier,
            state: TraderState::default(),
        }
    }

    pub fn state(&self) -> &TraderState {
        &self.state
    }

    pub fn mode(&self) -> TradingMode {
        self.state.mode
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    /// One scheduled tick. Reads the latest price once and works on that value.
    pub async fn tick(&mut self, latest: &LatestPrice) -> Result<TickOutcome, TradeError> {
        match latest.snapshot() {
            Some(price) => self.tick_at(price).await,
            None => {
                tracing::info!("Awaiting first price before trading");
                Ok(TickOutcome::AwaitingPrice)
            }
        }
    }

    /// Mode dispatch for a tick at `current_price`
    pub async fn tick_at(&mut self, current_price: f64) -> Result<TickOutcome, TradeError> {
        match self.state.mode {
            TradingMode::NoOrder => {
                tracing::info!("Mode unknown - resolving trading mode");
                let mode = self.resolve_mode().await?;
                Ok(TickOutcome::ModeResolved(mode))
            }
            TradingMode::Buying => {
                tracing::info!(price = current_price, "Mode BUYING");
                Ok(TickOutcome::BuyPending)
            }
            TradingMode::Selling => {
                let evolution = self.report_evolution(current_price)?;
                if self.config.visualization_only {
                    return Ok(TickOutcome::Observed(evolution));
                }

                let (decision, placement) = self.sell_tick(current_price).await?;
                Ok(TickOutcome::Sell {
                    evolution,
                    decision,
                    placement,
                })
            }
        }
    }

    /// Work out the mode from the account: an existing buy fill with coins in
    /// the wallet resumes selling, anything else waits to buy. Running it twice
    /// against the same account gives the same result.
    pub async fn resolve_mode(&mut self) -> Result<TradingMode, TradeError> {
        let holdings = self.bounded("holdings", self.balances.holdings()).await?;

        if holdings > 0.0 {
            tracing::info!(holdings, "Coins in wallet, looking for last buy fill");
            let fills = self
                .bounded("recent_fills", self.gateway.recent_fills(Some(TradeSide::Buy)))
                .await?;

            if let Some(fill) = latest_buy_fill(&fills) {
                tracing::info!(
                    trade_id = fill.trade_id,
                    price = fill.price,
                    "Found last buy fill, resuming position"
                );
                let order = fill.to_buy_order();
                self.notify_new_order(order).await;
                return Ok(self.state.mode);
            }

            tracing::warn!(holdings, "Coins in wallet but no buy fill found");
        }

        tracing::info!("No position to manage, switching to BUYING");
        self.state.mode = TradingMode::Buying;
        Ok(self.state.mode)
    }

    /// A buy fill became known: start managing it
    pub async fn notify_new_order(&mut self, order: BuyOrder) {
        tracing::info!(
            order_id = %order.order_id,
            price = order.price,
            quantity = order.quantity,
            "New position"
        );
        self.notify(&format!(
            "NEW ORDER - handling buy of {} @ {:.2} (fees {:.2})",
            order.quantity, order.price, order.fees
        ))
        .await;

        match self.bounded("holdings", self.balances.holdings()).await {
            Ok(holdings) => tracing::info!(holdings, "Balance refreshed"),
            Err(e) => tracing::warn!("Balance refresh failed: {}", e),
        }

        self.state.last_buy_order = Some(order);
        self.state.mode = TradingMode::Selling;
    }

    /// The resting stop executed: forget the position and re-resolve next tick
    pub async fn notify_position_closed(&mut self, exit_price: f64) {
        let result = self
            .state
            .last_buy_order
            .as_ref()
            .map(|buy| unrealized_balance(buy, exit_price));

        match result {
            Some(balance) => {
                tracing::info!(exit_price, balance, "Position closed");
                self.notify(&format!(
                    "POSITION CLOSED - sold @ {:.2}, result {:.2}",
                    exit_price, balance
                ))
                .await;
            }
            None => tracing::warn!(exit_price, "Position closed but no buy order was recorded"),
        }

        self.state = TraderState::default();
    }

    /// Single mutator of the current stop: cancel the resting one, then place
    /// a stop for the full holdings at `price`.
    pub async fn place_stop(&mut self, price: f64) -> Result<StopPlacement, TradeError> {
        if let Some(current) = self.state.stop_order.take() {
            let cancelled = self
                .bounded("cancel_order", self.gateway.cancel_order(&current.id))
                .await;

            match cancelled {
                Ok(()) => {}
                Err(TradeError::OrderNotFound(_)) => {
                    tracing::warn!(
                        order_id = %current.id,
                        stop_price = current.price,
                        "Stop no longer on the exchange, placing new one"
                    );
                }
                Err(e) => match self.config.cancel_failure_policy {
                    CancelFailurePolicy::Abort => {
                        tracing::error!(
                            order_id = %current.id,
                            stop_price = current.price,
                            "Cancel failed, keeping resting stop: {}",
                            e
                        );
                        self.notify(&format!(
                            "ALERT - could not cancel stop {} @ {:.2}, new stop @ {:.2} not placed",
                            current.id, current.price, price
                        ))
                        .await;
                        self.state.stop_order = Some(current.clone());
                        self.state.stop_unconfirmed = true;
                        return Ok(StopPlacement::KeptAfterCancelFailure(current));
                    }
                    CancelFailurePolicy::Proceed => {
                        tracing::warn!(
                            order_id = %current.id,
                            "Cancel failed, placing new stop anyway: {}",
                            e
                        );
                    }
                },
            }
        }

        let quantity = self.bounded("holdings", self.balances.holdings()).await?;
        let order = self
            .bounded(
                "place_stop_sell",
                self.gateway.place_stop_sell(quantity, price),
            )
            .await?;

        tracing::info!(
            order_id = %order.id,
            stop_price = order.price,
            quantity = order.quantity,
            "Stop order placed"
        );
        self.notify(&format!(
            "STOP SELL ORDER placed @ {:.2} for {} coins",
            order.price, order.quantity
        ))
        .await;

        self.state.stop_order = Some(order.clone());
        self.state.stop_unconfirmed = false;
        Ok(StopPlacement::Placed(order))
    }

    /// After a failed cancel, ask the exchange whether the recorded stop still
    /// rests. A stop that is gone is forgotten so the rules bootstrap a new one.
    async fn confirm_stop(&mut self) -> Result<(), TradeError> {
        if !self.state.stop_unconfirmed {
            return Ok(());
        }

        if let Some(order_id) = self.state.stop_order.as_ref().map(|stop| stop.id.clone()) {
            let open = self
                .bounded("is_order_open", self.gateway.is_order_open(&order_id))
                .await?;
            if !open {
                tracing::warn!(order_id = %order_id, "Recorded stop is gone from the exchange");
                self.state.stop_order = None;
            }
        }

        self.state.stop_unconfirmed = false;
        Ok(())
    }

    fn report_evolution(&self, current_price: f64) -> Result<Evolution, TradeError> {
        let buy = self
            .state
            .last_buy_order
            .as_ref()
            .ok_or(TradeError::MissingBuyOrder)?;

        let evolution = Evolution::compute(buy, current_price);
        tracing::info!("Price evolution: {}", evolution);
        Ok(evolution)
    }

    async fn sell_tick(
        &mut self,
        current_price: f64,
    ) -> Result<(StopDecision, Option<StopPlacement>), TradeError> {
        let buy_price = self
            .state
            .last_buy_order
            .as_ref()
            .map(|buy| buy.price)
            .ok_or(TradeError::MissingBuyOrder)?;
        self.confirm_stop().await?;
        let stop_price = self.state.stop_order.as_ref().map(|stop| stop.price);

        let decision = decide_sell(current_price, buy_price, stop_price, &self.config);
        let placement = match &decision {
            StopDecision::Place { price, kind } => {
                match kind {
                    StopKind::Secure => tracing::info!(stop_price = price, "Placing secure stop"),
                    StopKind::InitialProfit => {
                        tracing::info!(stop_price = price, "In profit, locking initial gain")
                    }
                    StopKind::Trailing => {
                        tracing::info!(stop_price = price, "Raising trailing stop")
                    }
                }
                Some(self.place_stop(*price).await?)
            }
            StopDecision::WaitForProfit { required_price } => {
                tracing::debug!(required_price, "Not enough profit yet");
                None
            }
            StopDecision::Hold { stop_price } => {
                tracing::info!(stop_price, "Price pulling back, keeping stop");
                None
            }
        };

        Ok((decision, placement))
    }

    async fn notify(&self, message: &str) {
        if let Err(e) = self.bounded("notify", self.notifier.notify(message)).await {
            tracing::warn!("Notification dropped: {}", e);
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, TradeError>>,
    ) -> Result<T, TradeError> {
        let timeout = self.config.call_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TradeError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Most recent buy fill: highest trade id wins
pub fn latest_buy_fill(fills: &[Fill]) -> Option<&Fill> {
    fills
        .iter()
        .filter(|fill| fill.side == TradeSide::Buy)
        .max_by_key(|fill| fill.trade_id)
}
