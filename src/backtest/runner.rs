use crate::api::{LogNotifier, PaperExchange};
use crate::backtest::metrics::ReplayReport;
use crate::config::TraderConfig;
use crate::error::TradeError;
use crate::execution::evolution::{unrealized_balance, FEE_RATE};
use crate::execution::{LatestPrice, StopPlacement, TickOutcome, Trader};
use crate::models::PriceSnapshot;
use std::sync::Arc;

/// Replays a price path through the real engine against a paper exchange
pub struct ReplayRunner {
    config: TraderConfig,
    quantity: f64,
}

impl ReplayRunner {
    pub fn new(config: TraderConfig, quantity: f64) -> Self {
        Self { config, quantity }
    }

    /// Run a replay on a fresh exchange holding a position bought at the
    /// first price of `path`
    pub async fn run(&self, path: &[PriceSnapshot]) -> Result<ReplayReport, TradeError> {
        let first = path
            .first()
            .ok_or_else(|| TradeError::Parse("empty price path".to_string()))?;

        let exchange = Arc::new(PaperExchange::new(
            first.product_id.clone(),
            self.config.price_increment,
        ));
        exchange
            .seed_position(first.price, self.quantity, first.price * self.quantity * FEE_RATE)
            .await;

        self.run_on(exchange, path).await
    }

    /// Run a replay against an already seeded exchange
    pub async fn run_on(
        &self,
        exchange: Arc<PaperExchange>,
        path: &[PriceSnapshot],
    ) -> Result<ReplayReport, TradeError> {
        let mut trader = Trader::new(
            self.config.clone(),
            exchange.clone(),
            exchange.clone(),
            Arc::new(LogNotifier),
        );
        let latest = LatestPrice::new();

        tracing::info!(
            "Starting replay: {} prices, quantity {}",
            path.len(),
            self.quantity
        );

        let mut report = ReplayReport {
            quantity: self.quantity,
            entry_price: path.first().map(|s| s.price).unwrap_or_default(),
            ..Default::default()
        };

        for snapshot in path {
            report.final_price = snapshot.price;

            let executed = exchange.on_price(snapshot.price).await;
            if let Some(fill) = executed.first() {
                if let Some(buy) = trader.state().last_buy_order.as_ref() {
                    report.realized_pnl = Some(unrealized_balance(buy, fill.price));
                }
                report.exit_price = Some(fill.price);
                trader.notify_position_closed(fill.price).await;
                break;
            }

            latest.record(snapshot.price);
            match trader.tick(&latest).await {
                Ok(TickOutcome::ModeResolved(_)) => {
                    if let Some(buy) = trader.state().last_buy_order.as_ref() {
                        report.entry_price = buy.price;
                    }
                }
                Ok(TickOutcome::Sell {
                    placement: Some(placement),
                    ..
                }) => match placement {
                    StopPlacement::Placed(order) => report.stop_history.push(order.price),
                    StopPlacement::KeptAfterCancelFailure(_) => {
                        report.kept_after_cancel_failure += 1
                    }
                },
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!("Replay tick failed: {}", e);
                    report.failed_ticks += 1;
                }
                Err(e) => return Err(e),
            }
            report.ticks += 1;
        }

        if report.exit_price.is_none() {
            if let Some(buy) = trader.state().last_buy_order.as_ref() {
                report.unrealized_pnl = Some(unrealized_balance(buy, report.final_price));
            }
        }

        tracing::info!(
            "Replay complete: {} ticks, {} stops, P&L {:.2}",
            report.ticks,
            report.stop_placements(),
            report.pnl()
        );

        Ok(report)
    }
}
