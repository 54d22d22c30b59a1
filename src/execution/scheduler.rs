use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::error::TradeError;
use crate::execution::price_feed::LatestPrice;
use crate::execution::trader::{TickOutcome, Trader};

/// What happened to one timer fire
#[derive(Debug)]
pub enum TickRun {
    /// A previous tick still held the engine
    Skipped,
    Completed(TickOutcome),
    Failed(TradeError),
}

/// Run one tick if no other tick is in progress. Never waits for the gate.
pub async fn run_tick(trader: &Mutex<Trader>, latest: &LatestPrice) -> TickRun {
    let mut trader = match trader.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            tracing::warn!("Previous tick still running, skipping this one");
            return TickRun::Skipped;
        }
    };

    match trader.tick(latest).await {
        Ok(outcome) => {
            tracing::debug!(mode = %trader.mode(), "Tick done");
            TickRun::Completed(outcome)
        }
        Err(e) if e.is_transient() => {
            tracing::warn!(mode = %trader.mode(), "Tick aborted: {}", e);
            TickRun::Failed(e)
        }
        Err(e) => {
            tracing::error!(mode = %trader.mode(), "Tick failed: {}", e);
            TickRun::Failed(e)
        }
    }
}

/// Fire ticks at a fixed interval until shutdown. Each tick runs on its own
/// task so a slow one does not hold the timer; overlapping fires are dropped.
pub async fn run_trading_loop(
    trader: Arc<Mutex<Trader>>,
    latest: Arc<LatestPrice>,
    tick_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        interval_ms = tick_interval.as_millis() as u64,
        "Trading loop starting"
    );

    let mut timer = tokio::time::interval(tick_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let trader = trader.clone();
                let latest = latest.clone();
                tokio::spawn(async move {
                    run_tick(&trader, &latest).await;
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Trading loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LogNotifier, PaperExchange};
    use crate::config::TraderConfig;
    use crate::execution::trader::TradingMode;

    fn trader(exchange: &Arc<PaperExchange>) -> Arc<Mutex<Trader>> {
        Arc::new(Mutex::new(Trader::new(
            TraderConfig::default(),
            exchange.clone(),
            exchange.clone(),
            Arc::new(LogNotifier),
        )))
    }

    #[tokio::test]
    async fn test_tick_runs_when_gate_is_free() {
        let exchange = Arc::new(PaperExchange::new("BTC-EUR", 0.01));
        let trader = trader(&exchange);
        let latest = LatestPrice::new();
        latest.record(100.0);

        let run = run_tick(&trader, &latest).await;

        assert!(matches!(
            run,
            TickRun::Completed(TickOutcome::ModeResolved(TradingMode::Buying))
        ));
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let exchange = Arc::new(PaperExchange::new("BTC-EUR", 0.01));
        let trader = trader(&exchange);
        let latest = LatestPrice::new();
        latest.record(100.0);

        let held = trader.lock().await;
        let run = run_tick(&trader, &latest).await;
        assert!(matches!(run, TickRun::Skipped));
        assert_eq!(held.mode(), TradingMode::NoOrder);
        drop(held);

        // the skipped fire was not queued
        assert_eq!(trader.lock().await.mode(), TradingMode::NoOrder);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let exchange = Arc::new(PaperExchange::new("BTC-EUR", 0.01));
        exchange.seed_position(100.0, 1.0, 0.0).await;
        let trader = trader(&exchange);
        let latest = Arc::new(LatestPrice::new());
        latest.record(100.0);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_trading_loop(
            trader.clone(),
            latest,
            Duration::from_millis(10),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // resolved into selling, then placed the secure stop
        let trader = trader.lock().await;
        assert_eq!(trader.mode(), TradingMode::Selling);
        assert!(trader.state().stop_order.is_some());
    }
}
