use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::api::TickerClient;

/// Bit pattern of a NaN; `record` never stores NaN so it can mark "no price yet"
const UNSET: u64 = u64::MAX;

/// Last traded price seen by the feed.
///
/// Written by the feed task, read once at the start of every tick. Stored as
/// raw f64 bits in one atomic so a reader always gets a whole value.
#[derive(Debug)]
pub struct LatestPrice {
    bits: AtomicU64,
}

impl LatestPrice {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(UNSET),
        }
    }

    /// Store a new price. Non-finite or non-positive values are dropped.
    pub fn record(&self, price: f64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(price, "Ignoring invalid price from feed");
            return false;
        }

        self.bits.store(price.to_bits(), Ordering::Release);
        tracing::debug!(price, "New ticker value");
        true
    }

    pub fn snapshot(&self) -> Option<f64> {
        match self.bits.load(Ordering::Acquire) {
            UNSET => None,
            bits => Some(f64::from_bits(bits)),
        }
    }
}

impl Default for LatestPrice {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the ticker and keep `latest` up to date until shutdown.
/// Never runs trading logic itself.
pub async fn run_price_feed(
    client: TickerClient,
    latest: Arc<LatestPrice>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        product = %client.product_id(),
        interval_ms = poll_interval.as_millis() as u64,
        "Price feed starting"
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match client.fetch_price().await {
                    Ok(snapshot) => {
                        latest.record(snapshot.price);
                    }
                    Err(e) => {
                        tracing::warn!("Price fetch failed: {}", e);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Price feed stopped");
}
