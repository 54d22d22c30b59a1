use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use trailbot::api::{LogNotifier, Notifier, PaperExchange, TickerClient, WebhookNotifier};
use trailbot::config::Settings;
use trailbot::execution::{run_price_feed, run_trading_loop, LatestPrice, Trader, FEE_RATE};

/// Trailing stop-loss agent for one crypto pair
#[derive(Parser, Debug)]
#[command(name = "trailbot", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Product to trade, e.g. BTC-EUR
    #[arg(short, long)]
    product: Option<String>,

    /// Report only, never place or cancel orders
    #[arg(long)]
    visualization_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(product) = cli.product {
        settings.product.id = product;
    }
    if cli.visualization_only {
        settings.trader.visualization_only = true;
    }
    settings.validate()?;

    let product_id = settings.product.id.clone();
    tracing::info!(
        product = %product_id,
        visualization_only = settings.trader.visualization_only,
        "trailbot starting (paper exchange)"
    );

    let ticker = TickerClient::new(
        settings.feed.base_url.clone(),
        product_id.clone(),
        settings.feed.requests_per_minute,
        settings.feed.request_timeout(),
    )
    .context("Failed to build ticker client")?;

    let exchange = Arc::new(PaperExchange::new(
        product_id.clone(),
        settings.trader.price_increment,
    ));
    seed_paper_position(&settings, &ticker, &exchange).await?;

    let notifier: Arc<dyn Notifier> = match &settings.notify.webhook_url {
        Some(url) => {
            tracing::info!("Notifications go to webhook");
            Arc::new(WebhookNotifier::new(url.clone(), product_id.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    let trader = Arc::new(Mutex::new(Trader::new(
        settings.trader.clone(),
        exchange.clone(),
        exchange.clone(),
        notifier,
    )));
    let latest = Arc::new(LatestPrice::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed = tokio::spawn(run_price_feed(
        ticker,
        latest.clone(),
        settings.feed.poll_interval(),
        shutdown_rx.clone(),
    ));
    let market = tokio::spawn(run_paper_market(
        exchange,
        trader.clone(),
        latest.clone(),
        settings.feed.poll_interval(),
        shutdown_rx.clone(),
    ));
    let trading = tokio::spawn(run_trading_loop(
        trader,
        latest,
        settings.trader.tick_interval(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true).ok();

    for (name, handle) in [("feed", feed), ("market", market), ("trading", trading)] {
        if let Err(e) = handle.await {
            tracing::error!("{} task ended abnormally: {}", name, e);
        }
    }

    tracing::info!("trailbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trailbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Give the paper account the configured starting position, bought at the
/// configured entry price or the current market price
async fn seed_paper_position(
    settings: &Settings,
    ticker: &TickerClient,
    exchange: &PaperExchange,
) -> anyhow::Result<()> {
    let quantity = settings.paper.initial_quantity;
    if quantity <= 0.0 {
        tracing::info!("Paper account starts flat");
        return Ok(());
    }

    let entry_price = match settings.paper.entry_price {
        Some(price) => price,
        None => {
            ticker
                .fetch_price()
                .await
                .context("Failed to fetch entry price for paper position")?
                .price
        }
    };

    exchange
        .seed_position(entry_price, quantity, entry_price * quantity * FEE_RATE)
        .await;
    Ok(())
}

/// Show the paper exchange every price the feed records so resting stops can
/// execute, and tell the engine when its position closed
async fn run_paper_market(
    exchange: Arc<PaperExchange>,
    trader: Arc<Mutex<Trader>>,
    latest: Arc<LatestPrice>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(price) = latest.snapshot() else {
                    continue;
                };

                let executed = exchange.on_price(price).await;
                if let Some(fill) = executed.first() {
                    trader.lock().await.notify_position_closed(fill.price).await;
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
