//! Static configuration, loaded once at startup.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`trailbot.toml` unless `--config` says otherwise)
//! 3. environment variables such as `TRAILBOT_TRADER__TICK_INTERVAL_MS=5000`
//!    or `TRAILBOT_TRADER__PROFIT__TRAILING_PERCENT=1.5`

use anyhow::Context;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "trailbot.toml";
const ENV_PREFIX: &str = "TRAILBOT";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a percentage between 0 and 100 (got {value})")]
    PercentOutOfRange { field: &'static str, value: f64 },

    #[error("trader.profit.initial_percent ({initial}) must be below trader.profit.entry_percent ({entry})")]
    InitialNotBelowEntry { initial: f64, entry: f64 },

    #[error("product id must not be empty")]
    EmptyProduct,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub product: ProductSettings,
    pub trader: TraderConfig,
    pub feed: FeedSettings,
    pub notify: NotifySettings,
    pub paper: PaperSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSettings {
    /// Exchange product, e.g. "BTC-EUR"
    pub id: String,
}

impl Default for ProductSettings {
    fn default() -> Self {
        Self {
            id: "BTC-EUR".to_string(),
        }
    }
}

/// What the stop placement primitive does when the old stop cannot be cancelled
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelFailurePolicy {
    /// Keep the old (still resting) stop, skip the new one, alert
    #[default]
    Abort,
    /// Forget the old stop and place the new one anyway
    Proceed,
}

/// Decision engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub tick_interval_ms: u64,
    /// Run the decision logic and reports but never touch orders
    pub visualization_only: bool,
    /// Upper bound for any single collaborator call
    pub call_timeout_ms: u64,
    pub cancel_failure_policy: CancelFailurePolicy,
    /// Smallest price step of the product; stops are placed on this grid
    pub price_increment: f64,
    pub secure_stop: SecureStopConfig,
    pub profit: ProfitConfig,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10_000,
            visualization_only: false,
            call_timeout_ms: 10_000,
            cancel_failure_policy: CancelFailurePolicy::Abort,
            price_increment: 0.01,
            secure_stop: SecureStopConfig::default(),
            profit: ProfitConfig::default(),
        }
    }
}

impl TraderConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureStopConfig {
    pub enabled: bool,
    /// Distance below the current price of the bootstrap stop
    pub percent: f64,
}

impl Default for SecureStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percent: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitConfig {
    /// Rise over the buy price needed before trailing starts
    pub entry_percent: f64,
    /// Gain over the buy price locked by the first profit stop
    pub initial_percent: f64,
    /// Distance kept between the market price and the trailing stop
    pub trailing_percent: f64,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            entry_percent: 1.5,
            initial_percent: 0.8,
            trailing_percent: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub requests_per_minute: u32,
    pub request_timeout_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.coinbase.com".to_string(),
            poll_interval_ms: 2_000,
            requests_per_minute: 60,
            request_timeout_ms: 5_000,
        }
    }
}

impl FeedSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Incoming webhook; notifications only go to the log when unset
    pub webhook_url: Option<String>,
}

/// Paper exchange used in place of a signed exchange client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    /// Base asset already held at startup (0 = start flat)
    pub initial_quantity: f64,
    /// Price the seeded position was bought at; first feed price when unset
    pub entry_price: Option<f64>,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            initial_quantity: 0.0,
            entry_price: None,
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_from(
            path,
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_from(path: Option<&Path>, env: Environment) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration values")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.product.id.trim().is_empty() {
            return Err(ConfigError::EmptyProduct);
        }

        let trader = &self.trader;
        positive("trader.tick_interval_ms", trader.tick_interval_ms as f64)?;
        positive("trader.call_timeout_ms", trader.call_timeout_ms as f64)?;
        if trader.secure_stop.enabled {
            percent("trader.secure_stop.percent", trader.secure_stop.percent)?;
        }
        percent("trader.profit.entry_percent", trader.profit.entry_percent)?;
        percent("trader.profit.initial_percent", trader.profit.initial_percent)?;
        percent("trader.profit.trailing_percent", trader.profit.trailing_percent)?;
        if trader.profit.initial_percent >= trader.profit.entry_percent {
            return Err(ConfigError::InitialNotBelowEntry {
                initial: trader.profit.initial_percent,
                entry: trader.profit.entry_percent,
            });
        }
        positive("trader.price_increment", trader.price_increment)?;

        positive("feed.poll_interval_ms", self.feed.poll_interval_ms as f64)?;
        positive("feed.requests_per_minute", self.feed.requests_per_minute as f64)?;
        if self.paper.initial_quantity < 0.0 {
            return Err(ConfigError::NotPositive {
                field: "paper.initial_quantity",
            });
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field })
    }
}

fn percent(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 100.0 {
        Ok(())
    } else {
        Err(ConfigError::PercentOutOfRange { field, value })
    }
}
