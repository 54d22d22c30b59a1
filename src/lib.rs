// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;

// Re-export commonly used types
pub use api::{BalanceReader, LogNotifier, Notifier, OrderGateway, PaperExchange};
pub use config::Settings;
pub use error::TradeError;
pub use execution::{LatestPrice, Trader, TradingMode};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TradeError>;
