// Decision engine, its pure rules and the tasks that drive it
pub mod evolution;
pub mod price_feed;
pub mod scheduler;
pub mod trader;
pub mod trailing;

pub use evolution::{Evolution, FEE_RATE};
pub use price_feed::{run_price_feed, LatestPrice};
pub use scheduler::{run_tick, run_trading_loop, TickRun};
pub use trader::{StopPlacement, TickOutcome, Trader, TraderState, TradingMode};
pub use trailing::{decide_sell, SellMode, StopDecision, StopKind};
