pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::ReplayReport;
pub use runner::ReplayRunner;
pub use synthetic::{MarketScenario, PricePathGenerator};
