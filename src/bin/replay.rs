use clap::Parser;
use std::path::PathBuf;
use trailbot::backtest::{MarketScenario, PricePathGenerator, ReplayReport, ReplayRunner};
use trailbot::config::Settings;

/// Replay synthetic price paths through the trading engine
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Cli {
    /// Configuration file (TOML); only the [trader] section is used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed for the price paths
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Prices per path
    #[arg(long, default_value_t = 500)]
    length: usize,

    /// Size of the position held at the start of every path
    #[arg(long, default_value_t = 1.0)]
    quantity: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trailbot=warn")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let runner = ReplayRunner::new(settings.trader.clone(), cli.quantity);

    let mut results = Vec::new();
    for scenario in MarketScenario::ALL {
        let mut generator = PricePathGenerator::new(cli.seed);
        let path = generator.generate(scenario, cli.length, 10);

        match runner.run(&path).await {
            Ok(report) => {
                report.print_report(scenario.name());
                results.push((scenario.name(), report));
            }
            Err(e) => eprintln!("Replay failed for {}: {}", scenario.name(), e),
        }
    }

    print_summary(&results);
    Ok(())
}

fn print_summary(results: &[(&str, ReplayReport)]) {
    println!("\n=== SCENARIO COMPARISON ===\n");
    println!(
        "{:<15} {:>7} {:>7} {:>12} {:>10} {:>9}",
        "Scenario", "Ticks", "Stops", "Highest", "P&L", "Return"
    );

    for (name, report) in results {
        let highest = report
            .highest_stop()
            .map(|stop| format!("{:.2}", stop))
            .unwrap_or_else(|| "-".to_string());
        let status = if report.exit_price.is_some() { "" } else { " (open)" };

        println!(
            "{:<15} {:>7} {:>7} {:>12} {:>10.2} {:>8.2}%{}",
            name,
            report.ticks,
            report.stop_placements(),
            highest,
            report.pnl(),
            report.return_pct(),
            status
        );
    }
}
