use serde::Serialize;

/// Outcome of replaying one price path through the engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    /// Engine ticks run (the tick that saw the exit is not counted)
    pub ticks: usize,
    /// Ticks aborted by a transient collaborator failure
    pub failed_ticks: usize,
    pub entry_price: f64,
    pub quantity: f64,
    pub final_price: f64,
    /// Every stop price the exchange accepted, in placement order
    pub stop_history: Vec<f64>,
    /// Placements skipped because the old stop could not be cancelled
    pub kept_after_cancel_failure: usize,
    pub exit_price: Option<f64>,
    /// Net of buy and sell fees; `None` while the position is still open
    pub realized_pnl: Option<f64>,
    /// Net result if sold at the final price, for a position still open
    pub unrealized_pnl: Option<f64>,
}

impl ReplayReport {
    pub fn stop_placements(&self) -> usize {
        self.stop_history.len()
    }

    pub fn highest_stop(&self) -> Option<f64> {
        self.stop_history.iter().copied().reduce(f64::max)
    }

    /// Realized if closed, unrealized otherwise
    pub fn pnl(&self) -> f64 {
        self.realized_pnl.or(self.unrealized_pnl).unwrap_or(0.0)
    }

    pub fn return_pct(&self) -> f64 {
        let invested = self.entry_price * self.quantity;
        if invested > 0.0 {
            self.pnl() / invested * 100.0
        } else {
            0.0
        }
    }

    /// Once the stop is above the entry it never moves down
    pub fn stops_monotonic_in_profit(&self) -> bool {
        self.stop_history
            .windows(2)
            .all(|pair| pair[0] <= self.entry_price || pair[1] >= pair[0])
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self, scenario_name: &str) {
        println!("\n=== REPLAY: {} ===", scenario_name);
        println!("  Ticks:                 {} ({} failed)", self.ticks, self.failed_ticks);
        println!(
            "  Entry:                 {:.2} x {}",
            self.entry_price, self.quantity
        );
        println!("  Final price:           {:.2}", self.final_price);
        println!("  Stop placements:       {}", self.stop_placements());
        if let Some(highest) = self.highest_stop() {
            println!("  Highest stop:          {:.2}", highest);
        }
        if self.kept_after_cancel_failure > 0 {
            println!(
                "  Cancel failures:       {}",
                self.kept_after_cancel_failure
            );
        }

        match self.exit_price {
            Some(exit) => println!("  Exit:                  stopped out @ {:.2}", exit),
            None => println!("  Exit:                  still open"),
        }
        println!(
            "  P&L:                   {:.2} ({:+.2}%)",
            self.pnl(),
            self.return_pct()
        );
    }
}
