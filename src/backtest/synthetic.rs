use crate::models::PriceSnapshot;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for replayed ticker paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady climb with small noise
    Uptrend,
    /// Steady decline with small noise
    Downtrend,
    /// Mean-reverting chop around the start price
    Sideways,
    /// Large swings in both directions
    Volatile,
    /// Sharp rally in the first half, collapse in the second
    PumpAndDump,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 5] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::PumpAndDump,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "uptrend",
            MarketScenario::Downtrend => "downtrend",
            MarketScenario::Sideways => "sideways",
            MarketScenario::Volatile => "volatile",
            MarketScenario::PumpAndDump => "pump-and-dump",
        }
    }
}

/// Generates seeded ticker paths for replays
pub struct PricePathGenerator {
    rng: StdRng,
    base_price: f64,
    product_id: String,
}

impl PricePathGenerator {
    /// Same seed, same path
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            product_id: "SYNTH-EUR".to_string(),
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// One snapshot per `interval_secs`, ending now
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_ticks: usize,
        interval_secs: i64,
    ) -> Vec<PriceSnapshot> {
        let start_time = Utc::now() - Duration::seconds(num_ticks as i64 * interval_secs);

        let prices = match scenario {
            MarketScenario::Uptrend => self.trend(num_ticks, 0.002),
            MarketScenario::Downtrend => self.trend(num_ticks, -0.002),
            MarketScenario::Sideways => self.sideways(num_ticks),
            MarketScenario::Volatile => self.volatile(num_ticks),
            MarketScenario::PumpAndDump => self.pump_and_dump(num_ticks),
        };

        prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| {
                let timestamp = start_time + Duration::seconds(i as i64 * interval_secs);
                self.snapshot(price, timestamp)
            })
            .collect()
    }

    fn trend(&mut self, num_ticks: usize, drift: f64) -> Vec<f64> {
        let mut prices = Vec::with_capacity(num_ticks);
        let mut current_price = self.base_price;

        for _ in 0..num_ticks {
            prices.push(current_price);
            // noise kept below the drift so the trend dominates
            let noise = self.rng.gen_range(-0.001..0.001);
            current_price *= 1.0 + drift + noise;
        }

        prices
    }

    fn sideways(&mut self, num_ticks: usize) -> Vec<f64> {
        let mut prices = Vec::with_capacity(num_ticks);
        let mut current_price = self.base_price;
        let mean_price = self.base_price;

        for _ in 0..num_ticks {
            prices.push(current_price);
            let reversion = (mean_price - current_price) * 0.1;
            let noise = current_price * self.rng.gen_range(-0.005..0.005);
            current_price += reversion + noise;
        }

        prices
    }

    fn volatile(&mut self, num_ticks: usize) -> Vec<f64> {
        let mut prices = Vec::with_capacity(num_ticks);
        let mut current_price = self.base_price;

        for _ in 0..num_ticks {
            prices.push(current_price);
            current_price += current_price * self.rng.gen_range(-0.04..0.04);
            current_price = current_price.max(self.base_price * 0.5);
        }

        prices
    }

    fn pump_and_dump(&mut self, num_ticks: usize) -> Vec<f64> {
        let mut prices = Vec::with_capacity(num_ticks);
        let mut current_price = self.base_price;
        let half = (num_ticks / 2).max(1) as f64;

        for i in 0..num_ticks {
            prices.push(current_price);
            let noise = self.rng.gen_range(-0.002..0.002);
            if (i as f64) < half {
                // +40% over the first half
                current_price *= 1.0 + 0.4 / half + noise;
            } else {
                // -50% over the second half
                current_price *= 1.0 - 0.5 / half + noise;
            }
        }

        prices
    }

    fn snapshot(&self, price: f64, timestamp: DateTime<Utc>) -> PriceSnapshot {
        PriceSnapshot {
            product_id: self.product_id.clone(),
            price,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_last(path: &[PriceSnapshot]) -> (f64, f64) {
        (path.first().unwrap().price, path.last().unwrap().price)
    }

    #[test]
    fn test_generate_uptrend() {
        let mut gen = PricePathGenerator::new(42);
        let path = gen.generate(MarketScenario::Uptrend, 300, 10);

        assert_eq!(path.len(), 300);
        let (first, last) = first_last(&path);
        assert_eq!(first, 100.0);
        assert!(last > first, "Uptrend should end higher: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = PricePathGenerator::new(42);
        let path = gen.generate(MarketScenario::Downtrend, 300, 10);

        let (first, last) = first_last(&path);
        assert!(last < first, "Downtrend should end lower: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_sideways_stays_near_base() {
        let mut gen = PricePathGenerator::new(42);
        let base = gen.base_price();
        let path = gen.generate(MarketScenario::Sideways, 500, 10);

        for snapshot in &path {
            assert!(
                snapshot.price > base * 0.9 && snapshot.price < base * 1.1,
                "Sideways should stay near base: {} vs {}",
                snapshot.price,
                base
            );
        }
    }

    #[test]
    fn test_pump_and_dump_peaks_mid_path() {
        let mut gen = PricePathGenerator::new(7);
        let path = gen.generate(MarketScenario::PumpAndDump, 200, 10);

        let peak = path.iter().map(|s| s.price).fold(f64::MIN, f64::max);
        let (first, last) = first_last(&path);
        assert!(peak > first * 1.3);
        assert!(last < peak * 0.75);
    }

    #[test]
    fn test_same_seed_same_path() {
        let a = PricePathGenerator::new(9).generate(MarketScenario::Volatile, 50, 10);
        let b = PricePathGenerator::new(9).generate(MarketScenario::Volatile, 50, 10);

        let a: Vec<f64> = a.iter().map(|s| s.price).collect();
        let b: Vec<f64> = b.iter().map(|s| s.price).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_timestamps_are_sequential() {
        let mut gen = PricePathGenerator::new(42);
        let path = gen.generate(MarketScenario::Uptrend, 100, 10);

        for pair in path.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }
}
