use crate::entities::metrics::{mean, sample_std};
use crate::errors::BacktestError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const PERCENTILES: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub iterations: usize,
    pub confidence_level: f64,
    pub min_trades: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            confidence_level: 0.95,
            min_trades: 10,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.iterations == 0 {
            return Err(BacktestError::InvalidConfig(
                "monte_carlo.iterations must be >= 1".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(BacktestError::InvalidConfig(
                "monte_carlo.confidence_level must be within (0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonteCarloStatus {
    Completed,
    InsufficientTrades,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSample {
    pub iteration: usize,
    pub final_equity: f64,
    pub max_drawdown_pct: f64,
    pub draws: usize,
    pub ruined: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentilePoint {
    pub percentile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawdownSummary {
    pub mean: f64,
    pub median: f64,
    pub worst: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub status: MonteCarloStatus,
    pub iterations: usize,
    pub confidence_level: f64,
    pub trade_count: usize,
    pub min_trades: usize,
    pub starting_balance: f64,
    pub samples: Vec<MonteCarloSample>,
    pub mean_final_equity: f64,
    pub median_final_equity: f64,
    pub std_final_equity: f64,
    pub percentiles: Vec<PercentilePoint>,
    pub confidence_interval: ConfidenceInterval,
    pub drawdown: DrawdownSummary,
    pub probability_of_loss: f64,
    pub probability_of_ruin: f64,
}

impl MonteCarloResult {
    pub fn is_completed(&self) -> bool {
        self.status == MonteCarloStatus::Completed
    }
}

/// Bootstrap resampler over a run's per-trade returns.
///
/// Every iteration draws from its own generator, seeded from the run seed
/// and the iteration index, so iterations can be computed in any order or on
/// any thread and still summarize to the same result.
#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    config: MonteCarloConfig,
}

impl MonteCarloSimulator {
    pub fn new(config: MonteCarloConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    pub fn has_enough_trades(&self, returns: &[f64]) -> bool {
        returns.len() >= self.config.min_trades.max(1)
    }

    /// One bootstrap path: `returns.len()` draws with replacement folded
    /// onto `starting_balance`.
    pub fn path(&self, returns: &[f64], starting_balance: f64, iteration: usize) -> MonteCarloSample {
        let mut rng = StdRng::seed_from_u64(iteration_seed(self.config.seed, iteration as u64));
        let mut equity = starting_balance;
        let mut peak = starting_balance;
        let mut max_drawdown_pct: f64 = 0.0;
        let mut ruined = false;

        for _ in 0..returns.len() {
            equity += returns[rng.gen_range(0..returns.len())];
            if equity <= 0.0 {
                ruined = true;
            }
            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                max_drawdown_pct = max_drawdown_pct.max((peak - equity) / peak);
            }
        }

        MonteCarloSample {
            iteration,
            final_equity: equity,
            max_drawdown_pct,
            draws: returns.len(),
            ruined,
        }
    }

    pub fn insufficient(&self, trade_count: usize, starting_balance: f64) -> MonteCarloResult {
        MonteCarloResult {
            status: MonteCarloStatus::InsufficientTrades,
            iterations: self.config.iterations,
            confidence_level: self.config.confidence_level,
            trade_count,
            min_trades: self.config.min_trades,
            starting_balance,
            samples: Vec::new(),
            mean_final_equity: 0.0,
            median_final_equity: 0.0,
            std_final_equity: 0.0,
            percentiles: Vec::new(),
            confidence_interval: ConfidenceInterval {
                level: self.config.confidence_level,
                ..ConfidenceInterval::default()
            },
            drawdown: DrawdownSummary::default(),
            probability_of_loss: 0.0,
            probability_of_ruin: 0.0,
        }
    }

    /// Folds finished samples into the summary. Samples are re-ordered by
    /// iteration first, so callers may pass them in completion order.
    pub fn summarize(
        &self,
        trade_count: usize,
        starting_balance: f64,
        mut samples: Vec<MonteCarloSample>,
    ) -> MonteCarloResult {
        samples.sort_by_key(|sample| sample.iteration);

        let mut finals: Vec<f64> = samples.iter().map(|s| s.final_equity).collect();
        let mut drawdowns: Vec<f64> = samples.iter().map(|s| s.max_drawdown_pct).collect();
        finals.sort_by(f64::total_cmp);
        drawdowns.sort_by(f64::total_cmp);

        let count = samples.len().max(1) as f64;
        let losses = samples
            .iter()
            .filter(|s| s.final_equity < starting_balance)
            .count();
        let ruins = samples.iter().filter(|s| s.ruined).count();

        let tail = (1.0 - self.config.confidence_level) / 2.0 * 100.0;

        MonteCarloResult {
            status: MonteCarloStatus::Completed,
            iterations: samples.len(),
            confidence_level: self.config.confidence_level,
            trade_count,
            min_trades: self.config.min_trades,
            starting_balance,
            mean_final_equity: mean(&finals),
            median_final_equity: percentile_sorted(&finals, 50.0),
            std_final_equity: sample_std(&finals),
            percentiles: PERCENTILES
                .iter()
                .map(|p| PercentilePoint {
                    percentile: *p,
                    value: percentile_sorted(&finals, *p),
                })
                .collect(),
            confidence_interval: ConfidenceInterval {
                level: self.config.confidence_level,
                lower: percentile_sorted(&finals, tail),
                upper: percentile_sorted(&finals, 100.0 - tail),
            },
            drawdown: DrawdownSummary {
                mean: mean(&drawdowns),
                median: percentile_sorted(&drawdowns, 50.0),
                worst: drawdowns.last().copied().unwrap_or(0.0),
            },
            probability_of_loss: losses as f64 / count,
            probability_of_ruin: ruins as f64 / count,
            samples,
        }
    }

    /// Serial reference implementation of the whole resampling run.
    pub fn simulate(&self, returns: &[f64], starting_balance: f64) -> MonteCarloResult {
        if !self.has_enough_trades(returns) {
            return self.insufficient(returns.len(), starting_balance);
        }
        let samples = (0..self.config.iterations)
            .map(|iteration| self.path(returns, starting_balance, iteration))
            .collect();
        self.summarize(returns.len(), starting_balance, samples)
    }
}

/// Resamples with the default seed and minimum trade count.
pub fn simulate(
    trade_returns: &[f64],
    starting_balance: f64,
    iterations: usize,
    confidence_level: f64,
) -> Result<MonteCarloResult, BacktestError> {
    let simulator = MonteCarloSimulator::new(MonteCarloConfig {
        iterations,
        confidence_level,
        ..MonteCarloConfig::default()
    })?;
    Ok(simulator.simulate(trade_returns, starting_balance))
}

/// SplitMix64 finalizer over the run seed and iteration index.
pub fn iteration_seed(seed: u64, iteration: u64) -> u64 {
    let mut z = seed.wrapping_add(iteration.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Linear interpolation between closest ranks of an ascending slice.
pub fn percentile_sorted(sorted: &[f64], percentile: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (percentile / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
