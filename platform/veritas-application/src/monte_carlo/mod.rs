use crate::backtesting::{load_bars, replay_fresh};
use crate::config::Config;
use crate::shared::{
    resolve_engine_config, resolve_monte_carlo_config, resolve_sizer, resolve_strategy,
    resolve_workers,
};
use crate::workers::{run_indexed, CancelFn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn};
use veritas_domain::entities::metrics::PerformanceMetrics;
use veritas_domain::errors::BacktestError;
use veritas_domain::repositories::market_data::MarketDataRepository;
use veritas_domain::services::engine::backtest::BacktestEngine;
use veritas_domain::services::monte_carlo::{MonteCarloResult, MonteCarloSimulator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub run_id: String,
    pub strategy: String,
    pub baseline: PerformanceMetrics,
    pub monte_carlo: MonteCarloResult,
}

/// Resamples on the worker pool. Per-iteration seeding makes the output
/// independent of the worker count.
pub fn resample(
    simulator: &MonteCarloSimulator,
    returns: &[f64],
    starting_balance: f64,
    workers: usize,
    should_cancel: Option<CancelFn<'_>>,
) -> Result<MonteCarloResult, BacktestError> {
    if !simulator.has_enough_trades(returns) {
        return Ok(simulator.insufficient(returns.len(), starting_balance));
    }
    let stage_start = Instant::now();
    let samples = run_indexed(simulator.config().iterations, workers, should_cancel, |iteration| {
        Ok(simulator.path(returns, starting_balance, iteration))
    })?;
    let result = simulator.summarize(returns.len(), starting_balance, samples);
    metrics::histogram!("veritas.monte_carlo.ms").record(stage_start.elapsed().as_millis() as f64);
    Ok(result)
}

pub fn run_monte_carlo(
    config: &Config,
    market_data: &dyn MarketDataRepository,
) -> Result<MonteCarloReport, String> {
    let _span = info_span!(
        "run_monte_carlo",
        run_id = %config.run.run_id,
        symbol = %config.run.symbol
    )
    .entered();

    let engine_config = resolve_engine_config(config)?;
    let sizer = resolve_sizer(config)?;
    let spec = resolve_strategy(config)?;
    let mc_config = resolve_monte_carlo_config(config)?;
    let simulator = MonteCarloSimulator::new(mc_config).map_err(|err| err.to_string())?;
    let workers = resolve_workers(config);
    let bars = load_bars(config, market_data)?;

    let engine = BacktestEngine::new(engine_config).with_sizer(Arc::new(sizer));
    let baseline = replay_fresh(&engine, &bars, &spec).map_err(|err| err.to_string())?;
    let returns = baseline.trade_returns();

    let monte_carlo = resample(&simulator, &returns, baseline.initial_balance, workers, None)
        .map_err(|err| err.to_string())?;
    if monte_carlo.is_completed() {
        info!(
            iterations = monte_carlo.iterations,
            trades = returns.len(),
            median_final_equity = monte_carlo.median_final_equity,
            probability_of_loss = monte_carlo.probability_of_loss,
            "monte carlo complete"
        );
    } else {
        warn!(
            trades = returns.len(),
            min_trades = mc_config.min_trades,
            "too few trades to resample"
        );
    }

    Ok(MonteCarloReport {
        run_id: config.run.run_id.clone(),
        strategy: baseline.strategy,
        baseline: baseline.metrics,
        monte_carlo,
    })
}
