use crate::config::Config;
use crate::reporting::fingerprint;
use crate::shared::{bar_query, resolve_engine_config, resolve_sizer, resolve_strategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span};
use veritas_domain::errors::BacktestError;
use veritas_domain::repositories::market_data::{ensure_strictly_increasing, MarketDataRepository};
use veritas_domain::services::engine::backtest::{BacktestEngine, BacktestResult};
use veritas_domain::services::strategy::{Strategy, StrategyFactory};
use veritas_domain::value_objects::bar::Bar;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub fingerprint: String,
    pub result: BacktestResult,
}

pub fn load_bars(config: &Config, market_data: &dyn MarketDataRepository) -> Result<Vec<Bar>, String> {
    let stage_start = Instant::now();
    let bars = market_data.get_bars(&bar_query(config)?)?;
    ensure_strictly_increasing(&bars)?;
    metrics::histogram!("veritas.data.load_ms").record(stage_start.elapsed().as_millis() as f64);
    info!(rows = bars.len(), symbol = %config.run.symbol, "loaded bars");
    Ok(bars)
}

/// One instrumented engine run. Every use case replays through here.
pub fn replay(
    engine: &BacktestEngine<'_>,
    bars: &[Bar],
    strategy: &mut dyn Strategy,
) -> Result<BacktestResult, BacktestError> {
    let stage_start = Instant::now();
    let result = engine.run(bars, strategy)?;
    let engine_ms = stage_start.elapsed().as_millis() as f64;
    metrics::histogram!("veritas.backtest.engine_ms").record(engine_ms);
    metrics::gauge!("veritas.backtest.bars_processed")
        .set(result.diagnostics.bars_processed as f64);
    metrics::gauge!("veritas.backtest.trades").set(result.trades.len() as f64);
    metrics::counter!("veritas.backtest.strategy_errors")
        .increment(result.diagnostics.strategy_errors as u64);
    Ok(result)
}

/// Builds a fresh strategy from `factory` and replays it.
pub fn replay_fresh(
    engine: &BacktestEngine<'_>,
    bars: &[Bar],
    factory: &dyn StrategyFactory,
) -> Result<BacktestResult, BacktestError> {
    let mut strategy = factory.create();
    replay(engine, bars, strategy.as_mut())
}

pub fn run_backtest(
    config: &Config,
    market_data: &dyn MarketDataRepository,
) -> Result<BacktestReport, String> {
    let _span = info_span!(
        "run_backtest",
        run_id = %config.run.run_id,
        symbol = %config.run.symbol,
        timeframe = %config.run.timeframe
    )
    .entered();

    let engine_config = resolve_engine_config(config)?;
    let sizer = resolve_sizer(config)?;
    let spec = resolve_strategy(config)?;
    let bars = load_bars(config, market_data)?;

    let engine = BacktestEngine::new(engine_config).with_sizer(Arc::new(sizer));
    let result = replay_fresh(&engine, &bars, &spec).map_err(|err| err.to_string())?;

    info!(
        strategy = %result.strategy,
        trades = result.trades.len(),
        net_profit = result.metrics.net_profit,
        strategy_errors = result.diagnostics.strategy_errors,
        "backtest complete"
    );

    Ok(BacktestReport {
        fingerprint: fingerprint(&result)?,
        result,
    })
}
