use crate::backtesting::{load_bars, replay_fresh};
use crate::config::Config;
use crate::shared::{
    benchmark_specs, participant_names, resolve_compare_strategies, resolve_engine_config,
    resolve_include_benchmarks, resolve_sizer, resolve_workers, BENCHMARK_PREFIX,
};
use crate::workers::{run_indexed, CancelFn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span};
use veritas_domain::entities::risk::RiskSizer;
use veritas_domain::errors::BacktestError;
use veritas_domain::repositories::market_data::MarketDataRepository;
use veritas_domain::services::comparison::{score_participants, ComparisonResult, ParticipantRun};
use veritas_domain::services::engine::backtest::{BacktestConfig, BacktestEngine};
use veritas_domain::services::strategy::StrategyFactory;
use veritas_domain::value_objects::bar::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run_id: String,
    pub bars: usize,
    pub include_benchmarks: bool,
    pub comparison: ComparisonResult,
}

pub struct Participant<'a> {
    pub name: String,
    pub factory: &'a dyn StrategyFactory,
    pub benchmark: bool,
}

/// Replays every participant on the same bars and starting balance, then
/// scores them against each other.
pub fn compare(
    bars: &[Bar],
    engine_config: &BacktestConfig,
    sizer: Arc<dyn RiskSizer>,
    participants: &[Participant<'_>],
    workers: usize,
    should_cancel: Option<CancelFn<'_>>,
) -> Result<ComparisonResult, BacktestError> {
    let stage_start = Instant::now();
    let runs = run_indexed(participants.len(), workers, should_cancel, |idx| {
        let participant = &participants[idx];
        let mut engine = BacktestEngine::new(engine_config.clone()).with_sizer(sizer.clone());
        if let Some(cancel) = should_cancel {
            engine = engine.with_cancel(cancel);
        }
        let result = replay_fresh(&engine, bars, participant.factory)?;
        Ok(ParticipantRun {
            name: participant.name.clone(),
            benchmark: participant.benchmark,
            metrics: result.metrics,
        })
    })?;
    let result = score_participants(runs);
    metrics::histogram!("veritas.compare.ms").record(stage_start.elapsed().as_millis() as f64);
    Ok(result)
}

pub fn run_comparison(
    config: &Config,
    market_data: &dyn MarketDataRepository,
) -> Result<ComparisonReport, String> {
    let _span = info_span!(
        "run_comparison",
        run_id = %config.run.run_id,
        symbol = %config.run.symbol
    )
    .entered();

    let engine_config = resolve_engine_config(config)?;
    let sizer = resolve_sizer(config)?;
    let strategies = resolve_compare_strategies(config)?;
    let include_benchmarks = resolve_include_benchmarks(config);
    let benchmarks = if include_benchmarks {
        benchmark_specs(config, &engine_config)
    } else {
        Vec::new()
    };
    let bars = load_bars(config, market_data)?;

    let strategy_names = participant_names(&strategies, "")?;
    let benchmark_names = participant_names(&benchmarks, BENCHMARK_PREFIX)?;
    let participants: Vec<Participant<'_>> = strategies
        .iter()
        .zip(strategy_names)
        .map(|(spec, name)| Participant {
            name,
            factory: spec,
            benchmark: false,
        })
        .chain(
            benchmarks
                .iter()
                .zip(benchmark_names)
                .map(|(spec, name)| Participant {
                    name,
                    factory: spec,
                    benchmark: true,
                }),
        )
        .collect();

    let comparison = compare(
        &bars,
        &engine_config,
        Arc::new(sizer),
        &participants,
        resolve_workers(config),
        None,
    )
    .map_err(|err| err.to_string())?;

    info!(
        participants = comparison.participants.len(),
        best = comparison.best.as_deref().unwrap_or("-"),
        skipped_metrics = comparison.skipped_metrics.len(),
        "comparison complete"
    );

    Ok(ComparisonReport {
        run_id: config.run.run_id.clone(),
        bars: bars.len(),
        include_benchmarks,
        comparison,
    })
}
