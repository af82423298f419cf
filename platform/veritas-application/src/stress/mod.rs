use crate::backtesting::{load_bars, replay_fresh};
use crate::config::Config;
use crate::shared::{
    resolve_engine_config, resolve_scenarios, resolve_score_weights, resolve_sizer,
    resolve_strategy, resolve_stress_seed, resolve_workers,
};
use crate::workers::{run_indexed, CancelFn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span};
use veritas_domain::entities::metrics::PerformanceMetrics;
use veritas_domain::entities::risk::RiskSizer;
use veritas_domain::errors::BacktestError;
use veritas_domain::repositories::market_data::MarketDataRepository;
use veritas_domain::services::engine::backtest::{BacktestConfig, BacktestEngine};
use veritas_domain::services::monte_carlo::iteration_seed;
use veritas_domain::services::strategy::StrategyFactory;
use veritas_domain::services::stress::{
    resistance_score, ScenarioCategory, ScenarioImpact, ScenarioKind, ScenarioParams, ScoreWeights,
    Severity, StressScenario,
};
use veritas_domain::value_objects::bar::Bar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub kind: ScenarioKind,
    pub category: ScenarioCategory,
    pub severity: Severity,
    pub params: ScenarioParams,
    pub seed: u64,
    pub metrics: PerformanceMetrics,
    pub strategy_errors: usize,
    pub impact: ScenarioImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub run_id: String,
    pub strategy: String,
    pub weights: ScoreWeights,
    pub baseline: PerformanceMetrics,
    pub scenarios: Vec<ScenarioReport>,
    pub mean_score: f64,
    pub worst_scenario: Option<String>,
    pub worst_score: Option<f64>,
}

/// Everything the suite needs besides the scenarios themselves.
pub struct StressSuite<'a> {
    pub engine_config: BacktestConfig,
    pub sizer: Arc<dyn RiskSizer>,
    pub factory: &'a dyn StrategyFactory,
    pub weights: ScoreWeights,
    pub seed: u64,
    pub workers: usize,
    pub should_cancel: Option<CancelFn<'a>>,
}

impl StressSuite<'_> {
    /// Baseline run, then one engine run per scenario on the worker pool.
    pub fn run(&self, bars: &[Bar], scenarios: &[StressScenario]) -> Result<StressReport, BacktestError> {
        self.weights.validate()?;
        let stage_start = Instant::now();

        let mut engine = BacktestEngine::new(self.engine_config.clone()).with_sizer(self.sizer.clone());
        if let Some(cancel) = self.should_cancel {
            engine = engine.with_cancel(cancel);
        }
        let baseline = replay_fresh(&engine, bars, self.factory)?;

        let reports = run_indexed(scenarios.len(), self.workers, self.should_cancel, |idx| {
            let scenario = &scenarios[idx];
            let seed = iteration_seed(self.seed, idx as u64);
            let mut engine = BacktestEngine::new(self.engine_config.clone())
                .with_sizer(self.sizer.clone())
                .with_cost_model(scenario.cost_model());
            if let Some(transform) = scenario.transform(seed) {
                engine = engine.with_transform(transform);
            }
            if let Some(cancel) = self.should_cancel {
                engine = engine.with_cancel(cancel);
            }
            let stressed = replay_fresh(&engine, bars, self.factory)?;
            Ok(ScenarioReport {
                name: scenario.name.clone(),
                kind: scenario.kind(),
                category: scenario.category(),
                severity: scenario.severity,
                params: scenario.params,
                seed,
                impact: resistance_score(
                    &baseline.metrics,
                    &stressed.metrics,
                    self.engine_config.initial_balance,
                    &self.weights,
                ),
                strategy_errors: stressed.diagnostics.strategy_errors,
                metrics: stressed.metrics,
            })
        })?;

        let mean_score = if reports.is_empty() {
            100.0
        } else {
            reports.iter().map(|r| r.impact.resistance_score).sum::<f64>() / reports.len() as f64
        };
        let worst = reports
            .iter()
            .min_by(|a, b| {
                a.impact
                    .resistance_score
                    .total_cmp(&b.impact.resistance_score)
                    .then_with(|| a.name.cmp(&b.name))
            });

        metrics::histogram!("veritas.stress.ms").record(stage_start.elapsed().as_millis() as f64);

        Ok(StressReport {
            run_id: self.engine_config.run_id.clone(),
            strategy: baseline.strategy,
            weights: self.weights,
            baseline: baseline.metrics,
            worst_scenario: worst.map(|r| r.name.clone()),
            worst_score: worst.map(|r| r.impact.resistance_score),
            mean_score,
            scenarios: reports,
        })
    }
}

pub fn run_stress_suite(
    config: &Config,
    market_data: &dyn MarketDataRepository,
) -> Result<StressReport, String> {
    let _span = info_span!(
        "run_stress_suite",
        run_id = %config.run.run_id,
        symbol = %config.run.symbol
    )
    .entered();

    // Scenario errors surface before any data is loaded or replayed.
    let scenarios = resolve_scenarios(config)?;
    let weights = resolve_score_weights(config)?;
    let engine_config = resolve_engine_config(config)?;
    let sizer = resolve_sizer(config)?;
    let spec = resolve_strategy(config)?;
    let bars = load_bars(config, market_data)?;

    let suite = StressSuite {
        engine_config,
        sizer: Arc::new(sizer),
        factory: &spec,
        weights,
        seed: resolve_stress_seed(config),
        workers: resolve_workers(config),
        should_cancel: None,
    };
    let report = suite.run(&bars, &scenarios).map_err(|err| err.to_string())?;

    info!(
        scenarios = report.scenarios.len(),
        mean_score = report.mean_score,
        worst = report.worst_scenario.as_deref().unwrap_or("-"),
        "stress suite complete"
    );
    Ok(report)
}
