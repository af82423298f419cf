use crate::config::Config;
use crate::workers::normalize_workers;
use std::collections::BTreeMap;
use veritas_domain::entities::metrics::MetricsConfig;
use veritas_domain::entities::risk::FixedFractionalSizer;
use veritas_domain::repositories::market_data::BarQuery;
use veritas_domain::services::engine::backtest::BacktestConfig;
use veritas_domain::services::monte_carlo::MonteCarloConfig;
use veritas_domain::services::strategy::{StrategyFactory, StrategySpec};
use veritas_domain::services::stress::{
    ScenarioKind, ScoreWeights, Severity, StressScenario,
};
use veritas_domain::value_objects::timeframe::Timeframe;

pub const DEFAULT_BENCHMARK_STOP_PIPS: f64 = 30.0;
pub const DEFAULT_BENCHMARK_TARGET_PIPS: f64 = 60.0;
pub const DEFAULT_BENCHMARK_PROBABILITY: f64 = 0.05;
pub const BENCHMARK_PREFIX: &str = "benchmark:";

pub fn normalize_timeframe_label(value: &str) -> Result<String, String> {
    Timeframe::parse(value).map(|tf| tf.label)
}

pub fn bar_query(config: &Config) -> Result<BarQuery, String> {
    let mut query = BarQuery::new(
        config.run.symbol.clone(),
        normalize_timeframe_label(&config.run.timeframe)?,
    );
    query.start = config
        .run
        .start
        .as_deref()
        .map(parse_timestamp_seconds)
        .transpose()
        .map_err(|err| format!("run.start: {err}"))?;
    query.end = config
        .run
        .end
        .as_deref()
        .map(parse_timestamp_seconds)
        .transpose()
        .map_err(|err| format!("run.end: {err}"))?;
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(format!("run.start ({start}) is after run.end ({end})"));
        }
    }
    Ok(query)
}

fn parse_timestamp_seconds(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("timestamp cannot be empty".to_string());
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    let dt = chrono::DateTime::parse_from_rfc3339(trimmed)
        .map_err(|err| format!("invalid timestamp (expected epoch seconds or RFC3339): {err}"))?;
    Ok(dt.timestamp())
}

pub fn resolve_metrics_config(config: &Config) -> MetricsConfig {
    let risk_free_rate = config
        .metrics
        .as_ref()
        .and_then(|metrics| metrics.risk_free_rate)
        .unwrap_or(0.0);
    let annualization_factor = config
        .metrics
        .as_ref()
        .and_then(|metrics| metrics.annualization_factor);
    MetricsConfig {
        risk_free_rate,
        annualization_factor,
    }
}

pub fn resolve_engine_config(config: &Config) -> Result<BacktestConfig, String> {
    normalize_timeframe_label(&config.run.timeframe)?;
    let defaults = BacktestConfig::default();
    let instrument = config.instrument.as_ref();
    let engine = config.engine.as_ref();

    let resolved = BacktestConfig {
        run_id: config.run.run_id.clone(),
        symbol: config.run.symbol.clone(),
        initial_balance: config.run.initial_balance,
        commission_per_trade: config.costs.commission_per_trade,
        slippage_pips: config.costs.slippage_pips,
        spread_pips: config.costs.spread_pips,
        pip_size: instrument
            .and_then(|i| i.pip_size)
            .unwrap_or(defaults.pip_size),
        contract_size: instrument
            .and_then(|i| i.contract_size)
            .unwrap_or(defaults.contract_size),
        warmup_bars: engine
            .and_then(|e| e.warmup_bars)
            .unwrap_or(defaults.warmup_bars),
        signal_window: engine.and_then(|e| e.signal_window),
        default_stop_loss_pips: engine.and_then(|e| e.default_stop_loss_pips),
        default_take_profit_pips: engine.and_then(|e| e.default_take_profit_pips),
        max_concurrent_positions_per_symbol: config
            .risk
            .as_ref()
            .and_then(|r| r.max_concurrent_positions_per_symbol)
            .unwrap_or(defaults.max_concurrent_positions_per_symbol),
        metrics: resolve_metrics_config(config),
    };
    resolved.validate().map_err(|err| err.to_string())?;
    Ok(resolved)
}

pub fn resolve_sizer(config: &Config) -> Result<FixedFractionalSizer, String> {
    let defaults = FixedFractionalSizer::default();
    let risk = config.risk.as_ref();
    let sizer = FixedFractionalSizer {
        risk_fraction: risk
            .and_then(|r| r.risk_fraction_per_trade)
            .unwrap_or(defaults.risk_fraction),
        min_volume: risk.and_then(|r| r.min_volume).unwrap_or(defaults.min_volume),
        max_volume: risk.and_then(|r| r.max_volume).unwrap_or(defaults.max_volume),
    };
    if !(sizer.risk_fraction.is_finite() && sizer.risk_fraction > 0.0 && sizer.risk_fraction <= 1.0)
    {
        return Err("risk.risk_fraction_per_trade must be within (0, 1]".to_string());
    }
    if !(sizer.min_volume.is_finite() && sizer.min_volume > 0.0) {
        return Err("risk.min_volume must be > 0".to_string());
    }
    if !(sizer.max_volume.is_finite() && sizer.max_volume >= sizer.min_volume) {
        return Err("risk.max_volume must be >= risk.min_volume".to_string());
    }
    Ok(sizer)
}

pub fn resolve_strategy(config: &Config) -> Result<StrategySpec, String> {
    let spec = config
        .strategy
        .clone()
        .ok_or_else(|| "missing [strategy] section".to_string())?;
    spec.validate()?;
    Ok(spec)
}

pub fn resolve_monte_carlo_config(config: &Config) -> Result<MonteCarloConfig, String> {
    let defaults = MonteCarloConfig::default();
    let section = config.monte_carlo.as_ref();
    let resolved = MonteCarloConfig {
        iterations: section
            .and_then(|mc| mc.iterations)
            .unwrap_or(defaults.iterations),
        confidence_level: section
            .and_then(|mc| mc.confidence_level)
            .unwrap_or(defaults.confidence_level),
        min_trades: section
            .and_then(|mc| mc.min_trades)
            .unwrap_or(defaults.min_trades),
        seed: section.and_then(|mc| mc.seed).unwrap_or(defaults.seed),
    };
    resolved.validate().map_err(|err| err.to_string())?;
    Ok(resolved)
}

/// Every configured scenario, validated up front. Without a configured list
/// the full suite runs at medium severity.
pub fn resolve_scenarios(config: &Config) -> Result<Vec<StressScenario>, String> {
    let specs = config
        .stress
        .as_ref()
        .map(|stress| stress.scenarios.as_slice())
        .unwrap_or(&[]);
    if specs.is_empty() {
        return Ok([
            ScenarioKind::Volatility,
            ScenarioKind::Slippage,
            ScenarioKind::Spread,
            ScenarioKind::Gap,
            ScenarioKind::FlashCrash,
            ScenarioKind::HighVolatility,
        ]
        .into_iter()
        .map(|kind| StressScenario::new(kind, Severity::Medium))
        .collect());
    }
    specs
        .iter()
        .map(|spec| StressScenario::from_spec(spec).map_err(|err| err.to_string()))
        .collect()
}

pub fn resolve_score_weights(config: &Config) -> Result<ScoreWeights, String> {
    let defaults = ScoreWeights::default();
    let stress = config.stress.as_ref();
    let weights = ScoreWeights {
        profit: stress
            .and_then(|s| s.profit_weight)
            .unwrap_or(defaults.profit),
        drawdown: stress
            .and_then(|s| s.drawdown_weight)
            .unwrap_or(defaults.drawdown),
    };
    weights.validate().map_err(|err| err.to_string())?;
    Ok(weights)
}

pub fn resolve_stress_seed(config: &Config) -> u64 {
    config.stress.as_ref().and_then(|s| s.seed).unwrap_or(42)
}

pub fn resolve_workers(config: &Config) -> usize {
    normalize_workers(config.parallel.as_ref().and_then(|p| p.workers))
}

/// Strategies entering a comparison: the `[compare]` list, or the single
/// `[strategy]` when the list is empty.
pub fn resolve_compare_strategies(config: &Config) -> Result<Vec<StrategySpec>, String> {
    let listed = config
        .compare
        .as_ref()
        .map(|c| c.strategies.clone())
        .unwrap_or_default();
    let specs = if listed.is_empty() {
        vec![resolve_strategy(config)?]
    } else {
        listed
    };
    for spec in &specs {
        spec.validate()?;
    }
    Ok(specs)
}

pub fn resolve_include_benchmarks(config: &Config) -> bool {
    config
        .compare
        .as_ref()
        .and_then(|c| c.include_benchmarks)
        .unwrap_or(true)
}

/// Buy-and-hold plus a seeded random-entry benchmark.
pub fn benchmark_specs(config: &Config, engine: &BacktestConfig) -> Vec<StrategySpec> {
    let seed = config
        .compare
        .as_ref()
        .and_then(|c| c.benchmark_seed)
        .unwrap_or(42);
    vec![
        StrategySpec::BuyAndHold,
        StrategySpec::RandomEntry {
            probability: DEFAULT_BENCHMARK_PROBABILITY,
            seed,
            stop_loss_pips: engine
                .default_stop_loss_pips
                .unwrap_or(DEFAULT_BENCHMARK_STOP_PIPS),
            take_profit_pips: engine
                .default_take_profit_pips
                .unwrap_or(DEFAULT_BENCHMARK_TARGET_PIPS),
        },
    ]
}

/// Order-independent participant names. Specs sharing a label are told apart
/// by `#2`, `#3`... assigned in canonical (serialized) order, so the same
/// list in any order yields the same names.
pub fn participant_names(specs: &[StrategySpec], prefix: &str) -> Result<Vec<String>, String> {
    let mut groups: BTreeMap<String, Vec<(String, usize)>> = BTreeMap::new();
    for (idx, spec) in specs.iter().enumerate() {
        let canonical = serde_json::to_string(spec)
            .map_err(|err| format!("failed to serialize strategy: {err}"))?;
        groups
            .entry(format!("{prefix}{}", spec.label()))
            .or_default()
            .push((canonical, idx));
    }
    let mut names = vec![String::new(); specs.len()];
    for (label, mut members) in groups {
        members.sort();
        for (position, (_, idx)) in members.into_iter().enumerate() {
            names[idx] = if position == 0 {
                label.clone()
            } else {
                format!("{label}#{}", position + 1)
            };
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn config(extra: &str) -> Config {
        parse_config(&format!(
            r#"
[run]
run_id = "t"
symbol = "EURUSD"
timeframe = "1h"
initial_balance = 5000.0

[strategy]
kind = "flat"
{extra}
"#
        ))
        .unwrap()
    }

    #[test]
    fn engine_config_applies_defaults() {
        let resolved = resolve_engine_config(&config("")).unwrap();
        assert_eq!(resolved.warmup_bars, 50);
        assert_eq!(resolved.pip_size, 0.0001);
        assert_eq!(resolved.contract_size, 100_000.0);
        assert_eq!(resolved.initial_balance, 5_000.0);
    }

    #[test]
    fn engine_config_rejects_bad_timeframe() {
        let mut cfg = config("");
        cfg.run.timeframe = "fortnightly".to_string();
        assert!(resolve_engine_config(&cfg).is_err());
    }

    #[test]
    fn invalid_scenario_fails_resolution() {
        let cfg = config("[[stress.scenarios]]\nkind = \"volcano\"\nseverity = \"low\"\n");
        let err = resolve_scenarios(&cfg).unwrap_err();
        assert!(err.contains("volcano"));
    }

    #[test]
    fn default_suite_covers_every_kind() {
        let scenarios = resolve_scenarios(&config("")).unwrap();
        assert_eq!(scenarios.len(), 6);
        assert!(scenarios.iter().all(|s| s.severity == Severity::Medium));
    }

    #[test]
    fn sizer_rejects_inverted_volume_bounds() {
        let cfg = config("[risk]\nmin_volume = 1.0\nmax_volume = 0.5\n");
        assert!(resolve_sizer(&cfg).is_err());
    }

    #[test]
    fn compare_falls_back_to_single_strategy() {
        let specs = resolve_compare_strategies(&config("")).unwrap();
        assert_eq!(specs, vec![StrategySpec::Flat]);
        assert!(resolve_include_benchmarks(&config("")));
    }

    fn sma(fast: usize, slow: usize) -> StrategySpec {
        StrategySpec::SmaCrossover {
            fast,
            slow,
            stop_loss_pips: Some(30.0),
            take_profit_pips: Some(60.0),
        }
    }

    #[test]
    fn participant_names_follow_parameters_not_position() {
        let forward = participant_names(&[sma(3, 8), sma(10, 40)], "").unwrap();
        let reverse = participant_names(&[sma(10, 40), sma(3, 8)], "").unwrap();
        assert_eq!(
            forward,
            vec![
                "sma_crossover(3,8,sl=30,tp=60)",
                "sma_crossover(10,40,sl=30,tp=60)"
            ]
        );
        assert_eq!(reverse, vec![forward[1].clone(), forward[0].clone()]);
    }

    #[test]
    fn identical_specs_get_numbered_suffixes() {
        let names = participant_names(&[sma(3, 8), StrategySpec::Flat, sma(3, 8)], "").unwrap();
        assert_eq!(names[0], "sma_crossover(3,8,sl=30,tp=60)");
        assert_eq!(names[1], "flat");
        assert_eq!(names[2], "sma_crossover(3,8,sl=30,tp=60)#2");
    }

    #[test]
    fn benchmark_names_are_prefixed() {
        let cfg = config("");
        let engine = resolve_engine_config(&cfg).unwrap();
        let names = participant_names(&benchmark_specs(&cfg, &engine), BENCHMARK_PREFIX).unwrap();
        assert_eq!(names[0], "benchmark:buy_and_hold");
        assert!(names[1].starts_with("benchmark:random_entry(p=0.05,seed=42"));
    }

    #[test]
    fn window_bounds_accept_epoch_and_rfc3339() {
        let cfg = config_with_run("start = \"1700000000\"\nend = \"2023-11-15T00:00:00Z\"\n");
        let query = bar_query(&cfg).unwrap();
        assert_eq!(query.start, Some(1_700_000_000));
        assert_eq!(query.end, Some(1_700_006_400));
    }

    #[test]
    fn inverted_or_malformed_window_is_rejected() {
        let inverted = config_with_run("start = \"200\"\nend = \"100\"\n");
        assert!(bar_query(&inverted).unwrap_err().contains("after"));
        let garbage = config_with_run("start = \"last tuesday\"\n");
        assert!(bar_query(&garbage).unwrap_err().contains("run.start"));
    }

    fn config_with_run(window: &str) -> Config {
        parse_config(&format!(
            "[run]\nrun_id = \"t\"\nsymbol = \"EURUSD\"\ntimeframe = \"1h\"\ninitial_balance = 5000.0\n{window}"
        ))
        .unwrap()
    }
}

