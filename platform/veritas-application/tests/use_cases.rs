use veritas_application::backtesting::run_backtest;
use veritas_application::comparison::run_comparison;
use veritas_application::config::{parse_config, Config};
use veritas_application::monte_carlo::{resample, run_monte_carlo};
use veritas_application::stress::run_stress_suite;
use veritas_domain::repositories::market_data::{BarQuery, MarketDataRepository};
use veritas_domain::services::monte_carlo::{MonteCarloConfig, MonteCarloSimulator, MonteCarloStatus};
use veritas_domain::value_objects::bar::Bar;
use veritas_infrastructure::market_data::InMemoryMarketData;

const BASE: &str = r#"
[run]
run_id = "use_case"
symbol = "EURUSD"
timeframe = "1h"
initial_balance = 10000.0

[engine]
warmup_bars = 40

[strategy]
kind = "sma_crossover"
fast = 5
slow = 20
stop_loss_pips = 30.0
take_profit_pips = 60.0
"#;

fn config(extra: &str) -> Config {
    parse_config(&format!("{BASE}{extra}")).expect("config parses")
}

/// Oscillating hourly series so the crossover trades in both directions.
fn wave_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let close = 1.1 + 0.004 * (t / 9.0).sin() + 0.0015 * (t / 3.1).cos();
            let open = close - 0.0002 * (t / 5.0).sin();
            Bar::new(
                1_700_000_000 + i as i64 * 3_600,
                open,
                open.max(close) + 0.0006,
                open.min(close) - 0.0006,
                close,
                100.0,
            )
        })
        .collect()
}

fn repo(count: usize) -> InMemoryMarketData {
    InMemoryMarketData::new()
        .with_series("EURUSD", wave_bars(count))
        .expect("ordered series")
}

struct FailingRepo;

impl MarketDataRepository for FailingRepo {
    fn get_bars(&self, _query: &BarQuery) -> Result<Vec<Bar>, String> {
        Err("market data must not be read".to_string())
    }
}

#[test]
fn backtest_fingerprint_is_stable_across_runs() {
    let cfg = config("");
    let data = repo(600);
    let first = run_backtest(&cfg, &data).expect("first run");
    let second = run_backtest(&cfg, &data).expect("second run");

    assert!(!first.result.trades.is_empty());
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.fingerprint.len(), 64);
    assert_eq!(
        serde_json::to_string(&first.result).unwrap(),
        serde_json::to_string(&second.result).unwrap()
    );
}

#[test]
fn backtest_with_too_few_bars_fails_without_partial_result() {
    let err = run_backtest(&config(""), &repo(30)).unwrap_err();
    assert!(err.to_lowercase().contains("insufficient"), "{err}");
}

#[test]
fn missing_strategy_section_is_reported() {
    let cfg = parse_config(
        r#"
[run]
run_id = "x"
symbol = "EURUSD"
timeframe = "1h"
initial_balance = 10000.0
"#,
    )
    .unwrap();
    assert!(run_backtest(&cfg, &repo(200)).is_err());
}

#[test]
fn monte_carlo_is_independent_of_worker_count() {
    let returns: Vec<f64> = (0..40)
        .map(|i| if i % 3 == 0 { -0.008 } else { 0.006 + i as f64 * 0.0001 })
        .collect();
    let simulator = MonteCarloSimulator::new(MonteCarloConfig {
        iterations: 250,
        ..MonteCarloConfig::default()
    })
    .unwrap();

    let serial = resample(&simulator, &returns, 10_000.0, 1, None).unwrap();
    let parallel = resample(&simulator, &returns, 10_000.0, 4, None).unwrap();

    assert_eq!(serial, parallel);
    assert_eq!(serial.samples.len(), 250);
    assert!(serial.samples.iter().all(|s| s.draws == returns.len()));
}

#[test]
fn monte_carlo_cancellation_is_an_error() {
    let returns = vec![0.01; 20];
    let simulator = MonteCarloSimulator::new(MonteCarloConfig::default()).unwrap();
    let cancel: &(dyn Fn() -> bool + Sync) = &|| true;
    assert!(resample(&simulator, &returns, 10_000.0, 2, Some(cancel)).is_err());
}

#[test]
fn monte_carlo_use_case_reports_insufficient_trades() {
    let cfg = config(
        r#"
[monte_carlo]
iterations = 100
min_trades = 100000
"#,
    );
    let report = run_monte_carlo(&cfg, &repo(300)).expect("report");
    assert_eq!(report.monte_carlo.status, MonteCarloStatus::InsufficientTrades);
    assert!(report.monte_carlo.samples.is_empty());
}

#[test]
fn monte_carlo_use_case_resamples_baseline_trades() {
    let cfg = config(
        r#"
[monte_carlo]
iterations = 120
min_trades = 2
seed = 7

[parallel]
workers = 3
"#,
    );
    let report = run_monte_carlo(&cfg, &repo(600)).expect("report");
    assert!(report.monte_carlo.is_completed());
    assert_eq!(report.monte_carlo.samples.len(), 120);
    assert_eq!(report.strategy, "sma_crossover");
}

#[test]
fn invalid_scenario_fails_before_data_is_loaded() {
    let cfg = config(
        r#"
[[stress.scenarios]]
kind = "meteor_strike"
severity = "high"
"#,
    );
    let err = run_stress_suite(&cfg, &FailingRepo).unwrap_err();
    assert!(err.contains("meteor_strike"), "{err}");
}

#[test]
fn scenario_without_severity_is_rejected() {
    let cfg = config(
        r#"
[[stress.scenarios]]
kind = "gap"
"#,
    );
    assert!(run_stress_suite(&cfg, &FailingRepo).is_err());
}

#[test]
fn stress_suite_scores_every_scenario_within_bounds() {
    let cfg = config(
        r#"
[stress]
seed = 11

[[stress.scenarios]]
kind = "slippage"
severity = "high"

[[stress.scenarios]]
kind = "flash_crash"
severity = "medium"

[[stress.scenarios]]
kind = "spread"
severity = "low"
"#,
    );
    let data = repo(600);
    let report = run_stress_suite(&cfg, &data).expect("stress report");

    assert_eq!(report.scenarios.len(), 3);
    for scenario in &report.scenarios {
        let score = scenario.impact.resistance_score;
        assert!((0.0..=100.0).contains(&score), "{}: {score}", scenario.name);
    }
    assert!(report.worst_scenario.is_some());

    let again = run_stress_suite(&cfg, &data).unwrap();
    assert_eq!(report, again);
}

#[test]
fn comparison_includes_benchmarks_by_default() {
    let cfg = config("");
    let report = run_comparison(&cfg, &repo(400)).expect("comparison");
    let names: Vec<&str> = report
        .comparison
        .participants
        .iter()
        .map(|p| p.name.as_str())
        .collect();

    assert_eq!(names.len(), 3);
    assert!(names.contains(&"sma_crossover(5,20,sl=30,tp=60)"));
    assert!(names.contains(&"benchmark:buy_and_hold"));
    assert!(names.contains(&"benchmark:random_entry(p=0.05,seed=42,sl=30,tp=60)"));
    for participant in &report.comparison.participants {
        assert_eq!(participant.benchmark, participant.name.starts_with("benchmark:"));
    }
}

#[test]
fn user_random_entry_does_not_clash_with_benchmark() {
    let cfg = config(
        r#"
[compare]
benchmark_seed = 42

[[compare.strategies]]
kind = "random_entry"
probability = 0.05
seed = 42
stop_loss_pips = 30.0
take_profit_pips = 60.0
"#,
    );
    let report = run_comparison(&cfg, &repo(400)).expect("comparison");
    let user = report
        .comparison
        .get("random_entry(p=0.05,seed=42,sl=30,tp=60)")
        .expect("user strategy keeps its own name");
    let benchmark = report
        .comparison
        .get("benchmark:random_entry(p=0.05,seed=42,sl=30,tp=60)")
        .expect("benchmark is prefixed");
    assert!(!user.benchmark);
    assert!(benchmark.benchmark);
    assert_eq!(user.score, benchmark.score);
}

#[test]
fn comparison_keeps_same_kind_strategies_apart_in_any_order() {
    let short = r#"
[[compare.strategies]]
kind = "sma_crossover"
fast = 3
slow = 8
stop_loss_pips = 30.0
take_profit_pips = 60.0
"#;
    let long = r#"
[[compare.strategies]]
kind = "sma_crossover"
fast = 10
slow = 40
stop_loss_pips = 30.0
take_profit_pips = 60.0
"#;
    let header = "\n[compare]\ninclude_benchmarks = false\n";
    let forward = config(&format!("{header}{short}{long}"));
    let reverse = config(&format!("{header}{long}{short}"));

    let data = repo(500);
    let a = run_comparison(&forward, &data).unwrap().comparison;
    let b = run_comparison(&reverse, &data).unwrap().comparison;

    let short_name = "sma_crossover(3,8,sl=30,tp=60)";
    let long_name = "sma_crossover(10,40,sl=30,tp=60)";
    for name in [short_name, long_name] {
        let first = a.get(name).expect("named in forward order");
        let second = b.get(name).expect("named in reverse order");
        assert_eq!(first.rank, second.rank, "{name}");
        assert_eq!(first.score, second.score, "{name}");
        assert_eq!(first.metrics, second.metrics, "{name}");
    }
    assert_eq!(a.best, b.best);
    assert_eq!(a.participants.len(), 2);
}

fn windowed(start: Option<&str>, end: Option<&str>) -> Config {
    let mut cfg = config("");
    cfg.run.start = start.map(str::to_string);
    cfg.run.end = end.map(str::to_string);
    cfg
}

#[test]
fn run_window_limits_the_replayed_bars() {
    let data = repo(600);
    let full = run_backtest(&config(""), &data).expect("full run");
    let limited = run_backtest(&windowed(None, Some("1700720000")), &data).expect("windowed run");
    assert!(limited.result.diagnostics.bars_processed < full.result.diagnostics.bars_processed);
    assert_ne!(limited.fingerprint, full.fingerprint);

    let too_short = windowed(Some("1700000000"), Some("2023-11-15T08:13:20Z"));
    let err = run_backtest(&too_short, &data).unwrap_err();
    assert!(err.to_lowercase().contains("insufficient"), "{err}");
}
