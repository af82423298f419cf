use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use veritas_domain::services::strategy::StrategySpec;
use veritas_domain::services::stress::ScenarioSpec;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub costs: CostsConfig,
    pub instrument: Option<InstrumentConfig>,
    pub risk: Option<RiskConfig>,
    pub engine: Option<EngineConfig>,
    pub metrics: Option<MetricsConfig>,
    pub strategy: Option<StrategySpec>,
    pub monte_carlo: Option<MonteCarloConfig>,
    pub stress: Option<StressConfig>,
    pub compare: Option<CompareConfig>,
    pub parallel: Option<ParallelConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub initial_balance: f64,
    /// Inclusive window bounds, epoch seconds or RFC3339.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CostsConfig {
    #[serde(default)]
    pub commission_per_trade: f64,
    #[serde(default)]
    pub slippage_pips: f64,
    #[serde(default)]
    pub spread_pips: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    pub pip_size: Option<f64>,
    pub contract_size: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    pub risk_fraction_per_trade: Option<f64>,
    pub max_concurrent_positions_per_symbol: Option<usize>,
    pub min_volume: Option<f64>,
    pub max_volume: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub warmup_bars: Option<usize>,
    pub signal_window: Option<usize>,
    pub default_stop_loss_pips: Option<f64>,
    pub default_take_profit_pips: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    pub risk_free_rate: Option<f64>,
    pub annualization_factor: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MonteCarloConfig {
    pub iterations: Option<usize>,
    pub confidence_level: Option<f64>,
    pub min_trades: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StressConfig {
    pub seed: Option<u64>,
    pub profit_weight: Option<f64>,
    pub drawdown_weight: Option<f64>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CompareConfig {
    pub include_benchmarks: Option<bool>,
    pub benchmark_seed: Option<u64>,
    #[serde(default)]
    pub strategies: Vec<StrategySpec>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ParallelConfig {
    pub workers: Option<usize>,
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = parse_config(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}

pub fn parse_config(contents: &str) -> Result<Config, String> {
    toml::from_str(contents).map_err(|err| err.to_string())
}

pub fn to_toml_pretty(config: &Config) -> Result<String, String> {
    toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config as TOML: {err}"))
}
