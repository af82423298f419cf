pub mod transforms;

use crate::entities::metrics::PerformanceMetrics;
use crate::errors::BacktestError;
use crate::services::engine::execution::{CostModel, MarketTransform};
use crate::value_objects::bar::Bar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const DEFAULT_RECOVERY_FRACTION: f64 = 0.5;
const DEFAULT_WINDOW_FRACTION: f64 = 0.10;
const SCORE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn pick(self, low: f64, medium: f64, high: f64) -> f64 {
        match self {
            Self::Low => low,
            Self::Medium => medium,
            Self::High => high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCategory {
    Stress,
    EdgeCase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Volatility,
    Slippage,
    Spread,
    Gap,
    FlashCrash,
    HighVolatility,
}

impl ScenarioKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "volatility" => Some(Self::Volatility),
            "slippage" => Some(Self::Slippage),
            "spread" => Some(Self::Spread),
            "gap" => Some(Self::Gap),
            "flash_crash" => Some(Self::FlashCrash),
            "high_volatility" => Some(Self::HighVolatility),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Volatility => "volatility",
            Self::Slippage => "slippage",
            Self::Spread => "spread",
            Self::Gap => "gap",
            Self::FlashCrash => "flash_crash",
            Self::HighVolatility => "high_volatility",
        }
    }

    pub fn category(self) -> ScenarioCategory {
        match self {
            Self::Volatility | Self::Slippage | Self::Spread => ScenarioCategory::Stress,
            Self::Gap | Self::FlashCrash | Self::HighVolatility => ScenarioCategory::EdgeCase,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scenario as written in configuration, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    pub kind: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub pips: Option<f64>,
    #[serde(default)]
    pub gap_pct: Option<f64>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub crash_pct: Option<f64>,
    #[serde(default)]
    pub recovery_pct: Option<f64>,
    #[serde(default)]
    pub window_pct: Option<f64>,
}

impl ScenarioSpec {
    pub fn new(kind: &str, severity: &str) -> Self {
        Self {
            kind: kind.to_string(),
            severity: Some(severity.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapDirection {
    Up,
    Down,
}

/// Fully resolved scenario parameters. Fractions are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioParams {
    Volatility { multiplier: f64 },
    Slippage { pips: f64 },
    Spread { pips: f64 },
    Gap { gap_fraction: f64, direction: GapDirection },
    FlashCrash { crash_fraction: f64, recovery_fraction: f64 },
    HighVolatility { multiplier: f64, window_fraction: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub params: ScenarioParams,
}

fn scenario_error(message: String) -> BacktestError {
    BacktestError::ScenarioConfiguration(message)
}

fn fraction(value: f64, field: &str, label: &str) -> Result<f64, BacktestError> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(scenario_error(format!("{label}: {field} must be within (0, 1)")))
    }
}

impl StressScenario {
    pub fn new(kind: ScenarioKind, severity: Severity) -> Self {
        let params = match kind {
            ScenarioKind::Volatility => ScenarioParams::Volatility {
                multiplier: severity.pick(1.5, 2.0, 3.0),
            },
            ScenarioKind::Slippage => ScenarioParams::Slippage {
                pips: severity.pick(2.0, 5.0, 10.0),
            },
            ScenarioKind::Spread => ScenarioParams::Spread {
                pips: severity.pick(1.0, 3.0, 6.0),
            },
            ScenarioKind::Gap => ScenarioParams::Gap {
                gap_fraction: severity.pick(0.01, 0.02, 0.05),
                direction: GapDirection::Down,
            },
            ScenarioKind::FlashCrash => ScenarioParams::FlashCrash {
                crash_fraction: severity.pick(0.05, 0.10, 0.20),
                recovery_fraction: DEFAULT_RECOVERY_FRACTION,
            },
            ScenarioKind::HighVolatility => ScenarioParams::HighVolatility {
                multiplier: severity.pick(1.5, 2.0, 3.0),
                window_fraction: DEFAULT_WINDOW_FRACTION,
            },
        };
        Self {
            name: format!("{}_{}", kind.as_str(), severity.as_str()),
            severity,
            params,
        }
    }

    /// Validates a configured scenario. Unknown kinds and missing or unknown
    /// severities are rejected before any simulation work happens.
    pub fn from_spec(spec: &ScenarioSpec) -> Result<Self, BacktestError> {
        let kind = ScenarioKind::parse(&spec.kind)
            .ok_or_else(|| scenario_error(format!("unknown scenario type '{}'", spec.kind)))?;
        let severity_raw = spec.severity.as_deref().ok_or_else(|| {
            scenario_error(format!("scenario '{}' is missing a severity", spec.kind))
        })?;
        let severity = Severity::parse(severity_raw).ok_or_else(|| {
            scenario_error(format!(
                "scenario '{}' has unknown severity '{severity_raw}'",
                spec.kind
            ))
        })?;

        let mut scenario = Self::new(kind, severity);
        if let Some(name) = spec.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            scenario.name = name.to_string();
        }
        let label = scenario.name.clone();

        match &mut scenario.params {
            ScenarioParams::Volatility { multiplier }
            | ScenarioParams::HighVolatility { multiplier, .. } => {
                if let Some(value) = spec.multiplier {
                    if !(value.is_finite() && value >= 1.0) {
                        return Err(scenario_error(format!("{label}: multiplier must be >= 1")));
                    }
                    *multiplier = value;
                }
            }
            ScenarioParams::Slippage { pips } | ScenarioParams::Spread { pips } => {
                if let Some(value) = spec.pips {
                    if !(value.is_finite() && value >= 0.0) {
                        return Err(scenario_error(format!("{label}: pips must be >= 0")));
                    }
                    *pips = value;
                }
            }
            ScenarioParams::Gap {
                gap_fraction,
                direction,
            } => {
                if let Some(value) = spec.gap_pct {
                    *gap_fraction = fraction(value, "gap_pct", &label)?;
                }
                match spec.direction.as_deref().map(str::trim) {
                    None | Some("down") => {}
                    Some("up") => *direction = GapDirection::Up,
                    Some(other) => {
                        return Err(scenario_error(format!(
                            "{label}: direction must be 'up' or 'down' (got '{other}')"
                        )))
                    }
                }
            }
            ScenarioParams::FlashCrash {
                crash_fraction,
                recovery_fraction,
            } => {
                if let Some(value) = spec.crash_pct {
                    *crash_fraction = fraction(value, "crash_pct", &label)?;
                }
                if let Some(value) = spec.recovery_pct {
                    if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                        return Err(scenario_error(format!(
                            "{label}: recovery_pct must be within [0, 1]"
                        )));
                    }
                    *recovery_fraction = value;
                }
            }
        }

        if let ScenarioParams::HighVolatility {
            window_fraction, ..
        } = &mut scenario.params
        {
            if let Some(value) = spec.window_pct {
                if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                    return Err(scenario_error(format!(
                        "{label}: window_pct must be within (0, 1]"
                    )));
                }
                *window_fraction = value;
            }
        }

        Ok(scenario)
    }

    pub fn kind(&self) -> ScenarioKind {
        match self.params {
            ScenarioParams::Volatility { .. } => ScenarioKind::Volatility,
            ScenarioParams::Slippage { .. } => ScenarioKind::Slippage,
            ScenarioParams::Spread { .. } => ScenarioKind::Spread,
            ScenarioParams::Gap { .. } => ScenarioKind::Gap,
            ScenarioParams::FlashCrash { .. } => ScenarioKind::FlashCrash,
            ScenarioParams::HighVolatility { .. } => ScenarioKind::HighVolatility,
        }
    }

    pub fn category(&self) -> ScenarioCategory {
        self.kind().category()
    }

    /// Extra execution cost for slippage and spread scenarios; neutral for
    /// the rest.
    pub fn cost_model(&self) -> CostModel {
        match self.params {
            ScenarioParams::Slippage { pips } => CostModel::slippage(pips),
            ScenarioParams::Spread { pips } => CostModel::spread(pips),
            _ => CostModel::default(),
        }
    }

    pub fn alters_data(&self) -> bool {
        !matches!(
            self.params,
            ScenarioParams::Slippage { .. } | ScenarioParams::Spread { .. }
        )
    }

    /// Market transform to hand the engine, if this scenario rewrites bars.
    pub fn transform(&self, seed: u64) -> Option<Arc<dyn MarketTransform>> {
        if !self.alters_data() {
            return None;
        }
        Some(Arc::new(ScenarioTransform {
            scenario: self.clone(),
            seed,
        }))
    }
}

/// Applies a scenario's data transform. Cost-only scenarios return the bars
/// unchanged.
pub fn inject(bars: &[Bar], scenario: &StressScenario, seed: u64) -> Vec<Bar> {
    match scenario.params {
        ScenarioParams::Volatility { multiplier } => transforms::widen_all(bars, multiplier),
        ScenarioParams::Slippage { .. } | ScenarioParams::Spread { .. } => bars.to_vec(),
        ScenarioParams::Gap {
            gap_fraction,
            direction,
        } => transforms::gap(bars, gap_fraction, direction == GapDirection::Up, seed),
        ScenarioParams::FlashCrash {
            crash_fraction,
            recovery_fraction,
        } => transforms::flash_crash(bars, crash_fraction, recovery_fraction, seed),
        ScenarioParams::HighVolatility {
            multiplier,
            window_fraction,
        } => transforms::volatility_window(bars, multiplier, window_fraction, seed),
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioTransform {
    scenario: StressScenario,
    seed: u64,
}

impl MarketTransform for ScenarioTransform {
    fn label(&self) -> String {
        self.scenario.name.clone()
    }

    fn apply(&self, bars: &[Bar]) -> Vec<Bar> {
        inject(bars, &self.scenario, self.seed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub profit: f64,
    pub drawdown: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            profit: 0.6,
            drawdown: 0.4,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<(), BacktestError> {
        let ok = |w: f64| w.is_finite() && w >= 0.0;
        if !(ok(self.profit) && ok(self.drawdown)) || self.profit + self.drawdown <= 0.0 {
            return Err(scenario_error(
                "score weights must be >= 0 with a positive sum".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioImpact {
    /// Percent of baseline net profit lost under stress, clamped to [0, 100].
    pub profit_degradation_pct: f64,
    /// Percent increase of max drawdown over baseline, clamped to [0, 100].
    pub drawdown_increase_pct: f64,
    pub resistance_score: f64,
}

/// Stress resistance in `[0, 100]`; 100 means the scenario changed nothing
/// that matters.
///
/// Profit degradation is relative to the baseline's net profit, or to the
/// starting balance when the baseline made nothing. Drawdown increase is
/// relative to the baseline drawdown, or in percentage points when the
/// baseline never drew down.
pub fn resistance_score(
    baseline: &PerformanceMetrics,
    stressed: &PerformanceMetrics,
    initial_balance: f64,
    weights: &ScoreWeights,
) -> ScenarioImpact {
    let profit_base = if baseline.net_profit.abs() > SCORE_EPSILON {
        baseline.net_profit.abs()
    } else {
        initial_balance.abs().max(SCORE_EPSILON)
    };
    let profit_degradation =
        clamp_pct((baseline.net_profit - stressed.net_profit) / profit_base * 100.0);

    let drawdown_increase = if baseline.max_drawdown_pct > SCORE_EPSILON {
        (stressed.max_drawdown_pct - baseline.max_drawdown_pct) / baseline.max_drawdown_pct * 100.0
    } else {
        stressed.max_drawdown_pct * 100.0
    };
    let drawdown_increase = clamp_pct(drawdown_increase);

    let total = weights.profit + weights.drawdown;
    let penalty = if total > 0.0 {
        (weights.profit * profit_degradation + weights.drawdown * drawdown_increase) / total
    } else {
        0.0
    };

    ScenarioImpact {
        profit_degradation_pct: profit_degradation,
        drawdown_increase_pct: drawdown_increase,
        resistance_score: (100.0 - penalty).clamp(0.0, 100.0),
    }
}

fn clamp_pct(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(net_profit: f64, max_drawdown_pct: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            net_profit,
            max_drawdown_pct,
            ..PerformanceMetrics::default()
        }
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let err = StressScenario::from_spec(&ScenarioSpec::new("meteor", "high")).unwrap_err();
        assert!(matches!(err, BacktestError::ScenarioConfiguration(_)));
    }

    #[test]
    fn missing_severity_is_a_configuration_error() {
        let spec = ScenarioSpec {
            kind: "gap".to_string(),
            ..ScenarioSpec::default()
        };
        let err = StressScenario::from_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("severity"));
    }

    #[test]
    fn severity_tables_drive_defaults() {
        let slip = StressScenario::from_spec(&ScenarioSpec::new("slippage", "medium")).unwrap();
        assert_eq!(slip.cost_model(), CostModel::slippage(5.0));
        assert!(slip.transform(1).is_none());
        assert_eq!(slip.category(), ScenarioCategory::Stress);

        let crash = StressScenario::from_spec(&ScenarioSpec::new("flash_crash", "high")).unwrap();
        assert_eq!(
            crash.params,
            ScenarioParams::FlashCrash {
                crash_fraction: 0.20,
                recovery_fraction: 0.5
            }
        );
        assert_eq!(crash.category(), ScenarioCategory::EdgeCase);
        assert_eq!(crash.name, "flash_crash_high");
    }

    #[test]
    fn explicit_params_override_severity() {
        let spec = ScenarioSpec {
            direction: Some("up".to_string()),
            gap_pct: Some(0.03),
            ..ScenarioSpec::new("gap", "low")
        };
        let gap = StressScenario::from_spec(&spec).unwrap();
        assert_eq!(
            gap.params,
            ScenarioParams::Gap {
                gap_fraction: 0.03,
                direction: GapDirection::Up
            }
        );
    }

    #[test]
    fn identical_runs_score_full_marks() {
        let base = metrics(500.0, 0.05);
        let impact = resistance_score(&base, &base, 10_000.0, &ScoreWeights::default());
        assert_eq!(impact.resistance_score, 100.0);
    }

    #[test]
    fn score_combines_weighted_penalties() {
        let base = metrics(1_000.0, 0.10);
        let stressed = metrics(500.0, 0.15);
        let impact = resistance_score(&base, &stressed, 10_000.0, &ScoreWeights::default());
        assert!((impact.profit_degradation_pct - 50.0).abs() < 1e-9);
        assert!((impact.drawdown_increase_pct - 50.0).abs() < 1e-9);
        assert!((impact.resistance_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn improvements_do_not_push_score_above_100() {
        let base = metrics(-200.0, 0.2);
        let stressed = metrics(300.0, 0.05);
        let impact = resistance_score(&base, &stressed, 10_000.0, &ScoreWeights::default());
        assert_eq!(impact.resistance_score, 100.0);
    }

    #[test]
    fn full_or_larger_fractions_are_rejected() {
        for (kind, spec) in [
            (
                "gap",
                ScenarioSpec {
                    gap_pct: Some(1.0),
                    ..ScenarioSpec::new("gap", "high")
                },
            ),
            (
                "flash_crash",
                ScenarioSpec {
                    crash_pct: Some(1.5),
                    ..ScenarioSpec::new("flash_crash", "low")
                },
            ),
        ] {
            let err = StressScenario::from_spec(&spec).unwrap_err();
            assert!(matches!(err, BacktestError::ScenarioConfiguration(_)), "{kind}");
            assert!(err.to_string().contains("(0, 1)"), "{kind}: {err}");
        }
    }
}

