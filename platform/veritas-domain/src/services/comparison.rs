use crate::entities::metrics::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const TIE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparedMetric {
    NetProfit,
    SharpeRatio,
    SortinoRatio,
    ProfitFactor,
    WinRate,
    MaxDrawdownPct,
    Expectancy,
}

pub const COMPARED_METRICS: [ComparedMetric; 7] = [
    ComparedMetric::NetProfit,
    ComparedMetric::SharpeRatio,
    ComparedMetric::SortinoRatio,
    ComparedMetric::ProfitFactor,
    ComparedMetric::WinRate,
    ComparedMetric::MaxDrawdownPct,
    ComparedMetric::Expectancy,
];

impl ComparedMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetProfit => "net_profit",
            Self::SharpeRatio => "sharpe_ratio",
            Self::SortinoRatio => "sortino_ratio",
            Self::ProfitFactor => "profit_factor",
            Self::WinRate => "win_rate",
            Self::MaxDrawdownPct => "max_drawdown_pct",
            Self::Expectancy => "expectancy",
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            Self::NetProfit | Self::SharpeRatio => 0.20,
            Self::ProfitFactor | Self::MaxDrawdownPct => 0.15,
            Self::SortinoRatio | Self::WinRate | Self::Expectancy => 0.10,
        }
    }

    pub fn lower_is_better(self) -> bool {
        matches!(self, Self::MaxDrawdownPct)
    }

    pub fn value(self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::NetProfit => metrics.net_profit,
            Self::SharpeRatio => metrics.sharpe_ratio,
            Self::SortinoRatio => metrics.sortino_ratio,
            Self::ProfitFactor => metrics.profit_factor,
            Self::WinRate => metrics.win_rate,
            Self::MaxDrawdownPct => metrics.max_drawdown_pct,
            Self::Expectancy => metrics.expectancy,
        }
    }
}

/// One finished run entering the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRun {
    pub name: String,
    pub benchmark: bool,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantScore {
    pub rank: usize,
    pub name: String,
    pub benchmark: bool,
    /// Weighted normalized score as a percentage.
    pub score: f64,
    pub normalized: BTreeMap<String, f64>,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub participants: Vec<ParticipantScore>,
    /// Metrics where every participant tied; they add nothing to any score.
    pub skipped_metrics: Vec<String>,
    pub best: Option<String>,
}

impl ComparisonResult {
    pub fn get(&self, name: &str) -> Option<&ParticipantScore> {
        self.participants.iter().find(|p| p.name == name)
    }
}

/// Suffixes repeated names with `#n` so every participant is addressable.
pub fn disambiguate_names(names: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            let count = seen.entry(name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.clone()
            } else {
                format!("{name}#{count}")
            }
        })
        .collect()
}

/// Replaces infinities with values just beyond the finite range and NaN
/// with zero so min-max scaling stays defined.
fn finite_values(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let (above, below) = if finite.is_empty() {
        (1.0, -1.0)
    } else {
        (max + 1.0f64.max(max.abs() * 0.01), min - 1.0f64.max(min.abs() * 0.01))
    };
    values
        .iter()
        .map(|v| {
            if v.is_nan() {
                0.0
            } else if *v == f64::INFINITY {
                above
            } else if *v == f64::NEG_INFINITY {
                below
            } else {
                *v
            }
        })
        .collect()
}

/// Min-max scores every participant per metric, weights and sums the
/// results, and ranks highest first. Equal scores are ordered by name so the
/// ranking does not depend on input order.
pub fn score_participants(runs: Vec<ParticipantRun>) -> ComparisonResult {
    let names = disambiguate_names(&runs.iter().map(|r| r.name.clone()).collect::<Vec<_>>());
    let total_weight: f64 = COMPARED_METRICS.iter().map(|m| m.weight()).sum();

    let mut normalized: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); runs.len()];
    let mut weighted = vec![0.0; runs.len()];
    let mut skipped_metrics = Vec::new();

    for metric in COMPARED_METRICS {
        let raw: Vec<f64> = runs.iter().map(|r| metric.value(&r.metrics)).collect();
        let values = finite_values(&raw);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let spread = max - min;

        if values.is_empty() || spread.abs() < TIE_EPSILON {
            skipped_metrics.push(metric.as_str().to_string());
            for entry in &mut normalized {
                entry.insert(metric.as_str().to_string(), 0.0);
            }
            continue;
        }

        for (idx, value) in values.iter().enumerate() {
            let scaled = (value - min) / spread;
            let scaled = if metric.lower_is_better() {
                1.0 - scaled
            } else {
                scaled
            };
            normalized[idx].insert(metric.as_str().to_string(), scaled);
            weighted[idx] += metric.weight() * scaled;
        }
    }

    let mut participants: Vec<ParticipantScore> = runs
        .into_iter()
        .zip(names)
        .zip(normalized)
        .zip(weighted)
        .map(|(((run, name), normalized), weighted)| ParticipantScore {
            rank: 0,
            name,
            benchmark: run.benchmark,
            score: if total_weight > 0.0 {
                (weighted / total_weight * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            },
            normalized,
            metrics: run.metrics,
        })
        .collect();

    participants.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
    });
    for (idx, participant) in participants.iter_mut().enumerate() {
        participant.rank = idx + 1;
    }

    ComparisonResult {
        best: participants.first().map(|p| p.name.clone()),
        participants,
        skipped_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, net_profit: f64, max_drawdown_pct: f64) -> ParticipantRun {
        ParticipantRun {
            name: name.to_string(),
            benchmark: false,
            metrics: PerformanceMetrics {
                net_profit,
                max_drawdown_pct,
                ..PerformanceMetrics::default()
            },
        }
    }

    #[test]
    fn dominant_run_scores_all_non_tied_weight() {
        let result = score_participants(vec![run("a", 100.0, 0.05), run("b", 50.0, 0.10)]);
        let best = &result.participants[0];
        assert_eq!(best.name, "a");
        assert_eq!(best.rank, 1);
        // net_profit 0.20 + max_drawdown_pct 0.15 out of 1.0
        assert!((best.score - 35.0).abs() < 1e-9);
        assert_eq!(result.participants[1].score, 0.0);
        assert!(result.skipped_metrics.contains(&"sharpe_ratio".to_string()));
        assert!(!result.skipped_metrics.contains(&"net_profit".to_string()));
    }

    #[test]
    fn drawdown_is_inverted() {
        let result = score_participants(vec![run("calm", 10.0, 0.01), run("wild", 10.0, 0.30)]);
        let calm = result.get("calm").unwrap();
        assert_eq!(calm.normalized["max_drawdown_pct"], 1.0);
        assert_eq!(result.best.as_deref(), Some("calm"));
    }

    #[test]
    fn infinite_profit_factor_ranks_on_top() {
        let mut perfect = run("perfect", 10.0, 0.0);
        perfect.metrics.profit_factor = f64::INFINITY;
        let mut decent = run("decent", 10.0, 0.0);
        decent.metrics.profit_factor = 2.0;
        let result = score_participants(vec![decent, perfect]);
        assert_eq!(result.get("perfect").unwrap().normalized["profit_factor"], 1.0);
        assert_eq!(result.best.as_deref(), Some("perfect"));
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let names = disambiguate_names(&["x".to_string(), "y".to_string(), "x".to_string()]);
        assert_eq!(names, vec!["x", "y", "x#2"]);
    }

    #[test]
    fn equal_scores_order_by_name() {
        let result = score_participants(vec![run("zeta", 1.0, 0.1), run("alpha", 1.0, 0.1)]);
        assert_eq!(result.participants[0].name, "alpha");
        assert_eq!(result.skipped_metrics.len(), COMPARED_METRICS.len());
    }
}
