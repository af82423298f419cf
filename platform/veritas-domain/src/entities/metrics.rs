use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::sentinel;
use crate::value_objects::timeframe::{median_step_seconds, SECONDS_PER_YEAR};
use crate::value_objects::trade::Trade;
use serde::{Deserialize, Serialize};

/// Used when the equity curve is too short to infer a bar interval.
pub const FALLBACK_ANNUALIZATION: f64 = 252.0;

const STD_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Annual risk-free rate, spread evenly over the periods of a year.
    pub risk_free_rate: f64,
    /// Overrides the factor derived from the bar interval.
    pub annualization_factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_pips: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub return_pct: f64,
    /// `+infinity` when there are profits and no losses.
    #[serde(with = "sentinel")]
    pub profit_factor: f64,
    pub expectancy: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub cagr: f64,
    /// `+infinity` when the run never drew down.
    #[serde(with = "sentinel")]
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub average_bars_held: f64,
    pub annualization_factor: f64,
    pub periods: usize,
}

/// Derives the full metric set from a run's closed trades and equity curve.
pub fn calculate(
    initial_balance: f64,
    trades: &[Trade],
    equity: &[EquityPoint],
    config: &MetricsConfig,
) -> PerformanceMetrics {
    let mut out = PerformanceMetrics {
        total_trades: trades.len(),
        ..PerformanceMetrics::default()
    };

    let mut wins_sum = 0.0;
    let mut losses_sum = 0.0;
    let mut win_streak = 0usize;
    let mut loss_streak = 0usize;
    let mut bars_held = 0usize;

    for trade in trades {
        out.total_pips += trade.profit_pips;
        bars_held += trade.bars_held();
        if trade.is_win() {
            out.winning_trades += 1;
            wins_sum += trade.pnl;
            out.largest_win = out.largest_win.max(trade.pnl);
            win_streak += 1;
            loss_streak = 0;
        } else if trade.is_loss() {
            out.losing_trades += 1;
            losses_sum += trade.pnl;
            out.largest_loss = out.largest_loss.min(trade.pnl);
            loss_streak += 1;
            win_streak = 0;
        } else {
            out.breakeven_trades += 1;
            win_streak = 0;
            loss_streak = 0;
        }
        out.max_consecutive_wins = out.max_consecutive_wins.max(win_streak);
        out.max_consecutive_losses = out.max_consecutive_losses.max(loss_streak);
    }

    out.gross_profit = wins_sum;
    out.gross_loss = losses_sum;
    out.net_profit = trades.iter().map(|t| t.pnl).sum();
    out.return_pct = if initial_balance > 0.0 {
        out.net_profit / initial_balance * 100.0
    } else {
        0.0
    };

    if out.total_trades > 0 {
        out.win_rate = out.winning_trades as f64 / out.total_trades as f64;
        out.average_bars_held = bars_held as f64 / out.total_trades as f64;
    }
    if out.winning_trades > 0 {
        out.average_win = wins_sum / out.winning_trades as f64;
    }
    if out.losing_trades > 0 {
        out.average_loss = losses_sum / out.losing_trades as f64;
    }

    out.profit_factor = profit_factor(out.gross_profit, out.gross_loss);
    out.expectancy =
        out.win_rate * out.average_win - (1.0 - out.win_rate) * out.average_loss.abs();

    out.max_drawdown = equity.iter().map(|p| p.drawdown).fold(0.0, f64::max);
    out.max_drawdown_pct = equity.iter().map(|p| p.drawdown_pct).fold(0.0, f64::max);

    let factor = annualization_factor(equity, config);
    out.annualization_factor = factor;
    let returns = periodic_returns(equity, config.risk_free_rate / factor);
    out.periods = returns.len();
    out.sharpe_ratio = sharpe(&returns, factor);
    out.sortino_ratio = sortino(&returns, factor);

    let final_balance = initial_balance + out.net_profit;
    out.cagr = cagr(initial_balance, final_balance, equity);
    out.calmar_ratio = if out.max_drawdown_pct == 0.0 {
        f64::INFINITY
    } else {
        out.cagr / out.max_drawdown_pct
    };

    out
}

pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    let loss = gross_loss.abs();
    if loss == 0.0 {
        if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gross_profit / loss
    }
}

pub fn annualization_factor(equity: &[EquityPoint], config: &MetricsConfig) -> f64 {
    if let Some(factor) = config.annualization_factor.filter(|f| *f > 0.0) {
        return factor;
    }
    let timestamps: Vec<i64> = equity.iter().map(|p| p.timestamp).collect();
    median_step_seconds(&timestamps)
        .map(|step| SECONDS_PER_YEAR / step as f64)
        .unwrap_or(FALLBACK_ANNUALIZATION)
}

/// Simple returns between consecutive equity points, net of the per-period
/// risk-free rate.
pub fn periodic_returns(equity: &[EquityPoint], risk_free_per_period: f64) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|pair| pair[0].equity > 0.0)
        .map(|pair| pair[1].equity / pair[0].equity - 1.0 - risk_free_per_period)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); zero below two observations.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let var = values
        .iter()
        .map(|v| {
            let diff = v - avg;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() as f64 - 1.0);
    var.sqrt()
}

fn sharpe(returns: &[f64], factor: f64) -> f64 {
    let std = sample_std(returns);
    if std < STD_EPSILON {
        return 0.0;
    }
    mean(returns) / std * factor.sqrt()
}

fn sortino(returns: &[f64], factor: f64) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let std = sample_std(&downside);
    if std < STD_EPSILON {
        return 0.0;
    }
    mean(returns) / std * factor.sqrt()
}

fn cagr(initial_balance: f64, final_balance: f64, equity: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    let days = (last.timestamp - first.timestamp) as f64 / 86_400.0;
    if days <= 0.0 || initial_balance <= 0.0 {
        return 0.0;
    }
    if final_balance <= 0.0 {
        return -1.0;
    }
    (final_balance / initial_balance).powf(365.25 / days) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::side::Direction;
    use crate::value_objects::trade::ExitReason;

    fn trade(pnl: f64, pips: f64) -> Trade {
        Trade {
            id: 1,
            symbol: "EURUSD".to_string(),
            direction: Direction::Long,
            entry_time: 0,
            entry_index: 0,
            entry_price: 1.0,
            volume: 1.0,
            stop_loss: None,
            take_profit: None,
            exit_time: 60,
            exit_index: 2,
            exit_price: 1.0,
            exit_reason: ExitReason::EndOfTest,
            profit_price: 0.0,
            profit_pips: pips,
            commission: 0.0,
            pnl,
        }
    }

    fn point(timestamp: i64, equity: f64, drawdown_pct: f64) -> EquityPoint {
        EquityPoint {
            timestamp,
            balance: equity,
            equity,
            open_positions: 0,
            drawdown: 0.0,
            drawdown_pct,
        }
    }

    #[test]
    fn profit_factor_sentinels() {
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert!(profit_factor(10.0, 0.0).is_infinite());
        assert!((profit_factor(30.0, -10.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn counts_and_expectancy() {
        let trades = vec![
            trade(100.0, 10.0),
            trade(-50.0, -5.0),
            trade(0.0, 0.0),
            trade(50.0, 5.0),
        ];
        let m = calculate(1_000.0, &trades, &[], &MetricsConfig::default());
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert_eq!(m.breakeven_trades, 1);
        assert!((m.win_rate - 0.5).abs() < 1e-12);
        assert!((m.average_win - 75.0).abs() < 1e-12);
        assert!((m.average_loss + 50.0).abs() < 1e-12);
        assert!((m.expectancy - (0.5 * 75.0 - 0.5 * 50.0)).abs() < 1e-12);
        assert!((m.profit_factor - 3.0).abs() < 1e-12);
        assert!((m.total_pips - 10.0).abs() < 1e-12);
        assert_eq!(m.largest_loss, -50.0);
        assert_eq!(m.max_consecutive_wins, 1);
        assert!((m.net_profit - 100.0).abs() < 1e-12);
    }

    #[test]
    fn flat_equity_uses_zero_and_infinity_sentinels() {
        let equity: Vec<EquityPoint> = (0..10).map(|i| point(i * 86_400, 1_000.0, 0.0)).collect();
        let m = calculate(1_000.0, &[], &equity, &MetricsConfig::default());
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.cagr, 0.0);
        assert!(m.calmar_ratio.is_infinite());
        assert!((m.annualization_factor - 365.25).abs() < 1e-9);
    }

    #[test]
    fn annualization_follows_bar_interval_unless_overridden() {
        let hourly: Vec<EquityPoint> = (0..5).map(|i| point(i * 3_600, 1_000.0, 0.0)).collect();
        let derived = annualization_factor(&hourly, &MetricsConfig::default());
        assert!((derived - 365.25 * 24.0).abs() < 1e-6);

        let overridden = annualization_factor(
            &hourly,
            &MetricsConfig {
                risk_free_rate: 0.0,
                annualization_factor: Some(252.0),
            },
        );
        assert_eq!(overridden, 252.0);
    }

    #[test]
    fn cagr_doubles_over_one_year() {
        let equity = vec![
            point(0, 1_000.0, 0.0),
            point((365.25 * 86_400.0) as i64, 2_000.0, 0.0),
        ];
        let trades = vec![trade(1_000.0, 0.0)];
        let m = calculate(1_000.0, &trades, &equity, &MetricsConfig::default());
        assert!((m.cagr - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sharpe_and_sortino_are_positive_for_rising_noisy_equity() {
        let values = [100.0, 102.0, 101.0, 104.0, 103.5, 107.0, 106.0, 110.0];
        let equity: Vec<EquityPoint> = values
            .iter()
            .enumerate()
            .map(|(i, e)| point(i as i64 * 86_400, *e, 0.0))
            .collect();
        let m = calculate(100.0, &[], &equity, &MetricsConfig::default());
        assert!(m.sharpe_ratio > 0.0);
        assert!(m.sortino_ratio > 0.0);
        assert_eq!(m.periods, values.len() - 1);
    }
}
