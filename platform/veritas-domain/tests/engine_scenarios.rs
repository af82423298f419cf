use std::sync::{Arc, Mutex};
use veritas_domain::errors::StrategyEvaluationError;
use veritas_domain::services::engine::backtest::{BacktestConfig, BacktestEngine};
use veritas_domain::services::engine::execution::CostModel;
use veritas_domain::services::strategy::{
    BuyAndHold, FlatStrategy, ScheduledSignal, ScriptedSignals, SmaCrossover, Strategy,
};
use veritas_domain::value_objects::bar::Bar;
use veritas_domain::value_objects::signal::{PriceLevel, Signal};
use veritas_domain::value_objects::trade::ExitReason;

const HOUR: i64 = 3_600;

fn quiet_bars(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| Bar::new(i as i64 * HOUR, 1.1000, 1.1003, 1.0997, 1.1000, 100.0))
        .collect()
}

fn wave_bars(count: usize) -> Vec<Bar> {
    let mut prev = 1.1;
    (0..count)
        .map(|i| {
            let close = 1.1 + 0.01 * (i as f64 / 9.0).sin() + 0.002 * (i as f64 / 2.3).cos();
            let bar = Bar::new(
                i as i64 * HOUR,
                prev,
                prev.max(close) + 0.0006,
                prev.min(close) - 0.0006,
                close,
                50.0,
            );
            prev = close;
            bar
        })
        .collect()
}

fn zero_cost_config() -> BacktestConfig {
    BacktestConfig {
        run_id: "scenario".to_string(),
        ..BacktestConfig::default()
    }
}

fn bracketed_buy_at(bars: &[Bar], idx: usize) -> ScriptedSignals {
    ScriptedSignals::new(vec![ScheduledSignal {
        timestamp: bars[idx].timestamp,
        signal: Signal::buy()
            .with_stop_loss(PriceLevel::Price(1.0950))
            .with_take_profit(PriceLevel::Price(1.1100)),
    }])
}

#[test]
fn flat_strategy_produces_no_trades() {
    let bars = quiet_bars(200);
    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut FlatStrategy)
        .unwrap();

    assert!(result.trades.is_empty());
    assert_eq!(result.metrics.total_trades, 0);
    assert_eq!(result.metrics.net_profit, 0.0);
    assert_eq!(result.metrics.max_drawdown, 0.0);
    assert_eq!(result.final_balance, result.initial_balance);
    assert_eq!(result.equity_curve.len(), 150);
    assert_eq!(result.diagnostics.bars_processed, 150);
}

#[test]
fn take_profit_exit_is_deterministic() {
    let mut bars = quiet_bars(160);
    bars[120].high = 1.1100;
    let mut strategy = bracketed_buy_at(&bars, 100);

    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut strategy)
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert_eq!(trade.entry_index, 100);
    assert_eq!(trade.exit_index, 120);
    assert!((trade.entry_price - 1.1000).abs() < 1e-12);
    assert_eq!(trade.profit_pips, 100.0);
    // 1% of 10k over a 50 pip stop on a standard lot is 0.2 lots.
    assert!((trade.volume - 0.2).abs() < 1e-12);
    assert!((trade.pnl - 200.0).abs() < 1e-6);
    assert!((result.final_balance - 10_200.0).abs() < 1e-6);
}

#[test]
fn stop_loss_wins_same_bar_tie() {
    let mut bars = quiet_bars(160);
    bars[110].high = 1.1100;
    bars[110].low = 1.0950;
    let mut strategy = bracketed_buy_at(&bars, 100);

    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut strategy)
        .unwrap();

    let trade = &result.trades[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.profit_pips, -50.0);
    assert!(trade.pnl < 0.0);
}

#[test]
fn open_positions_close_at_end_of_test() {
    let bars = wave_bars(120);
    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut BuyAndHold::new())
        .unwrap();

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::EndOfTest);
    assert_eq!(result.trades[0].exit_index, 119);
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.open_positions, 0);
    assert!((last.equity - result.final_balance).abs() < 1e-9);
}

#[test]
fn identical_inputs_serialize_identically() {
    let bars = wave_bars(400);
    let config = BacktestConfig {
        commission_per_trade: 3.5,
        spread_pips: 0.8,
        default_stop_loss_pips: Some(40.0),
        default_take_profit_pips: Some(80.0),
        ..zero_cost_config()
    };
    let engine = BacktestEngine::new(config);
    let mut strategy = SmaCrossover::new(5, 20, None, None);
    let first = engine.run(&bars, &mut strategy).unwrap();
    let second = engine.run(&bars, &mut strategy).unwrap();

    assert!(!first.trades.is_empty());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

struct Flaky {
    calls: usize,
}

impl Strategy for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn generate_signals(&mut self, _window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            Err(StrategyEvaluationError::new("pattern lookup failed"))
        } else {
            Ok(Vec::new())
        }
    }

    fn reset(&mut self) {
        self.calls = 0;
    }
}

#[test]
fn strategy_errors_are_counted_not_fatal() {
    let bars = quiet_bars(61);
    let result = BacktestEngine::new(BacktestConfig {
        warmup_bars: 50,
        ..zero_cost_config()
    })
    .run(&bars, &mut Flaky { calls: 0 })
    .unwrap();

    assert_eq!(result.diagnostics.bars_processed, 11);
    assert_eq!(result.diagnostics.strategy_errors, 5);
    let errors = result
        .diagnostics
        .audit_events
        .iter()
        .filter(|e| e.stage == "strategy" && e.action == "error")
        .count();
    assert_eq!(errors, 5);
}

#[test]
fn foreign_symbol_signals_are_rejected() {
    let bars = quiet_bars(80);
    let mut strategy = ScriptedSignals::new(vec![ScheduledSignal {
        timestamp: bars[60].timestamp,
        signal: Signal::sell().with_symbol("GBPUSD"),
    }]);
    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut strategy)
        .unwrap();

    assert!(result.trades.is_empty());
    assert_eq!(result.diagnostics.signals_rejected, 1);
    let event = result
        .diagnostics
        .audit_events
        .iter()
        .find(|e| e.stage == "order")
        .unwrap();
    assert_eq!(event.error.as_deref(), Some("symbol_mismatch"));
    assert_eq!(event.symbol.as_deref(), Some("GBPUSD"));
}

#[test]
fn position_limit_caps_concurrent_entries() {
    let bars = quiet_bars(80);
    let signals = (55..60)
        .map(|i| ScheduledSignal {
            timestamp: bars[i].timestamp,
            signal: Signal::buy(),
        })
        .collect();
    let result = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut ScriptedSignals::new(signals))
        .unwrap();

    assert_eq!(result.diagnostics.signals_accepted, 1);
    assert_eq!(result.diagnostics.signals_rejected, 4);
    assert_eq!(result.trades.len(), 1);
}

#[test]
fn cost_model_worsens_fill() {
    let bars = quiet_bars(80);
    let script = || {
        ScriptedSignals::new(vec![ScheduledSignal {
            timestamp: bars[60].timestamp,
            signal: Signal::buy(),
        }])
    };
    let plain = BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut script())
        .unwrap();
    let costly = BacktestEngine::new(zero_cost_config())
        .with_cost_model(CostModel::slippage(5.0))
        .run(&bars, &mut script())
        .unwrap();

    let delta = costly.trades[0].entry_price - plain.trades[0].entry_price;
    assert!((delta - 0.0005).abs() < 1e-12);
    assert!(costly.final_balance < plain.final_balance);
}

struct WindowProbe {
    longest: Arc<Mutex<usize>>,
}

impl Strategy for WindowProbe {
    fn name(&self) -> &str {
        "window_probe"
    }

    fn generate_signals(&mut self, window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        let mut longest = self.longest.lock().unwrap();
        *longest = (*longest).max(window.len());
        Ok(Vec::new())
    }
}

#[test]
fn window_never_exceeds_current_bar_or_cap() {
    let bars = quiet_bars(90);
    let longest = Arc::new(Mutex::new(0));

    BacktestEngine::new(zero_cost_config())
        .run(&bars, &mut WindowProbe { longest: longest.clone() })
        .unwrap();
    assert_eq!(*longest.lock().unwrap(), 90);

    *longest.lock().unwrap() = 0;
    BacktestEngine::new(BacktestConfig {
        signal_window: Some(20),
        ..zero_cost_config()
    })
    .run(&bars, &mut WindowProbe { longest: longest.clone() })
    .unwrap();
    assert_eq!(*longest.lock().unwrap(), 20);
}
