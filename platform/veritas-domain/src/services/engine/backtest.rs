use crate::entities::ledger::{AccountLedger, PositionEntry, PositionExit};
use crate::entities::metrics::{self, MetricsConfig, PerformanceMetrics};
use crate::entities::risk::{FixedFractionalSizer, RiskSizer, SizingRequest};
use crate::errors::BacktestError;
use crate::services::audit::AuditEvent;
use crate::services::engine::execution::{CostModel, FillModel, MarketTransform};
use crate::services::strategy::Strategy;
use crate::value_objects::bar::Bar;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::signal::{PriceLevel, Signal};
use crate::value_objects::side::Direction;
use crate::value_objects::trade::{ExitReason, Trade};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub run_id: String,
    pub symbol: String,
    pub initial_balance: f64,
    pub commission_per_trade: f64,
    pub slippage_pips: f64,
    pub spread_pips: f64,
    pub pip_size: f64,
    pub contract_size: f64,
    pub warmup_bars: usize,
    /// Caps the lookback handed to the strategy.
    pub signal_window: Option<usize>,
    pub default_stop_loss_pips: Option<f64>,
    pub default_take_profit_pips: Option<f64>,
    pub max_concurrent_positions_per_symbol: usize,
    pub metrics: MetricsConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            run_id: "run".to_string(),
            symbol: "EURUSD".to_string(),
            initial_balance: 10_000.0,
            commission_per_trade: 0.0,
            slippage_pips: 0.0,
            spread_pips: 0.0,
            pip_size: 0.0001,
            contract_size: 100_000.0,
            warmup_bars: 50,
            signal_window: None,
            default_stop_loss_pips: None,
            default_take_profit_pips: None,
            max_concurrent_positions_per_symbol: 1,
            metrics: MetricsConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        let invalid = |msg: &str| Err(BacktestError::InvalidConfig(msg.to_string()));
        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty");
        }
        if !(self.initial_balance.is_finite() && self.initial_balance > 0.0) {
            return invalid("initial_balance must be > 0");
        }
        for (name, value) in [
            ("commission_per_trade", self.commission_per_trade),
            ("slippage_pips", self.slippage_pips),
            ("spread_pips", self.spread_pips),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(BacktestError::InvalidConfig(format!("{name} must be >= 0")));
            }
        }
        if !(self.pip_size.is_finite() && self.pip_size > 0.0) {
            return invalid("pip_size must be > 0");
        }
        if !(self.contract_size.is_finite() && self.contract_size > 0.0) {
            return invalid("contract_size must be > 0");
        }
        if self.signal_window == Some(0) {
            return invalid("signal_window must be >= 1 when set");
        }
        if self.max_concurrent_positions_per_symbol == 0 {
            return invalid("max_concurrent_positions_per_symbol must be >= 1");
        }
        for (name, value) in [
            ("default_stop_loss_pips", self.default_stop_loss_pips),
            ("default_take_profit_pips", self.default_take_profit_pips),
        ] {
            if let Some(pips) = value {
                if !(pips.is_finite() && pips > 0.0) {
                    return Err(BacktestError::InvalidConfig(format!("{name} must be > 0")));
                }
            }
        }
        if let Some(factor) = self.metrics.annualization_factor {
            if !(factor.is_finite() && factor > 0.0) {
                return invalid("metrics.annualization_factor must be > 0");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub bars_processed: usize,
    pub signals_generated: usize,
    pub signals_accepted: usize,
    pub signals_rejected: usize,
    pub strategy_errors: usize,
    pub audit_events: Vec<AuditEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub strategy: String,
    pub symbol: String,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub diagnostics: RunDiagnostics,
}

impl BacktestResult {
    /// Net P&L of each closed trade in account currency, in exit order.
    pub fn trade_returns(&self) -> Vec<f64> {
        self.trades.iter().map(|trade| trade.pnl).collect()
    }
}

pub type CancelFn<'a> = &'a (dyn Fn() -> bool + Sync);

/// Bar-by-bar replay of one strategy over one symbol.
///
/// Baseline, benchmark, stress and edge-case runs all go through this type;
/// they differ only in the injected sizer, cost model and market transform.
pub struct BacktestEngine<'a> {
    config: BacktestConfig,
    sizer: Arc<dyn RiskSizer>,
    costs: CostModel,
    transform: Option<Arc<dyn MarketTransform>>,
    should_cancel: Option<CancelFn<'a>>,
}

struct RunState {
    ledger: AccountLedger,
    trades: Vec<Trade>,
    diagnostics: RunDiagnostics,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            sizer: Arc::new(FixedFractionalSizer::default()),
            costs: CostModel::default(),
            transform: None,
            should_cancel: None,
        }
    }

    pub fn with_sizer(mut self, sizer: Arc<dyn RiskSizer>) -> Self {
        self.sizer = sizer;
        self
    }

    pub fn with_cost_model(mut self, costs: CostModel) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn MarketTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_cancel(mut self, should_cancel: CancelFn<'a>) -> Self {
        self.should_cancel = Some(should_cancel);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(
        &self,
        bars: &[Bar],
        strategy: &mut dyn Strategy,
    ) -> Result<BacktestResult, BacktestError> {
        self.config.validate()?;
        let required = self.config.warmup_bars + 1;
        if bars.len() < required {
            return Err(BacktestError::InsufficientData {
                bars: bars.len(),
                required,
            });
        }

        let transformed;
        let bars: &[Bar] = match &self.transform {
            Some(transform) => {
                transformed = transform.apply(bars);
                &transformed
            }
            None => bars,
        };

        strategy.reset();

        let fill = FillModel::new(
            self.config.slippage_pips,
            self.config.spread_pips,
            self.config.pip_size,
            self.costs,
        );
        let mut state = RunState {
            ledger: AccountLedger::new(
                self.config.initial_balance,
                self.config.contract_size,
                self.config.pip_size,
                self.config.commission_per_trade,
            ),
            trades: Vec::new(),
            diagnostics: RunDiagnostics::default(),
        };
        let mut equity_curve = Vec::with_capacity(bars.len() - self.config.warmup_bars);

        state.diagnostics.audit_events.push(self.audit(
            bars[self.config.warmup_bars].timestamp,
            "engine",
            "start",
            None,
            json!({
                "strategy": strategy.name(),
                "bars": bars.len(),
                "warmup_bars": self.config.warmup_bars,
                "transform": self.transform.as_ref().map(|t| t.label()),
                "extra_slippage_pips": self.costs.extra_slippage_pips,
                "extra_spread_pips": self.costs.extra_spread_pips,
            }),
        ));

        for idx in self.config.warmup_bars..bars.len() {
            if let Some(should_cancel) = self.should_cancel {
                if should_cancel() {
                    return Err(BacktestError::Cancelled { bar_index: idx });
                }
            }
            let bar = &bars[idx];

            state.ledger.mark(&self.config.symbol, bar.close);
            self.process_exits(&mut state, bar, idx);

            let start = self
                .config
                .signal_window
                .map_or(0, |window| (idx + 1).saturating_sub(window));
            match strategy.generate_signals(&bars[start..=idx]) {
                Ok(signals) => {
                    state.diagnostics.signals_generated += signals.len();
                    for signal in &signals {
                        self.apply_signal(&mut state, &fill, signal, bar, idx);
                    }
                }
                Err(err) => {
                    warn!(
                        run_id = %self.config.run_id,
                        strategy = strategy.name(),
                        bar_index = idx,
                        error = %err,
                        "strategy evaluation failed; treating bar as no-signal"
                    );
                    state.diagnostics.strategy_errors += 1;
                    state.diagnostics.audit_events.push(self.audit(
                        bar.timestamp,
                        "strategy",
                        "error",
                        Some(err.to_string()),
                        json!({ "bar_index": idx }),
                    ));
                }
            }

            equity_curve.push(state.ledger.snapshot(bar.timestamp));
            state.diagnostics.bars_processed += 1;
        }

        if let Some(last) = bars.last() {
            let last_idx = bars.len() - 1;
            let mut closed_any = false;
            while !state.ledger.positions().is_empty() {
                let trade = state.ledger.close(
                    0,
                    PositionExit {
                        price: last.close,
                        time: last.timestamp,
                        index: last_idx,
                        reason: ExitReason::EndOfTest,
                    },
                );
                debug!(trade_id = trade.id, pnl = trade.pnl, "position closed at end of test");
                state.trades.push(trade);
                closed_any = true;
            }
            if closed_any {
                equity_curve.pop();
                equity_curve.push(state.ledger.snapshot(last.timestamp));
            }
        }

        let metrics = metrics::calculate(
            self.config.initial_balance,
            &state.trades,
            &equity_curve,
            &self.config.metrics,
        );
        let final_balance = state.ledger.balance();

        let last_timestamp = bars.last().map_or(0, |bar| bar.timestamp);
        state.diagnostics.audit_events.push(self.audit(
            last_timestamp,
            "engine",
            "complete",
            None,
            json!({
                "bars_processed": state.diagnostics.bars_processed,
                "trades": state.trades.len(),
                "net_profit": metrics.net_profit,
                "strategy_errors": state.diagnostics.strategy_errors,
            }),
        ));
        debug!(
            run_id = %self.config.run_id,
            trades = state.trades.len(),
            final_balance,
            "replay complete"
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            strategy: strategy.name().to_string(),
            symbol: self.config.symbol.clone(),
            initial_balance: self.config.initial_balance,
            final_balance,
            metrics,
            trades: state.trades,
            equity_curve,
            diagnostics: state.diagnostics,
        })
    }

    fn process_exits(&self, state: &mut RunState, bar: &Bar, idx: usize) {
        let mut slot = 0;
        while slot < state.ledger.positions().len() {
            let pos = &state.ledger.positions()[slot];
            if pos.symbol != self.config.symbol {
                slot += 1;
                continue;
            }
            // Stop-loss is checked first so it wins a same-bar tie.
            let exit = if pos.stop_hit(bar.low, bar.high) {
                pos.stop_loss.map(|price| (price, ExitReason::StopLoss))
            } else if pos.target_hit(bar.low, bar.high) {
                pos.take_profit.map(|price| (price, ExitReason::TakeProfit))
            } else {
                None
            };
            match exit {
                Some((price, reason)) => {
                    let trade = state.ledger.close(
                        slot,
                        PositionExit {
                            price,
                            time: bar.timestamp,
                            index: idx,
                            reason,
                        },
                    );
                    debug!(
                        trade_id = trade.id,
                        reason = ?trade.exit_reason,
                        pips = trade.profit_pips,
                        pnl = trade.pnl,
                        "position closed"
                    );
                    state.trades.push(trade);
                }
                None => slot += 1,
            }
        }
    }

    fn apply_signal(
        &self,
        state: &mut RunState,
        fill: &FillModel,
        signal: &Signal,
        bar: &Bar,
        idx: usize,
    ) {
        let Some(direction) = signal.action.direction() else {
            return;
        };
        let symbol = signal.symbol.as_deref().unwrap_or(&self.config.symbol);
        if symbol != self.config.symbol {
            self.reject(state, bar, symbol, "symbol_mismatch", json!({ "bar_index": idx }));
            return;
        }
        let open = state.ledger.open_count(symbol);
        if open >= self.config.max_concurrent_positions_per_symbol {
            self.reject(
                state,
                bar,
                symbol,
                "position_limit",
                json!({ "bar_index": idx, "open_positions": open }),
            );
            return;
        }

        let entry_price = fill.entry_price(bar.close, direction);
        let stop_loss = signal
            .stop_loss
            .or(self.config.default_stop_loss_pips.map(PriceLevel::Pips))
            .map(|level| level.stop_price(entry_price, direction, self.config.pip_size));
        let take_profit = signal
            .take_profit
            .or(self.config.default_take_profit_pips.map(PriceLevel::Pips))
            .map(|level| level.target_price(entry_price, direction, self.config.pip_size));

        if !levels_bracket_entry(entry_price, direction, stop_loss, take_profit) {
            self.reject(
                state,
                bar,
                symbol,
                "invalid_levels",
                json!({
                    "bar_index": idx,
                    "entry_price": entry_price,
                    "stop_loss": stop_loss,
                    "take_profit": take_profit,
                }),
            );
            return;
        }

        let request = SizingRequest {
            signal,
            entry_price,
            stop_distance: stop_loss.map(|stop| (entry_price - stop).abs()),
            pip_size: self.config.pip_size,
            contract_size: self.config.contract_size,
        };
        let volume = self.sizer.size(&request, state.ledger.balance());
        if !(volume.is_finite() && volume > 0.0) {
            self.reject(
                state,
                bar,
                symbol,
                "non_positive_size",
                json!({ "bar_index": idx, "volume": volume }),
            );
            return;
        }

        let symbol = symbol.to_string();
        state.ledger.open(PositionEntry {
            symbol,
            direction,
            entry_time: bar.timestamp,
            entry_index: idx,
            entry_price,
            volume,
            stop_loss,
            take_profit,
        });
        state.diagnostics.signals_accepted += 1;
    }

    fn reject(
        &self,
        state: &mut RunState,
        bar: &Bar,
        symbol: &str,
        reason: &str,
        details: serde_json::Value,
    ) {
        state.diagnostics.signals_rejected += 1;
        let mut event = self.audit(bar.timestamp, "order", "reject", Some(reason.to_string()), details);
        event.symbol = Some(symbol.to_string());
        state.diagnostics.audit_events.push(event);
    }

    fn audit(
        &self,
        timestamp: i64,
        stage: &str,
        action: &str,
        error: Option<String>,
        details: serde_json::Value,
    ) -> AuditEvent {
        AuditEvent {
            run_id: self.config.run_id.clone(),
            timestamp,
            stage: stage.to_string(),
            symbol: Some(self.config.symbol.clone()),
            action: action.to_string(),
            error,
            details,
        }
    }
}

fn levels_bracket_entry(
    entry: f64,
    direction: Direction,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
) -> bool {
    let sign = direction.sign();
    let stop_ok = stop_loss.map_or(true, |stop| stop.is_finite() && (entry - stop) * sign > 0.0);
    let target_ok =
        take_profit.map_or(true, |target| target.is_finite() && (target - entry) * sign > 0.0);
    stop_ok && target_ok
}
