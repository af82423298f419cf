use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::position::OpenPosition;
use crate::value_objects::side::Direction;
use crate::value_objects::trade::{ExitReason, Trade};

/// Balance, open positions and running peak of a single run.
#[derive(Debug)]
pub struct AccountLedger {
    balance: f64,
    peak_equity: f64,
    positions: Vec<OpenPosition>,
    next_position_id: u64,
    contract_size: f64,
    pip_size: f64,
    commission_per_trade: f64,
}

pub struct PositionEntry {
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: i64,
    pub entry_index: usize,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

pub struct PositionExit {
    pub price: f64,
    pub time: i64,
    pub index: usize,
    pub reason: ExitReason,
}

impl AccountLedger {
    pub fn new(
        initial_balance: f64,
        contract_size: f64,
        pip_size: f64,
        commission_per_trade: f64,
    ) -> Self {
        Self {
            balance: initial_balance,
            peak_equity: initial_balance,
            positions: Vec::new(),
            next_position_id: 1,
            contract_size,
            pip_size,
            commission_per_trade,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn positions(&self) -> &[OpenPosition] {
        &self.positions
    }

    pub fn open_count(&self, symbol: &str) -> usize {
        self.positions
            .iter()
            .filter(|pos| pos.symbol == symbol)
            .count()
    }

    pub fn open(&mut self, entry: PositionEntry) -> &OpenPosition {
        let id = self.next_position_id;
        self.next_position_id += 1;
        self.positions.push(OpenPosition {
            id,
            symbol: entry.symbol,
            direction: entry.direction,
            entry_time: entry.entry_time,
            entry_index: entry.entry_index,
            entry_price: entry.entry_price,
            volume: entry.volume,
            stop_loss: entry.stop_loss,
            take_profit: entry.take_profit,
            unrealized_pnl: 0.0,
        });
        let last = self.positions.len() - 1;
        &self.positions[last]
    }

    pub fn mark(&mut self, symbol: &str, price: f64) {
        let contract_size = self.contract_size;
        for pos in self.positions.iter_mut().filter(|pos| pos.symbol == symbol) {
            pos.mark(price, contract_size);
        }
    }

    /// Removes the position at `slot`, realizes its P&L net of commission
    /// and returns the closed trade.
    pub fn close(&mut self, slot: usize, exit: PositionExit) -> Trade {
        let pos = self.positions.remove(slot);
        let profit_price = pos.price_pnl(exit.price);
        let profit_pips = round_tenth(profit_price / self.pip_size);
        let pnl = profit_price * pos.volume * self.contract_size - self.commission_per_trade;
        self.balance += pnl;

        Trade {
            id: pos.id,
            symbol: pos.symbol,
            direction: pos.direction,
            entry_time: pos.entry_time,
            entry_index: pos.entry_index,
            entry_price: pos.entry_price,
            volume: pos.volume,
            stop_loss: pos.stop_loss,
            take_profit: pos.take_profit,
            exit_time: exit.time,
            exit_index: exit.index,
            exit_price: exit.price,
            exit_reason: exit.reason,
            profit_price,
            profit_pips,
            commission: self.commission_per_trade,
            pnl,
        }
    }

    pub fn unrealized(&self) -> f64 {
        self.positions.iter().map(|pos| pos.unrealized_pnl).sum()
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized()
    }

    /// Snapshot of equity and drawdown against the running peak.
    pub fn snapshot(&mut self, timestamp: i64) -> EquityPoint {
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        let drawdown = (self.peak_equity - equity).max(0.0);
        let drawdown_pct = if self.peak_equity > 0.0 {
            drawdown / self.peak_equity
        } else {
            0.0
        };
        EquityPoint {
            timestamp,
            balance: self.balance,
            equity,
            open_positions: self.positions.len(),
            drawdown,
            drawdown_pct,
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
