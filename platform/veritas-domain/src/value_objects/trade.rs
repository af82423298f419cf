use crate::value_objects::side::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfTest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: i64,
    pub entry_index: usize,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub exit_time: i64,
    pub exit_index: usize,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit_price: f64,
    pub profit_pips: f64,
    pub commission: f64,
    pub pnl: f64,
}

impl Trade {
    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.entry_index)
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}
