use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: i64,
    pub balance: f64,
    pub equity: f64,
    pub open_positions: usize,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}
