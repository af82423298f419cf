use crate::value_objects::side::Direction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: i64,
    pub entry_index: usize,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub unrealized_pnl: f64,
}

impl OpenPosition {
    /// Price distance moved in the position's favour.
    pub fn price_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign()
    }

    pub fn mark(&mut self, price: f64, contract_size: f64) {
        self.unrealized_pnl = self.price_pnl(price) * self.volume * contract_size;
    }

    pub fn stop_hit(&self, low: f64, high: f64) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(stop), Direction::Long) => low <= stop,
            (Some(stop), Direction::Short) => high >= stop,
            (None, _) => false,
        }
    }

    pub fn target_hit(&self, low: f64, high: f64) -> bool {
        match (self.take_profit, self.direction) {
            (Some(target), Direction::Long) => high >= target,
            (Some(target), Direction::Short) => low <= target,
            (None, _) => false,
        }
    }
}
