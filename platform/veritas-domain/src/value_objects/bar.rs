use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Midpoint of the open/close body.
    pub fn body_mid(&self) -> f64 {
        (self.open + self.close) / 2.0
    }

    /// Shift every price by `offset`, keeping the bar's shape.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            open: self.open + offset,
            high: self.high + offset,
            low: self.low + offset,
            close: self.close + offset,
            ..*self
        }
    }
}
