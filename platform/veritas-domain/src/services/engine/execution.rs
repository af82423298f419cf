use crate::value_objects::bar::Bar;
use crate::value_objects::side::Direction;
use serde::{Deserialize, Serialize};

/// Extra per-trade execution cost layered on top of the configured
/// slippage and spread.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    pub extra_slippage_pips: f64,
    pub extra_spread_pips: f64,
}

impl CostModel {
    pub fn slippage(pips: f64) -> Self {
        Self {
            extra_slippage_pips: pips,
            ..Self::default()
        }
    }

    pub fn spread(pips: f64) -> Self {
        Self {
            extra_spread_pips: pips,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillModel {
    pub slippage_pips: f64,
    pub spread_pips: f64,
    pub pip_size: f64,
}

impl FillModel {
    pub fn new(slippage_pips: f64, spread_pips: f64, pip_size: f64, costs: CostModel) -> Self {
        Self {
            slippage_pips: slippage_pips + costs.extra_slippage_pips,
            spread_pips: spread_pips + costs.extra_spread_pips,
            pip_size,
        }
    }

    /// Entry fills against the trader: above the close for longs, below for
    /// shorts.
    pub fn entry_price(&self, close: f64, direction: Direction) -> f64 {
        close + direction.sign() * (self.slippage_pips + self.spread_pips) * self.pip_size
    }
}

/// Rewrites the bar series before replay.
pub trait MarketTransform: Send + Sync {
    fn label(&self) -> String;

    fn apply(&self, bars: &[Bar]) -> Vec<Bar>;
}
