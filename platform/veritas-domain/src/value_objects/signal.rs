use crate::value_objects::side::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    None,
}

impl SignalAction {
    pub fn direction(self) -> Option<Direction> {
        match self {
            SignalAction::Buy => Some(Direction::Long),
            SignalAction::Sell => Some(Direction::Short),
            SignalAction::None => None,
        }
    }
}

/// Stop-loss or take-profit either as an absolute price or as a pip offset
/// measured from the fill price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    Price(f64),
    Pips(f64),
}

impl PriceLevel {
    pub fn stop_price(self, entry: f64, direction: Direction, pip_size: f64) -> f64 {
        match self {
            PriceLevel::Price(price) => price,
            PriceLevel::Pips(pips) => entry - direction.sign() * pips * pip_size,
        }
    }

    pub fn target_price(self, entry: f64, direction: Direction, pip_size: f64) -> f64 {
        match self {
            PriceLevel::Price(price) => price,
            PriceLevel::Pips(pips) => entry + direction.sign() * pips * pip_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<PriceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<PriceLevel>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Signal {
    pub fn new(action: SignalAction) -> Self {
        Self {
            action,
            symbol: None,
            stop_loss: None,
            take_profit: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn buy() -> Self {
        Self::new(SignalAction::Buy)
    }

    pub fn sell() -> Self {
        Self::new(SignalAction::Sell)
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_stop_loss(mut self, level: PriceLevel) -> Self {
        self.stop_loss = Some(level);
        self
    }

    pub fn with_take_profit(mut self, level: PriceLevel) -> Self {
        self.take_profit = Some(level);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
