use crate::value_objects::signal::Signal;
use serde::{Deserialize, Serialize};

const LOT_EPSILON: f64 = 1e-6;

/// What a sizer gets to see about a prospective entry.
#[derive(Debug, Clone)]
pub struct SizingRequest<'a> {
    pub signal: &'a Signal,
    pub entry_price: f64,
    /// Absolute price distance to the stop, when the entry has one.
    pub stop_distance: Option<f64>,
    pub pip_size: f64,
    pub contract_size: f64,
}

/// Position-sizing policy injected into the engine.
pub trait RiskSizer: Send + Sync {
    fn size(&self, request: &SizingRequest<'_>, balance: f64) -> f64;
}

impl<F> RiskSizer for F
where
    F: Fn(&SizingRequest<'_>, f64) -> f64 + Send + Sync,
{
    fn size(&self, request: &SizingRequest<'_>, balance: f64) -> f64 {
        self(request, balance)
    }
}

/// Risks a fixed fraction of the balance between entry and stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedFractionalSizer {
    pub risk_fraction: f64,
    pub min_volume: f64,
    pub max_volume: f64,
}

impl Default for FixedFractionalSizer {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01,
            min_volume: 0.01,
            max_volume: 100.0,
        }
    }
}

impl RiskSizer for FixedFractionalSizer {
    fn size(&self, request: &SizingRequest<'_>, balance: f64) -> f64 {
        if balance <= 0.0 || !balance.is_finite() {
            return 0.0;
        }
        let raw = match request.stop_distance {
            Some(distance) if distance > 0.0 && request.contract_size > 0.0 => {
                balance * self.risk_fraction / (distance * request.contract_size)
            }
            _ => self.min_volume,
        };
        if !raw.is_finite() {
            return 0.0;
        }
        // Tolerance keeps float noise in the stop distance from costing a lot step.
        let lots = (raw * 100.0 + LOT_EPSILON).floor() / 100.0;
        lots.clamp(self.min_volume, self.max_volume.max(self.min_volume))
    }
}
