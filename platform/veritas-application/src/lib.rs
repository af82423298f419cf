pub mod backtesting;
pub mod comparison;
pub mod config;
pub mod monte_carlo;
pub mod reporting;
mod shared;
pub mod stress;
pub mod workers;

pub use shared::{
    resolve_engine_config, resolve_metrics_config, resolve_monte_carlo_config, resolve_scenarios,
    resolve_score_weights, resolve_sizer, resolve_strategy, resolve_workers,
};
