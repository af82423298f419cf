pub mod backtest;
pub mod execution;
