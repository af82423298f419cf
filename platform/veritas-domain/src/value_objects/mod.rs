pub mod bar;
pub mod equity_point;
pub mod position;
pub mod sentinel;
pub mod side;
pub mod signal;
pub mod timeframe;
pub mod trade;
