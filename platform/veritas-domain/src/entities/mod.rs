pub mod ledger;
pub mod metrics;
pub mod risk;
