pub mod audit;
pub mod comparison;
pub mod engine;
pub mod monte_carlo;
pub mod strategy;
pub mod stress;
