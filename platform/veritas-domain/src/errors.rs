use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("insufficient data: {bars} bars available, at least {required} required")]
    InsufficientData { bars: usize, required: usize },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid scenario configuration: {0}")]
    ScenarioConfiguration(String),

    #[error("run cancelled at bar {bar_index}")]
    Cancelled { bar_index: usize },

    #[error("worker failure: {0}")]
    Worker(String),
}

/// Returned by a strategy when it cannot evaluate a window. The engine
/// recovers from it per bar and reports the count after the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("strategy evaluation failed: {message}")]
pub struct StrategyEvaluationError {
    pub message: String,
}

impl StrategyEvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_counts() {
        let err = BacktestError::InsufficientData {
            bars: 10,
            required: 51,
        };
        let text = err.to_string();
        assert!(text.contains("10"));
        assert!(text.contains("51"));
    }
}
