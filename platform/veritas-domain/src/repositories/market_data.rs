use crate::value_objects::bar::Bar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarQuery {
    pub symbol: String,
    pub timeframe: String,
    /// Inclusive lower bound, epoch seconds.
    pub start: Option<i64>,
    /// Inclusive upper bound, epoch seconds.
    pub end: Option<i64>,
}

impl BarQuery {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp <= end)
    }
}

/// Source of historical bars. Implementations return bars in strictly
/// increasing timestamp order or an error.
pub trait MarketDataRepository {
    fn get_bars(&self, query: &BarQuery) -> Result<Vec<Bar>, String>;
}

/// Checks the ordering contract every repository must honour.
pub fn ensure_strictly_increasing(bars: &[Bar]) -> Result<(), String> {
    for (idx, pair) in bars.windows(2).enumerate() {
        let (prev, next) = (pair[0].timestamp, pair[1].timestamp);
        if next == prev {
            return Err(format!("duplicate timestamp {next} at bar {}", idx + 1));
        }
        if next < prev {
            return Err(format!(
                "out-of-order timestamp {next} at bar {} (previous {prev})",
                idx + 1
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_bounds_are_inclusive() {
        let mut query = BarQuery::new("EURUSD", "1h");
        query.start = Some(10);
        query.end = Some(20);
        assert!(query.contains(10));
        assert!(query.contains(20));
        assert!(!query.contains(21));
    }

    #[test]
    fn ordering_check_reports_duplicates() {
        let bars = vec![
            Bar::new(1, 1.0, 1.0, 1.0, 1.0, 0.0),
            Bar::new(1, 1.0, 1.0, 1.0, 1.0, 0.0),
        ];
        let err = ensure_strictly_increasing(&bars).unwrap_err();
        assert!(err.contains("duplicate"));
    }
}
