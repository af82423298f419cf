pub mod memory;
pub mod ohlcv;

use std::path::PathBuf;
use tracing::debug;
use veritas_domain::repositories::market_data::{BarQuery, MarketDataRepository};
use veritas_domain::value_objects::bar::Bar;

pub use memory::InMemoryMarketData;

/// Reads one symbol's bars from a CSV file with a
/// `timestamp_utc,open,high,low,close,volume` header.
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    path: PathBuf,
}

impl CsvMarketData {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketDataRepository for CsvMarketData {
    fn get_bars(&self, query: &BarQuery) -> Result<Vec<Bar>, String> {
        let bars = ohlcv::load_csv(&self.path)?;
        let total = bars.len();
        let selected: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| query.contains(bar.timestamp))
            .collect();
        debug!(
            path = %self.path.display(),
            symbol = %query.symbol,
            total,
            selected = selected.len(),
            "csv bars selected"
        );
        Ok(selected)
    }
}
