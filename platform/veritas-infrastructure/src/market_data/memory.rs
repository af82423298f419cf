use std::collections::BTreeMap;
use veritas_domain::repositories::market_data::{
    ensure_strictly_increasing, BarQuery, MarketDataRepository,
};
use veritas_domain::value_objects::bar::Bar;

/// Bars held in memory per symbol, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    series: BTreeMap<String, Vec<Bar>>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, String> {
        self.insert(symbol, bars)?;
        Ok(self)
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Result<(), String> {
        ensure_strictly_increasing(&bars)?;
        self.series.insert(symbol.into(), bars);
        Ok(())
    }
}

impl MarketDataRepository for InMemoryMarketData {
    fn get_bars(&self, query: &BarQuery) -> Result<Vec<Bar>, String> {
        let bars = self
            .series
            .get(&query.symbol)
            .ok_or_else(|| format!("no bars for symbol {}", query.symbol))?;
        Ok(bars
            .iter()
            .filter(|bar| query.contains(bar.timestamp))
            .copied()
            .collect())
    }
}
