use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use veritas_domain::value_objects::bar::Bar;

#[derive(Debug, Deserialize)]
pub struct OhlcvRecord {
    #[serde(alias = "timestamp")]
    pub timestamp_utc: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

pub fn load_csv(path: &Path) -> Result<Vec<Bar>, String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open OHLCV CSV {}: {}", path.display(), err))?;
    let bars = read_bars(file).map_err(|err| format!("{}: {}", path.display(), err))?;
    metrics::counter!("veritas.data.rows_loaded").increment(bars.len() as u64);
    Ok(bars)
}

/// Parses OHLCV rows and enforces strictly increasing timestamps. Duplicate
/// or out-of-order rows are an error naming the offending line.
pub fn read_bars<R: Read>(source: R) -> Result<Vec<Bar>, String> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let mut bars: Vec<Bar> = Vec::new();

    for (idx, result) in reader.deserialize::<OhlcvRecord>().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = result.map_err(|err| format!("failed to parse CSV row {line}: {err}"))?;
        let timestamp = parse_timestamp(&record.timestamp_utc)
            .map_err(|err| format!("line {line}: {err}"))?;
        let bar = Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        );
        validate_bar(&bar).map_err(|err| format!("line {line}: {err}"))?;

        if let Some(prev) = bars.last() {
            if timestamp == prev.timestamp {
                return Err(format!(
                    "line {line}: duplicate timestamp {}",
                    record.timestamp_utc
                ));
            }
            if timestamp < prev.timestamp {
                return Err(format!(
                    "line {line}: out-of-order timestamp {} (previous row is later)",
                    record.timestamp_utc
                ));
            }
        }
        bars.push(bar);
    }

    Ok(bars)
}

fn validate_bar(bar: &Bar) -> Result<(), String> {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return Err("prices must be finite and > 0".to_string());
    }
    if bar.high < bar.open.max(bar.close) || bar.low > bar.open.min(bar.close) {
        return Err(format!(
            "inconsistent bar: high {} / low {} do not bracket open {} / close {}",
            bar.high, bar.low, bar.open, bar.close
        ));
    }
    if !bar.volume.is_finite() || bar.volume < 0.0 {
        return Err("volume must be finite and >= 0".to_string());
    }
    Ok(())
}

pub fn parse_timestamp(value: &str) -> Result<i64, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        let dt: DateTime<Utc> = Utc.from_utc_datetime(&naive);
        return Ok(dt.timestamp());
    }
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }

    Err(format!("unsupported timestamp format: {}", value))
}
