use serde::{Deserialize, Serialize};

pub const SECONDS_PER_YEAR: f64 = 365.25 * 86_400.0;

const KNOWN_LABELS: &[(&[&str], &str, i64)] = &[
    (&["1m", "1min", "m1"], "1min", 60),
    (&["5m", "5min", "m5"], "5min", 300),
    (&["15m", "15min", "m15"], "15min", 900),
    (&["30m", "30min", "m30"], "30min", 1_800),
    (&["1h", "1hour", "h1"], "1hour", 3_600),
    (&["4h", "4hour", "h4"], "4hour", 14_400),
    (&["1d", "1day", "d1"], "1day", 86_400),
    (&["1w", "1week", "w1"], "1week", 604_800),
];

/// Bar interval of a series. Drives the annualization of periodic returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub step_seconds: i64,
}

impl Timeframe {
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value.trim().to_lowercase();
        if let Some((_, label, step)) = KNOWN_LABELS
            .iter()
            .find(|(aliases, _, _)| aliases.contains(&normalized.as_str()))
        {
            return Ok(Self {
                label: label.to_string(),
                step_seconds: *step,
            });
        }
        let seconds = parse_duration_like_seconds(&normalized)
            .map_err(|_| format!("unsupported timeframe: {value}"))?;
        Self::from_step_seconds(seconds)
    }

    pub fn from_step_seconds(step_seconds: i64) -> Result<Self, String> {
        if step_seconds <= 0 {
            return Err(format!("invalid timeframe seconds: {step_seconds}"));
        }
        Ok(Self {
            label: format!("{step_seconds}s"),
            step_seconds,
        })
    }
}

/// Median spacing between consecutive timestamps, ignoring non-positive deltas.
pub fn median_step_seconds(timestamps: &[i64]) -> Option<i64> {
    let mut deltas: Vec<i64> = timestamps
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|delta| *delta > 0)
        .collect();
    if deltas.is_empty() {
        return None;
    }
    deltas.sort_unstable();
    Some(deltas[deltas.len() / 2])
}

pub fn parse_duration_like_seconds(value: &str) -> Result<i64, String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }

    let split_at = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number_part, unit) = trimmed.split_at(split_at);
    let multiplier = match unit {
        "s" | "sec" => 1,
        "m" | "min" => 60,
        "h" | "hour" => 3_600,
        "d" | "day" => 86_400,
        "w" | "week" => 604_800,
        _ => return Err(format!("unsupported duration unit: {unit}")),
    };
    let number: i64 = number_part
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration out of range: {value}"))
}
