use crate::value_objects::bar::Bar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const CRASH_DECLINE_BARS: usize = 5;
pub const CRASH_RECOVERY_BARS: usize = 8;
/// Transformed prices never fall below this.
const MIN_PRICE: f64 = 1e-9;

fn floored(bar: Bar) -> Bar {
    Bar {
        open: bar.open.max(MIN_PRICE),
        high: bar.high.max(MIN_PRICE),
        low: bar.low.max(MIN_PRICE),
        close: bar.close.max(MIN_PRICE),
        ..bar
    }
}

/// Scale each bar's high/low distance from the open/close midpoint.
/// Open and close are left untouched.
pub fn widen(bar: &Bar, factor: f64) -> Bar {
    let mid = bar.body_mid();
    floored(Bar {
        high: mid + (bar.high - mid) * factor,
        low: mid - (mid - bar.low) * factor,
        ..*bar
    })
}

pub fn widen_all(bars: &[Bar], factor: f64) -> Vec<Bar> {
    bars.iter().map(|bar| widen(bar, factor)).collect()
}

/// Uniform index within the 30-70% band of the series.
pub fn event_index(len: usize, rng: &mut StdRng) -> usize {
    if len == 0 {
        return 0;
    }
    let lo = (len as f64 * 0.3) as usize;
    let hi = ((len as f64 * 0.7) as usize).clamp(lo, len - 1);
    rng.gen_range(lo..=hi)
}

/// Shift every bar from a random index onwards by `gap_fraction` of that
/// bar's close, downwards unless `up`.
pub fn gap(bars: &[Bar], gap_fraction: f64, up: bool, seed: u64) -> Vec<Bar> {
    let mut out = bars.to_vec();
    if bars.is_empty() {
        return out;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let idx = event_index(bars.len(), &mut rng);
    let sign = if up { 1.0 } else { -1.0 };
    let offset = bars[idx].close * gap_fraction * sign;
    for bar in &mut out[idx..] {
        *bar = floored(bar.shifted(offset));
    }
    out
}

/// Offset applied to the bar `step` bars after the crash starts.
fn crash_offset(step: usize, drop: f64, recovery_fraction: f64) -> f64 {
    if step < CRASH_DECLINE_BARS {
        -drop * (step + 1) as f64 / CRASH_DECLINE_BARS as f64
    } else if step < CRASH_DECLINE_BARS + CRASH_RECOVERY_BARS {
        let k = step - CRASH_DECLINE_BARS + 1;
        -drop + drop * recovery_fraction * k as f64 / CRASH_RECOVERY_BARS as f64
    } else {
        -drop * (1.0 - recovery_fraction)
    }
}

/// Steep decline of `crash_fraction` over five bars, partial recovery over
/// eight, then the residual drop carried to the end of the series.
pub fn flash_crash(bars: &[Bar], crash_fraction: f64, recovery_fraction: f64, seed: u64) -> Vec<Bar> {
    let mut out = bars.to_vec();
    if bars.is_empty() {
        return out;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let idx = event_index(bars.len(), &mut rng);
    let reference = if idx > 0 {
        bars[idx - 1].close
    } else {
        bars[idx].open
    };
    let drop = reference * crash_fraction;
    for (step, bar) in out[idx..].iter_mut().enumerate() {
        *bar = floored(bar.shifted(crash_offset(step, drop, recovery_fraction)));
    }
    out
}

/// Widen high/low over one contiguous window covering `window_fraction` of
/// the series.
pub fn volatility_window(bars: &[Bar], factor: f64, window_fraction: f64, seed: u64) -> Vec<Bar> {
    let mut out = bars.to_vec();
    if bars.is_empty() {
        return out;
    }
    let len = ((bars.len() as f64 * window_fraction).round() as usize).clamp(1, bars.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let start = rng.gen_range(0..=bars.len() - len);
    for bar in &mut out[start..start + len] {
        *bar = widen(bar, factor);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(len: usize) -> Vec<Bar> {
        (0..len)
            .map(|i| Bar::new(i as i64, 100.0, 101.0, 99.0, 100.0, 1.0))
            .collect()
    }

    #[test]
    fn widen_keeps_body_and_scales_range() {
        let bar = Bar::new(0, 100.0, 102.0, 97.0, 101.0, 1.0);
        let wide = widen(&bar, 2.0);
        assert_eq!(wide.open, 100.0);
        assert_eq!(wide.close, 101.0);
        assert_eq!(wide.high, 103.5);
        assert_eq!(wide.low, 93.5);
    }

    #[test]
    fn gap_lands_inside_middle_band_and_persists() {
        let bars = series(100);
        let out = gap(&bars, 0.02, false, 9);
        let idx = out.iter().position(|b| b.close != 100.0).unwrap();
        assert!((30..=70).contains(&idx));
        assert!(out[idx..].iter().all(|b| (b.close - 98.0).abs() < 1e-9));
        assert!(out[..idx].iter().all(|b| b.close == 100.0));
    }

    #[test]
    fn flash_crash_bottoms_then_recovers_partially() {
        let bars = series(200);
        let out = flash_crash(&bars, 0.10, 0.5, 3);
        let lowest = out.iter().map(|b| b.close).fold(f64::INFINITY, f64::min);
        assert!((lowest - 90.0).abs() < 1e-9);
        let last = out.last().unwrap().close;
        assert!((last - 95.0).abs() < 1e-9);
    }

    #[test]
    fn transforms_are_deterministic_per_seed() {
        let bars = series(120);
        assert_eq!(volatility_window(&bars, 3.0, 0.1, 5), volatility_window(&bars, 3.0, 0.1, 5));
        let widened = volatility_window(&bars, 3.0, 0.1, 5)
            .iter()
            .filter(|b| b.high > 101.0)
            .count();
        assert_eq!(widened, 12);
    }

    #[test]
    fn deep_gaps_and_crashes_keep_prices_positive() {
        let falling: Vec<Bar> = (0..100)
            .map(|i| {
                let close = 100.0 - i as f64 * 0.5;
                Bar::new(i as i64, close, close + 0.5, close - 0.5, close, 1.0)
            })
            .collect();
        for out in [
            gap(&falling, 0.99, false, 4),
            flash_crash(&falling, 0.99, 0.0, 4),
            widen_all(&falling, 500.0),
        ] {
            assert!(out
                .iter()
                .all(|b| b.open > 0.0 && b.high > 0.0 && b.low > 0.0 && b.close > 0.0));
        }
    }
}
