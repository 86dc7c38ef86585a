//! True Range and Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), falling back
//! to high-low when there is no previous bar.
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of
//! TR[1..=period]. First valid value at index `period`.

use crate::domain::Bar;

/// True range of `bar` given the bar before it, if any.
pub fn true_range(bar: &Bar, prev: Option<&Bar>) -> f64 {
    let hl = bar.high - bar.low;
    match prev {
        None => hl,
        Some(p) => hl
            .max((bar.high - p.close).abs())
            .max((bar.low - p.close).abs()),
    }
}

/// True range for every bar in the series.
pub fn true_range_series(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| true_range(bar, i.checked_sub(1).map(|p| &bars[p])))
        .collect()
}

/// Wilder-smoothed average true range.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    let n = bars.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period + 1 {
        return result;
    }

    let tr = true_range_series(bars);

    // TR[0] has no previous close, so the seed window starts at index 1.
    let seed_window = &tr[1..=period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = seed_window.iter().sum::<f64>() / period as f64;
    result[period] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in (period + 1)..n {
        if tr[i].is_nan() {
            return result;
        }
        let smoothed = alpha * tr[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_ohlc_bars, DEFAULT_EPSILON};

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 105-95 = 10
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, |108-102|, |100-102|) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, |107-106|, |98-106|) = 9
        ]);
        let tr = true_range_series(&bars);
        assert_approx(tr[0], 10.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_without_previous_bar_is_high_low() {
        let bars = make_ohlc_bars(&[(110.0, 115.0, 108.0, 112.0)]);
        assert_approx(true_range(&bars[0], None), 7.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, |115-100|, |108-100|) = 15
        ]);
        assert_approx(true_range(&bars[1], Some(&bars[0])), 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10 (unused in seed)
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 103.0, 97.0, 101.0),   // TR = 6
            (101.0, 104.0, 100.0, 103.0), // TR = 4
        ]);
        let result = atr(&bars, 3);
        assert!(result[2].is_nan());
        // seed = (8 + 9 + 6) / 3
        let seed = 23.0 / 3.0;
        assert_approx(result[3], seed, DEFAULT_EPSILON);
        assert_approx(result[4], (4.0 + 2.0 * seed) / 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_insufficient_bars() {
        let bars = make_ohlc_bars(&[(1.0, 2.0, 0.5, 1.5); 3]);
        assert!(atr(&bars, 3).iter().all(|v| v.is_nan()));
    }
}
