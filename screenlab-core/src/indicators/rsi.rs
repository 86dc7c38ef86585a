//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! First valid value at index `period`.
//! Edge cases: avg_loss == 0 → RSI = 100; both zero → RSI = 50.

/// Wilder RSI of `values` over `period`.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period + 1 {
        return result;
    }

    let change = |i: usize| values[i] - values[i - 1];

    // Seed: average gain and loss over the first `period` changes
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = change(i);
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    result[period] = rsi_from_averages(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = change(i);
        if ch.is_nan() {
            return result;
        }
        let gain = ch.max(0.0);
        let loss = (-ch).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_all_gains_is_100() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = rsi(&values, 14);
        assert!(result[13].is_nan());
        assert_approx(result[14], 100.0, DEFAULT_EPSILON);
        assert_approx(result[19], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let result = rsi(&values, 14);
        assert_approx(result[19], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_flat_is_50() {
        let result = rsi(&[42.0; 16], 14);
        assert_approx(result[15], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_alternating_is_balanced() {
        let values: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let result = rsi(&values, 14);
        let last = result[29];
        assert!(last > 40.0 && last < 60.0, "rsi={last}");
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let values: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 23) as f64 - 11.0)
            .collect();
        for v in rsi(&values, 14).into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn rsi_insufficient_data() {
        assert!(rsi(&[1.0, 2.0, 3.0], 14).iter().all(|v| v.is_nan()));
    }
}
