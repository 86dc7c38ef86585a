//! Exponential moving average.
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2/(period+1).
//! Seed: EMA[period-1] = SMA of the first `period` values.
//! A NaN input taints every later value.

/// Exponential moving average of `values` over `period`.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let (head, rest) = values.split_at(period);
    if head.iter().any(|v| v.is_nan()) {
        return out;
    }
    let mut current = head.iter().sum::<f64>() / period as f64;
    out[period - 1] = current;

    let alpha = 2.0 / (period as f64 + 1.0);
    for (slot, &x) in out[period..].iter_mut().zip(rest) {
        if x.is_nan() {
            break;
        }
        current += alpha * (x - current);
        *slot = current;
    }
    out
}
