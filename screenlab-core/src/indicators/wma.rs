//! Weighted Moving Average (WMA).
//!
//! WMA(n) = (1*x[i-n+1] + 2*x[i-n+2] + ... + n*x[i]) / (n*(n+1)/2)
//! First valid value at index period-1.

/// Linearly weighted moving average of `values` over `period`.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let divisor = (period * (period + 1)) as f64 / 2.0;

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(w, v)| (w + 1) as f64 * v)
            .sum();
        result[i] = weighted / divisor;
    }

    result
}
