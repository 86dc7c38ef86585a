//! Rolling statistics: standard deviation, Pearson correlation, rate of change.

/// Rolling population standard deviation over `period`.
pub fn std_dev(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        result[i] = var.sqrt();
    }

    result
}

/// Rolling Pearson correlation of `x` and `y` over `period`.
///
/// Output has the length of `x`; positions beyond `y` are NaN. A window in
/// which either series has zero variance is NaN.
pub fn correlation(x: &[f64], y: &[f64], period: usize) -> Vec<f64> {
    let n = x.len();
    let mut result = vec![f64::NAN; n];

    if period < 2 {
        return result;
    }

    let usable = n.min(y.len());
    if usable < period {
        return result;
    }

    for i in (period - 1)..usable {
        let wx = &x[i + 1 - period..=i];
        let wy = &y[i + 1 - period..=i];
        if wx.iter().chain(wy).any(|v| v.is_nan()) {
            continue;
        }
        let mx = wx.iter().sum::<f64>() / period as f64;
        let my = wy.iter().sum::<f64>() / period as f64;
        let mut cov = 0.0;
        let mut vx = 0.0;
        let mut vy = 0.0;
        for (a, b) in wx.iter().zip(wy) {
            cov += (a - mx) * (b - my);
            vx += (a - mx).powi(2);
            vy += (b - my).powi(2);
        }
        if vx == 0.0 || vy == 0.0 {
            continue;
        }
        result[i] = (cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0);
    }

    result
}

/// Rate of change in percent: (x[t] / x[t-period] - 1) * 100.
pub fn roc(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 {
        return result;
    }

    for i in period..n {
        let base = values[i - period];
        let cur = values[i];
        if base.is_nan() || cur.is_nan() || base == 0.0 {
            continue;
        }
        result[i] = (cur / base - 1.0) * 100.0;
    }

    result
}
