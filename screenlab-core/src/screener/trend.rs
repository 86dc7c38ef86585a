//! Trend screeners: stacked moving averages and proximity to a recent high.

use crate::domain::Bar;
use crate::indicators::{closes, ema, latest, sma};

use super::{metadata, Metadata, Screener};

/// Moving average flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaType {
    Sma,
    Ema,
}

impl MaType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sma" => Some(MaType::Sma),
            "ema" => Some(MaType::Ema),
            _ => None,
        }
    }

    fn compute(self, values: &[f64], period: usize) -> Vec<f64> {
        match self {
            MaType::Sma => sma(values, period),
            MaType::Ema => ema(values, period),
        }
    }
}

/// Which way the averages must stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaDirection {
    Bullish,
    Bearish,
}

impl MaDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bullish" => Some(MaDirection::Bullish),
            "bearish" => Some(MaDirection::Bearish),
            _ => None,
        }
    }
}

/// Close, fast, medium and slow averages strictly ordered.
///
/// Bullish: close > fast > medium > slow. Bearish: the reverse.
#[derive(Debug, Clone)]
pub struct MaAlignment {
    fast: usize,
    medium: usize,
    slow: usize,
    ma_type: MaType,
    direction: MaDirection,
}

impl MaAlignment {
    pub fn new(
        fast: usize,
        medium: usize,
        slow: usize,
        ma_type: MaType,
        direction: MaDirection,
    ) -> Self {
        Self {
            fast,
            medium,
            slow,
            ma_type,
            direction,
        }
    }
}

impl Screener for MaAlignment {
    fn id(&self) -> &str {
        "ma_alignment"
    }

    fn min_bars_required(&self) -> usize {
        self.fast.max(self.medium).max(self.slow)
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let close_series = closes(bars);
        let close = *close_series.last()?;
        let fast = latest(&self.ma_type.compute(&close_series, self.fast))?;
        let medium = latest(&self.ma_type.compute(&close_series, self.medium))?;
        let slow = latest(&self.ma_type.compute(&close_series, self.slow))?;

        let aligned = match self.direction {
            MaDirection::Bullish => close > fast && fast > medium && medium > slow,
            MaDirection::Bearish => close < fast && fast < medium && medium < slow,
        };
        aligned.then(|| {
            metadata([
                ("price", close),
                ("ma_fast", fast),
                ("ma_medium", medium),
                ("ma_slow", slow),
            ])
        })
    }
}

/// Close within `within_pct` percent of the highest high of the last
/// `lookback` bars.
#[derive(Debug, Clone)]
pub struct NearHigh {
    lookback: usize,
    within_pct: f64,
}

impl NearHigh {
    pub fn new(lookback: usize, within_pct: f64) -> Self {
        Self {
            lookback: lookback.max(1),
            within_pct,
        }
    }
}

impl Screener for NearHigh {
    fn id(&self) -> &str {
        "near_high"
    }

    fn min_bars_required(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let window = bars.get(bars.len().checked_sub(self.lookback)?..)?;
        let high = window.iter().map(|b| b.high).fold(f64::NAN, f64::max);
        let close = window.last()?.close;
        if high.is_nan() || high <= 0.0 {
            return None;
        }
        let pct_from_high = (high - close) / high * 100.0;
        (pct_from_high <= self.within_pct).then(|| {
            metadata([
                ("price", close),
                ("high", high),
                ("pct_from_high", pct_from_high),
            ])
        })
    }
}
