//! Band screeners: close price, RSI and ATR percent each inside a range.

use crate::domain::Bar;
use crate::indicators::{atr, closes, latest, rsi};

use super::{metadata, Metadata, Screener};

/// `min_price <= close <= max_price` on the latest bar.
#[derive(Debug, Clone)]
pub struct PriceRange {
    min_price: f64,
    max_price: f64,
}

impl PriceRange {
    pub fn new(min_price: f64, max_price: f64) -> Self {
        Self {
            min_price,
            max_price,
        }
    }
}

impl Screener for PriceRange {
    fn id(&self) -> &str {
        "price_range"
    }

    fn min_bars_required(&self) -> usize {
        1
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let close = bars.last()?.close;
        (close >= self.min_price && close <= self.max_price)
            .then(|| metadata([("price", close)]))
    }
}

/// `min_rsi <= RSI(period) <= max_rsi` on the latest bar.
#[derive(Debug, Clone)]
pub struct RsiRange {
    period: usize,
    min_rsi: f64,
    max_rsi: f64,
}

impl RsiRange {
    pub fn new(period: usize, min_rsi: f64, max_rsi: f64) -> Self {
        Self {
            period,
            min_rsi,
            max_rsi,
        }
    }
}

impl Screener for RsiRange {
    fn id(&self) -> &str {
        "rsi_range"
    }

    fn min_bars_required(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let value = latest(&rsi(&closes(bars), self.period))?;
        (value >= self.min_rsi && value <= self.max_rsi).then(|| metadata([("rsi", value)]))
    }
}

/// ATR(period) as a percentage of close inside `[min_pct, max_pct]`.
#[derive(Debug, Clone)]
pub struct AtrPercent {
    period: usize,
    min_pct: f64,
    max_pct: f64,
}

impl AtrPercent {
    pub fn new(period: usize, min_pct: f64, max_pct: f64) -> Self {
        Self {
            period,
            min_pct,
            max_pct,
        }
    }
}

impl Screener for AtrPercent {
    fn id(&self) -> &str {
        "atr_percent"
    }

    fn min_bars_required(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let close = bars.last()?.close;
        if close <= 0.0 {
            return None;
        }
        let value = latest(&atr(bars, self.period))?;
        let pct = value / close * 100.0;
        (pct >= self.min_pct && pct <= self.max_pct)
            .then(|| metadata([("atr", value), ("atr_pct", pct)]))
    }
}
