//! One daily OHLCV row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar. The owning symbol is the key of the series it lives in.
///
/// Volume is fractional because the flat-file database stores
/// split-adjusted volumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub open_interest: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            open_interest: 0.0,
        }
    }

    /// Any price or volume missing (NaN).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Prices are ordered (`low <= open, close <= high`), close is positive
    /// and volume is non-negative.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        let body_lo = self.open.min(self.close);
        let body_hi = self.open.max(self.close);
        self.low <= body_lo && body_hi <= self.high && self.close > 0.0 && self.volume >= 0.0
    }

    /// Traded value of the bar: close × volume.
    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}
