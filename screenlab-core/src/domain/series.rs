//! Shared bar series and the symbol → series cache.
//!
//! A `BarSeries` is a window over reference-counted bar storage. Narrowing a
//! series (to a date prefix, a date range, or the last N bars) produces a new
//! view onto the same allocation, so point-in-time caches never copy bars.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Bar;

/// Symbol → ordered bar series. `BTreeMap` keeps iteration deterministic.
pub type BarCache = BTreeMap<String, BarSeries>;

/// Immutable, cheaply cloneable view over an ascending-by-date bar sequence.
#[derive(Clone)]
pub struct BarSeries {
    bars: Arc<[Bar]>,
    start: usize,
    end: usize,
}

impl BarSeries {
    /// Build a series from bars already sorted ascending by date.
    pub fn new(bars: Vec<Bar>) -> Self {
        let end = bars.len();
        Self {
            bars: bars.into(),
            start: 0,
            end,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn as_slice(&self) -> &[Bar] {
        &self.bars[self.start..self.end]
    }

    /// Prefix of the series whose dates are `<= date`.
    pub fn upto(&self, date: NaiveDate) -> Self {
        let cut = self.as_slice().partition_point(|b| b.date <= date);
        self.window(0, cut)
    }

    /// Bars with `from <= date <= to`. Empty when `to < from`.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> Self {
        let bars = self.as_slice();
        let lo = bars.partition_point(|b| b.date < from);
        let hi = bars.partition_point(|b| b.date <= to);
        if hi <= lo {
            return self.window(lo, lo);
        }
        self.window(lo, hi)
    }

    /// The last `n` bars (or all of them if the series is shorter).
    pub fn tail(&self, n: usize) -> Self {
        let len = self.len();
        self.window(len.saturating_sub(n), len)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.as_slice().first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.as_slice().last().map(|b| b.date)
    }

    /// True when both views point into the same allocation.
    pub fn shares_storage_with(&self, other: &BarSeries) -> bool {
        Arc::ptr_eq(&self.bars, &other.bars)
    }

    fn window(&self, from: usize, to: usize) -> Self {
        Self {
            bars: Arc::clone(&self.bars),
            start: self.start + from,
            end: self.start + to,
        }
    }
}

impl Default for BarSeries {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for BarSeries {
    type Target = [Bar];

    fn deref(&self) -> &[Bar] {
        self.as_slice()
    }
}

impl From<Vec<Bar>> for BarSeries {
    fn from(bars: Vec<Bar>) -> Self {
        Self::new(bars)
    }
}

impl PartialEq for BarSeries {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for BarSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarSeries")
            .field("len", &self.len())
            .field("first", &self.first_date())
            .field("last", &self.last_date())
            .finish()
    }
}

impl Serialize for BarSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BarSeries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Bar>::deserialize(deserializer).map(BarSeries::new)
    }
}
