//! Point-in-time views of a bar cache.
//!
//! Every slice shares bars with the master cache through [`BarSeries`]
//! views; nothing is copied and the master is never mutated.
//!
//! # Architecture invariant
//! `slice_upto(cache, d)` never contains a bar dated after `d`. The backtest
//! runner relies on this to keep simulated dates free of look-ahead.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{BarCache, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("bar cache is empty")]
    EmptyCache,

    #[error(
        "{} symbol(s) have fewer than {required} bars on or before {start}: {}",
        symbols.len(),
        preview(symbols)
    )]
    InsufficientHistory {
        start: NaiveDate,
        required: usize,
        symbols: Vec<Symbol>,
    },
}

fn preview(symbols: &[Symbol]) -> String {
    const SHOWN: usize = 5;
    let mut out = symbols.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if symbols.len() > SHOWN {
        out.push_str(&format!(", … (+{})", symbols.len() - SHOWN));
    }
    out
}

/// Per-symbol bars on or before `date`.
pub fn slice_upto(cache: &BarCache, date: NaiveDate) -> BarCache {
    cache
        .iter()
        .map(|(symbol, series)| (symbol.clone(), series.upto(date)))
        .collect()
}

/// Per-symbol bars with `from <= date <= to`.
pub fn slice_range(cache: &BarCache, from: NaiveDate, to: NaiveDate) -> BarCache {
    cache
        .iter()
        .map(|(symbol, series)| (symbol.clone(), series.between(from, to)))
        .collect()
}

/// Symbols with at least one bar on or before `date`.
pub fn symbol_count_at_date(cache: &BarCache, date: NaiveDate) -> usize {
    cache
        .values()
        .filter(|series| series.first_date().is_some_and(|d| d <= date))
        .count()
}

/// Earliest and latest bar date across the cache.
pub fn date_range(cache: &BarCache) -> Option<(NaiveDate, NaiveDate)> {
    let first = cache.values().filter_map(|s| s.first_date()).min()?;
    let last = cache.values().filter_map(|s| s.last_date()).max()?;
    Some((first, last))
}

pub fn total_bar_count(cache: &BarCache) -> usize {
    cache.values().map(|s| s.len()).sum()
}

/// History check for a run starting at `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValidation {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub required: usize,
    /// Bars on or before `start`, per symbol.
    pub bars_at_start: BTreeMap<Symbol, usize>,
    pub sufficient: Vec<Symbol>,
    pub insufficient: Vec<Symbol>,
}

impl CacheValidation {
    pub fn is_complete(&self) -> bool {
        self.insufficient.is_empty()
    }

    /// Strict policy: any insufficient symbol is an error.
    pub fn require_all(self) -> Result<Self, ValidationError> {
        if self.insufficient.is_empty() {
            Ok(self)
        } else {
            Err(ValidationError::InsufficientHistory {
                start: self.start,
                required: self.required,
                symbols: self.insufficient,
            })
        }
    }
}

/// Classify every symbol by whether it has `min_bars` bars on or before
/// `start`.
pub fn validate_cache(
    cache: &BarCache,
    start: NaiveDate,
    end: NaiveDate,
    min_bars: usize,
) -> Result<CacheValidation, ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidDateRange { start, end });
    }
    if cache.is_empty() {
        return Err(ValidationError::EmptyCache);
    }

    let mut validation = CacheValidation {
        start,
        end,
        required: min_bars,
        bars_at_start: BTreeMap::new(),
        sufficient: Vec::new(),
        insufficient: Vec::new(),
    };
    for (symbol, series) in cache {
        let available = series.upto(start).len();
        validation.bars_at_start.insert(symbol.clone(), available);
        if available >= min_bars && available > 0 {
            validation.sufficient.push(symbol.clone());
        } else {
            validation.insufficient.push(symbol.clone());
        }
    }
    Ok(validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, BarSeries};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn series(days: &[u32]) -> BarSeries {
        BarSeries::new(
            days.iter()
                .map(|&day| Bar::new(d(day), 1.0, 1.0, 1.0, day as f64, 1.0))
                .collect(),
        )
    }

    fn cache() -> BarCache {
        let mut cache = BarCache::new();
        cache.insert("A".into(), series(&[2, 3, 4, 5, 8, 9]));
        cache.insert("B".into(), series(&[5, 8, 9]));
        cache.insert("E".into(), BarSeries::empty());
        cache
    }

    #[test]
    fn slice_upto_excludes_future_and_shares_storage() {
        let master = cache();
        let sliced = slice_upto(&master, d(6));
        assert_eq!(sliced["A"].len(), 4);
        assert_eq!(sliced["A"].last_date(), Some(d(5)));
        assert_eq!(sliced["B"].len(), 1);
        assert!(sliced["E"].is_empty());
        assert!(sliced["A"].shares_storage_with(&master["A"]));
        for s in sliced.values() {
            assert!(s.iter().all(|b| b.date <= d(6)));
        }
    }

    #[test]
    fn slice_before_all_data_is_empty() {
        let sliced = slice_upto(&cache(), d(1));
        assert!(sliced.values().all(|s| s.is_empty()));
        assert_eq!(sliced.len(), 3);
    }

    #[test]
    fn slice_range_inclusive() {
        let sliced = slice_range(&cache(), d(4), d(8));
        let closes: Vec<_> = sliced["A"].iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![4.0, 5.0, 8.0]);
    }

    #[test]
    fn counts_and_range() {
        let c = cache();
        assert_eq!(symbol_count_at_date(&c, d(4)), 1);
        assert_eq!(symbol_count_at_date(&c, d(5)), 2);
        assert_eq!(date_range(&c), Some((d(2), d(9))));
        assert_eq!(total_bar_count(&c), 9);
        assert_eq!(date_range(&BarCache::new()), None);
    }

    #[test]
    fn validation_classifies_symbols() {
        let v = validate_cache(&cache(), d(5), d(9), 2).unwrap();
        assert_eq!(v.sufficient, vec!["A"]);
        assert_eq!(v.insufficient, vec!["B", "E"]);
        assert_eq!(v.bars_at_start["A"], 4);
        assert_eq!(v.bars_at_start["B"], 1);

        match v.require_all() {
            Err(ValidationError::InsufficientHistory { symbols, required, .. }) => {
                assert_eq!(symbols, vec!["B", "E"]);
                assert_eq!(required, 2);
            }
            other => panic!("expected insufficient history, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_bad_range_and_empty_cache() {
        assert_eq!(
            validate_cache(&cache(), d(9), d(5), 1),
            Err(ValidationError::InvalidDateRange { start: d(9), end: d(5) })
        );
        assert_eq!(
            validate_cache(&BarCache::new(), d(5), d(9), 1),
            Err(ValidationError::EmptyCache)
        );
    }

    #[test]
    fn insufficient_message_truncates_long_lists() {
        let symbols: Vec<Symbol> = (0..8).map(|i| format!("S{i}")).collect();
        let err = ValidationError::InsufficientHistory {
            start: d(5),
            required: 10,
            symbols,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("8 symbol(s)"));
        assert!(msg.contains("(+3)"));
    }
}
