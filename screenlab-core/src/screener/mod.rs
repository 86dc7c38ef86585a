//! Screeners — pass/fail filters over a symbol list.
//!
//! A screener either judges each symbol on its own bars (the provided
//! [`Screener::execute`] fans those evaluations out across rayon) or looks
//! at the whole candidate set at once, like [`TopN`], and overrides
//! `execute`. Either way the output is a subset of the input, in input order.
//!
//! # Architecture invariant
//! Screeners see only the cache they are handed. Point-in-time correctness
//! is the caller's job: slice first, then screen.

pub mod config;
pub mod price;
pub mod rank;
pub mod registry;
pub mod trend;
pub mod volume;

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{Bar, BarCache, Symbol};

pub use config::ScreenerConfig;
pub use price::{AtrPercent, PriceRange, RsiRange};
pub use rank::{TopN, TopNMetric};
pub use registry::{ScreenerDescriptor, ScreenerRegistry};
pub use trend::{MaAlignment, MaDirection, MaType, NearHigh};
pub use volume::{DollarVolume, VolumeSpike};

/// Named numeric facts a screener reports about a symbol that passed.
pub type Metadata = BTreeMap<String, f64>;

/// A symbol admitted by one screener.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenHit {
    pub symbol: Symbol,
    pub metadata: Metadata,
}

/// Trait for screeners.
pub trait Screener: Send + Sync {
    /// Registry identifier, e.g. `"dollar_volume"`.
    fn id(&self) -> &str;

    /// Fewest bars a symbol needs before it can be evaluated.
    fn min_bars_required(&self) -> usize;

    /// Judge one symbol. `bars` holds at least `min_bars_required` bars,
    /// oldest first. `None` rejects the symbol.
    fn evaluate(&self, symbol: &str, bars: &[Bar]) -> Option<Metadata>;

    /// Filter `candidates` against `cache`.
    fn execute(&self, candidates: &[Symbol], cache: &BarCache) -> Vec<ScreenHit> {
        evaluate_each(self, candidates, cache, self.min_bars_required())
    }
}

/// Evaluate every candidate independently, in parallel.
///
/// Candidates missing from the cache or with fewer than `min_bars` bars are
/// skipped. Output keeps candidate order.
pub fn evaluate_each<S: Screener + ?Sized>(
    screener: &S,
    candidates: &[Symbol],
    cache: &BarCache,
    min_bars: usize,
) -> Vec<ScreenHit> {
    candidates
        .par_iter()
        .filter_map(|symbol| {
            let bars = cache.get(symbol)?;
            if bars.is_empty() || bars.len() < min_bars {
                return None;
            }
            screener
                .evaluate(symbol, bars)
                .map(|metadata| ScreenHit {
                    symbol: symbol.clone(),
                    metadata,
                })
        })
        .collect()
}

/// Wraps a screener with a configured history requirement.
///
/// The override can only raise the requirement: an override below the inner
/// screener's own minimum is ignored, so validation never under-reports.
/// Candidates with fewer bars are dropped before the inner screener runs.
pub(crate) struct MinBarsOverride {
    inner: Box<dyn Screener>,
    min_bars: usize,
}

impl MinBarsOverride {
    pub(crate) fn new(inner: Box<dyn Screener>, min_bars: usize) -> Self {
        let min_bars = min_bars.max(inner.min_bars_required());
        Self { inner, min_bars }
    }
}

impl Screener for MinBarsOverride {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn min_bars_required(&self) -> usize {
        self.min_bars
    }

    fn evaluate(&self, symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        self.inner.evaluate(symbol, bars)
    }

    fn execute(&self, candidates: &[Symbol], cache: &BarCache) -> Vec<ScreenHit> {
        let eligible: Vec<Symbol> = candidates
            .iter()
            .filter(|s| cache.get(*s).is_some_and(|bars| bars.len() >= self.min_bars))
            .cloned()
            .collect();
        self.inner.execute(&eligible, cache)
    }
}

/// Build a metadata map from literal pairs.
pub(crate) fn metadata<const N: usize>(pairs: [(&str, f64); N]) -> Metadata {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::NaiveDate;

    use crate::domain::{Bar, BarCache, BarSeries};

    /// Bars with the given closes and volumes; high/low ±1 around close.
    pub fn bars_with_volume(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| {
                Bar::new(base + chrono::Duration::days(i as i64), c, c + 1.0, c - 1.0, c, v)
            })
            .collect()
    }

    pub fn flat(close: f64, volume: f64, n: usize) -> Vec<Bar> {
        bars_with_volume(&vec![close; n], &vec![volume; n])
    }

    pub fn cache_of(entries: Vec<(&str, Vec<Bar>)>) -> BarCache {
        entries
            .into_iter()
            .map(|(s, bars)| (s.to_string(), BarSeries::new(bars)))
            .collect()
    }

    pub fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    struct CloseAbove(f64);

    impl Screener for CloseAbove {
        fn id(&self) -> &str {
            "close_above"
        }
        fn min_bars_required(&self) -> usize {
            2
        }
        fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
            let close = bars.last()?.close;
            (close > self.0).then(|| metadata([("price", close)]))
        }
    }

    #[test]
    fn execute_skips_missing_and_short_and_keeps_order() {
        let cache = cache_of(vec![
            ("C", flat(50.0, 1.0, 3)),
            ("A", flat(50.0, 1.0, 3)),
            ("SHORT", flat(50.0, 1.0, 1)),
            ("LOW", flat(5.0, 1.0, 3)),
        ]);
        let hits = CloseAbove(10.0).execute(&symbols(&["C", "MISSING", "SHORT", "LOW", "A"]), &cache);
        let names: Vec<_> = hits.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert_eq!(hits[0].metadata["price"], 50.0);
    }

    #[test]
    fn override_raises_history_requirement() {
        let cache = cache_of(vec![("A", flat(50.0, 1.0, 3)), ("B", flat(50.0, 1.0, 10))]);
        let wrapped = MinBarsOverride::new(Box::new(CloseAbove(10.0)), 5);
        assert_eq!(wrapped.min_bars_required(), 5);
        let hits = wrapped.execute(&symbols(&["A", "B"]), &cache);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "B");
    }

    #[test]
    fn override_never_lowers_history_requirement() {
        let wrapped = MinBarsOverride::new(Box::new(CloseAbove(10.0)), 1);
        assert_eq!(wrapped.min_bars_required(), 2);

        let cache = cache_of(vec![("A", flat(50.0, 1.0, 1)), ("B", flat(50.0, 1.0, 2))]);
        let hits = wrapped.execute(&symbols(&["A", "B"]), &cache);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "B");
    }
}
