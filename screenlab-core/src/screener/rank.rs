//! Set-level ranking screener.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::domain::{Bar, BarCache, Symbol};
use crate::indicators::{dollar_volumes, mean};

use super::{metadata, Metadata, ScreenHit, Screener};

/// Ranking metric for [`TopN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopNMetric {
    /// Average close × volume over the lookback.
    DollarVolume,
    /// Percent change of close over the lookback.
    Momentum,
}

impl TopNMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dollar_volume" => Some(TopNMetric::DollarVolume),
            "momentum" => Some(TopNMetric::Momentum),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            TopNMetric::DollarVolume => "dollar_volume",
            TopNMetric::Momentum => "momentum",
        }
    }
}

/// Keeps the `count` candidates with the largest metric.
///
/// Survivors are returned in candidate order with their `rank` (1 = best)
/// in the metadata. Ties keep the earlier candidate.
#[derive(Debug, Clone)]
pub struct TopN {
    count: usize,
    metric: TopNMetric,
    lookback: usize,
}

impl TopN {
    pub fn new(count: usize, metric: TopNMetric, lookback: usize) -> Self {
        Self {
            count,
            metric,
            lookback: lookback.max(1),
        }
    }

    fn measure(&self, bars: &[Bar]) -> Option<f64> {
        let value = match self.metric {
            TopNMetric::DollarVolume => {
                let window = bars.get(bars.len().checked_sub(self.lookback)?..)?;
                mean(&dollar_volumes(window))?
            }
            TopNMetric::Momentum => {
                let last = bars.last()?.close;
                let base = bars.get(bars.len().checked_sub(self.lookback + 1)?)?.close;
                if base <= 0.0 {
                    return None;
                }
                (last / base - 1.0) * 100.0
            }
        };
        value.is_finite().then_some(value)
    }
}

impl Screener for TopN {
    fn id(&self) -> &str {
        "top_n"
    }

    fn min_bars_required(&self) -> usize {
        match self.metric {
            TopNMetric::DollarVolume => self.lookback,
            TopNMetric::Momentum => self.lookback + 1,
        }
    }

    /// Reports the metric without ranking; ranking needs the whole set.
    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        self.measure(bars)
            .map(|value| metadata([(self.metric.key(), value)]))
    }

    fn execute(&self, candidates: &[Symbol], cache: &BarCache) -> Vec<ScreenHit> {
        let min_bars = self.min_bars_required();
        let measured: Vec<(usize, f64)> = candidates
            .par_iter()
            .enumerate()
            .filter_map(|(idx, symbol)| {
                let bars = cache.get(symbol)?;
                if bars.len() < min_bars {
                    return None;
                }
                self.measure(bars).map(|v| (idx, v))
            })
            .collect();

        let mut ranked = measured;
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        ranked.truncate(self.count);

        let mut kept: Vec<(usize, f64, usize)> = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (idx, value))| (idx, value, rank + 1))
            .collect();
        kept.sort_by_key(|(idx, _, _)| *idx);

        kept.into_iter()
            .map(|(idx, value, rank)| ScreenHit {
                symbol: candidates[idx].clone(),
                metadata: metadata([(self.metric.key(), value), ("rank", rank as f64)]),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::testutil::*;

    #[test]
    fn keeps_top_by_dollar_volume_in_candidate_order() {
        let cache = cache_of(vec![
            ("A", flat(10.0, 100.0, 5)),
            ("B", flat(10.0, 300.0, 5)),
            ("C", flat(10.0, 200.0, 5)),
            ("D", flat(10.0, 50.0, 5)),
        ]);
        let hits = TopN::new(2, TopNMetric::DollarVolume, 5).execute(&symbols(&["A", "B", "C", "D"]), &cache);
        let names: Vec<_> = hits.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(hits[0].metadata["rank"], 1.0);
        assert_eq!(hits[1].metadata["rank"], 2.0);
    }

    #[test]
    fn momentum_ranking() {
        let up = bars_with_volume(&[100.0, 110.0, 120.0], &[1.0; 3]);
        let down = bars_with_volume(&[100.0, 95.0, 90.0], &[1.0; 3]);
        let cache = cache_of(vec![("UP", up), ("DOWN", down)]);
        let hits = TopN::new(1, TopNMetric::Momentum, 2).execute(&symbols(&["DOWN", "UP"]), &cache);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "UP");
        assert!((hits[0].metadata["momentum"] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn ties_prefer_earlier_candidate() {
        let cache = cache_of(vec![("X", flat(10.0, 100.0, 3)), ("Y", flat(10.0, 100.0, 3))]);
        let hits = TopN::new(1, TopNMetric::DollarVolume, 3).execute(&symbols(&["Y", "X"]), &cache);
        assert_eq!(hits[0].symbol, "Y");
    }

    #[test]
    fn count_larger_than_candidates_keeps_all() {
        let cache = cache_of(vec![("A", flat(1.0, 1.0, 3))]);
        let hits = TopN::new(25, TopNMetric::DollarVolume, 3).execute(&symbols(&["A", "MISSING"]), &cache);
        assert_eq!(hits.len(), 1);
    }
}
