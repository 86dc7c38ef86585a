//! Forward-return statistics for screened symbols.
//!
//! Pure functions: a result date, the symbols picked that day, and the master
//! cache in; win rate and average gain/loss out. Only bars strictly after the
//! result date are used, which is the point: these numbers are computed after
//! the simulation, never inside it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use screenlab_core::domain::{Bar, BarCache};

/// How the symbols picked on one date performed over the next `holding_bars`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub holding_bars: usize,
    /// Symbols with enough forward data to be scored.
    pub evaluated: usize,
    pub wins: usize,
    pub win_rate: f64,
    /// Mean return of winners, as a fraction.
    pub avg_gain: f64,
    /// Mean return of losers, as a (negative) fraction.
    pub avg_loss: f64,
    pub avg_return: f64,
    /// Benchmark return over the same window, when it has the bars.
    pub benchmark_return: Option<f64>,
}

impl PerformanceStats {
    /// Aggregate `returns` into stats.
    pub fn from_returns(
        returns: &[f64],
        holding_bars: usize,
        benchmark_return: Option<f64>,
    ) -> Self {
        let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        Self {
            holding_bars,
            evaluated: returns.len(),
            wins: gains.len(),
            win_rate: ratio(gains.len(), returns.len()),
            avg_gain: average(&gains),
            avg_loss: average(&losses),
            avg_return: average(returns),
            benchmark_return,
        }
    }

    /// Return beyond the benchmark, when both are known.
    pub fn excess_return(&self) -> Option<f64> {
        if self.evaluated == 0 {
            return None;
        }
        self.benchmark_return.map(|b| self.avg_return - b)
    }
}

/// Stats for `symbols` picked on `date`, measured against `master`.
pub fn evaluate_picks<'a>(
    symbols: impl IntoIterator<Item = &'a str>,
    date: NaiveDate,
    master: &BarCache,
    holding_bars: usize,
    benchmark: Option<&[Bar]>,
) -> PerformanceStats {
    let returns: Vec<f64> = symbols
        .into_iter()
        .filter_map(|s| master.get(s))
        .filter_map(|series| forward_return(series, date, holding_bars))
        .collect();
    let benchmark_return = benchmark.and_then(|bars| forward_return(bars, date, holding_bars));
    PerformanceStats::from_returns(&returns, holding_bars, benchmark_return)
}

// ─── Individual functions ────────────────────────────────────────────

/// Close-to-close return from the last bar on or before `date` to the bar
/// `holding_bars` later. `None` without enough forward bars or with a
/// non-positive entry close.
pub fn forward_return(bars: &[Bar], date: NaiveDate, holding_bars: usize) -> Option<f64> {
    if holding_bars == 0 {
        return None;
    }
    let entry_idx = bars.partition_point(|b| b.date <= date).checked_sub(1)?;
    let entry = bars[entry_idx].close;
    let exit = bars.get(entry_idx + holding_bars)?.close;
    if entry <= 0.0 || !entry.is_finite() || !exit.is_finite() {
        return None;
    }
    Some(exit / entry - 1.0)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlab_core::domain::BarSeries;

    const EPS: f64 = 1e-12;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn bars(closes: &[(u32, f64)]) -> Vec<Bar> {
        closes
            .iter()
            .map(|&(day, c)| Bar::new(d(day), c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn forward_return_uses_bars_after_entry() {
        let b = bars(&[(1, 100.0), (2, 110.0), (3, 121.0), (4, 90.0)]);
        assert!((forward_return(&b, d(1), 1).unwrap() - 0.10).abs() < EPS);
        assert!((forward_return(&b, d(1), 2).unwrap() - 0.21).abs() < EPS);
        assert!((forward_return(&b, d(2), 2).unwrap() - (90.0 / 110.0 - 1.0)).abs() < EPS);
    }

    #[test]
    fn forward_return_enters_on_last_bar_before_gap() {
        // No bar on the 3rd: entry is the 2nd.
        let b = bars(&[(1, 100.0), (2, 100.0), (4, 105.0)]);
        assert!((forward_return(&b, d(3), 1).unwrap() - 0.05).abs() < EPS);
    }

    #[test]
    fn forward_return_needs_forward_data() {
        let b = bars(&[(1, 100.0), (2, 110.0)]);
        assert_eq!(forward_return(&b, d(2), 1), None);
        assert_eq!(forward_return(&b, d(1), 0), None);
        // Date before the first bar: no entry.
        assert_eq!(forward_return(&b, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), 1), None);
    }

    #[test]
    fn stats_aggregate_wins_and_losses() {
        let s = PerformanceStats::from_returns(&[0.10, -0.05, 0.20, 0.0], 5, Some(0.01));
        assert_eq!(s.evaluated, 4);
        assert_eq!(s.wins, 2);
        assert!((s.win_rate - 0.5).abs() < EPS);
        assert!((s.avg_gain - 0.15).abs() < EPS);
        assert!((s.avg_loss + 0.05).abs() < EPS);
        assert!((s.avg_return - 0.0625).abs() < EPS);
        assert!((s.excess_return().unwrap() - 0.0525).abs() < EPS);
    }

    #[test]
    fn empty_picks_have_zero_evaluated() {
        let s = PerformanceStats::from_returns(&[], 5, None);
        assert_eq!(s.evaluated, 0);
        assert_eq!(s.win_rate, 0.0);
        assert_eq!(s.excess_return(), None);
    }

    #[test]
    fn evaluate_picks_skips_unknown_and_short_symbols() {
        let mut master = BarCache::new();
        master.insert("UP".into(), BarSeries::new(bars(&[(1, 10.0), (2, 12.0)])));
        master.insert("SHORT".into(), BarSeries::new(bars(&[(1, 10.0)])));
        let bench = bars(&[(1, 100.0), (2, 101.0)]);

        let s = evaluate_picks(["UP", "SHORT", "GONE"], d(1), &master, 1, Some(&bench));
        assert_eq!(s.evaluated, 1);
        assert!((s.avg_return - 0.2).abs() < EPS);
        assert!((s.benchmark_return.unwrap() - 0.01).abs() < EPS);
    }
}
