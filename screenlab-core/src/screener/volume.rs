//! Liquidity screeners: average dollar volume and volume spikes.

use crate::domain::Bar;
use crate::indicators::{dollar_volumes, mean, volumes};

use super::{metadata, Metadata, Screener};

/// Average close × volume over the last `lookback` bars at or above a floor.
#[derive(Debug, Clone)]
pub struct DollarVolume {
    min_dollar_volume: f64,
    lookback: usize,
}

impl DollarVolume {
    pub fn new(min_dollar_volume: f64, lookback: usize) -> Self {
        Self {
            min_dollar_volume,
            lookback: lookback.max(1),
        }
    }
}

impl Screener for DollarVolume {
    fn id(&self) -> &str {
        "dollar_volume"
    }

    fn min_bars_required(&self) -> usize {
        self.lookback
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let window = bars.get(bars.len().checked_sub(self.lookback)?..)?;
        let avg = mean(&dollar_volumes(window))?;
        let last = window.last()?;
        (avg >= self.min_dollar_volume).then(|| {
            metadata([
                ("dollar_volume", avg),
                ("price", last.close),
                ("volume", last.volume),
            ])
        })
    }
}

/// Latest volume at least `multiplier` × the mean of the `lookback` bars
/// before it.
#[derive(Debug, Clone)]
pub struct VolumeSpike {
    multiplier: f64,
    lookback: usize,
}

impl VolumeSpike {
    pub fn new(multiplier: f64, lookback: usize) -> Self {
        Self {
            multiplier,
            lookback: lookback.max(1),
        }
    }
}

impl Screener for VolumeSpike {
    fn id(&self) -> &str {
        "volume_spike"
    }

    fn min_bars_required(&self) -> usize {
        self.lookback + 1
    }

    fn evaluate(&self, _symbol: &str, bars: &[Bar]) -> Option<Metadata> {
        let (last, history) = bars.split_last()?;
        let prior = history.get(history.len().checked_sub(self.lookback)?..)?;
        let avg = mean(&volumes(prior))?;
        if avg <= 0.0 {
            return None;
        }
        let ratio = last.volume / avg;
        (ratio >= self.multiplier).then(|| {
            metadata([
                ("volume", last.volume),
                ("avg_volume", avg),
                ("volume_ratio", ratio),
            ])
        })
    }
}
