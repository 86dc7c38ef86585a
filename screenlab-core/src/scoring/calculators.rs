//! Built-in indicator calculators. Every score lies in −100..100.

use crate::domain::{Bar, ParamSpec, ResolvedParams};
use crate::error::ConfigError;
use crate::indicators::{atr, closes, correlation, latest, mean, roc, rsi, sma, volumes};

use super::{IndicatorCalculator, IndicatorKind, ScoreError};

fn require(kind: IndicatorKind, bars: &[Bar], required: usize) -> Result<(), ScoreError> {
    if bars.len() < required {
        return Err(ScoreError::InsufficientData {
            indicator: kind,
            required,
            available: bars.len(),
        });
    }
    Ok(())
}

fn finite(kind: IndicatorKind, value: Option<f64>, what: &str) -> Result<f64, ScoreError> {
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScoreError::InvalidComputation {
            indicator: kind,
            reason: format!("{what} is not a finite number"),
        })
}

fn sign(a: f64, b: f64) -> f64 {
    if a > b {
        1.0
    } else if a < b {
        -1.0
    } else {
        0.0
    }
}

// ─── RSI ─────────────────────────────────────────────────────────────

/// (RSI − 50) × 2.
pub struct RsiScore;

const RSI_PARAMS: &[ParamSpec] = &[ParamSpec::integer("period", 14, 2, 500)];

impl IndicatorCalculator for RsiScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn name(&self) -> &str {
        "RSI"
    }

    fn params(&self) -> &'static [ParamSpec] {
        RSI_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        params.integer("period") + 1
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        require(self.kind(), bars, self.min_bars_required(params))?;
        let value = finite(
            self.kind(),
            latest(&rsi(&closes(bars), params.integer("period"))),
            "RSI",
        )?;
        Ok(((value - 50.0) * 2.0).clamp(-100.0, 100.0))
    }
}

// ─── MA trend ────────────────────────────────────────────────────────

/// ±25 each for close vs fast, close vs slow, fast vs slow, and the fast
/// average's slope over `slope_period` bars.
pub struct MaTrendScore;

const MA_TREND_PARAMS: &[ParamSpec] = &[
    ParamSpec::integer("fast", 20, 1, 500),
    ParamSpec::integer("slow", 50, 2, 1000),
    ParamSpec::integer("slope_period", 5, 1, 100),
];

impl IndicatorCalculator for MaTrendScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::MaTrend
    }

    fn name(&self) -> &str {
        "Moving Average Trend"
    }

    fn params(&self) -> &'static [ParamSpec] {
        MA_TREND_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        let fast = params.integer("fast");
        let slow = params.integer("slow");
        slow.max(fast + params.integer("slope_period"))
    }

    fn validate(&self, params: &ResolvedParams) -> Result<(), ConfigError> {
        let fast = params.integer("fast");
        let slow = params.integer("slow");
        if fast >= slow {
            return Err(ConfigError::Invalid {
                component: self.kind().to_string(),
                reason: format!("fast ({fast}) must be shorter than slow ({slow})"),
            });
        }
        Ok(())
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        require(self.kind(), bars, self.min_bars_required(params))?;
        let kind = self.kind();
        let close_series = closes(bars);
        let fast_series = sma(&close_series, params.integer("fast"));
        let slow_series = sma(&close_series, params.integer("slow"));

        let close = finite(kind, close_series.last().copied(), "close")?;
        let fast = finite(kind, fast_series.last().copied(), "fast average")?;
        let slow = finite(kind, slow_series.last().copied(), "slow average")?;
        let slope_back = fast_series.len() - 1 - params.integer("slope_period");
        let fast_before = finite(kind, fast_series.get(slope_back).copied(), "prior fast average")?;

        let score = 25.0
            * (sign(close, fast) + sign(close, slow) + sign(fast, slow) + sign(fast, fast_before));
        Ok(score)
    }
}

// ─── Momentum ────────────────────────────────────────────────────────

/// Rate of change over `period` in percent, times `scale`.
pub struct MomentumScore;

const MOMENTUM_PARAMS: &[ParamSpec] = &[
    ParamSpec::integer("period", 20, 1, 500),
    ParamSpec::number("scale", 5.0, 0.0, 1000.0),
];

impl IndicatorCalculator for MomentumScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Momentum
    }

    fn name(&self) -> &str {
        "Momentum"
    }

    fn params(&self) -> &'static [ParamSpec] {
        MOMENTUM_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        params.integer("period") + 1
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        require(self.kind(), bars, self.min_bars_required(params))?;
        let change = finite(
            self.kind(),
            latest(&roc(&closes(bars), params.integer("period"))),
            "rate of change",
        )?;
        Ok((change * params.number("scale")).clamp(-100.0, 100.0))
    }
}

// ─── Volume trend ────────────────────────────────────────────────────

/// Short/long average volume expansion, signed by price direction over the
/// short window: (short_avg / long_avg − 1) × 100 × sign(Δclose).
pub struct VolumeTrendScore;

const VOLUME_TREND_PARAMS: &[ParamSpec] = &[
    ParamSpec::integer("short_period", 5, 1, 200),
    ParamSpec::integer("long_period", 20, 2, 1000),
];

impl IndicatorCalculator for VolumeTrendScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::VolumeTrend
    }

    fn name(&self) -> &str {
        "Volume Trend"
    }

    fn params(&self) -> &'static [ParamSpec] {
        VOLUME_TREND_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        params.integer("long_period").max(params.integer("short_period") + 1)
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        let kind = self.kind();
        require(kind, bars, self.min_bars_required(params))?;
        let short = params.integer("short_period");
        let long = params.integer("long_period");
        let vols = volumes(bars);

        let short_avg = finite(kind, mean(&vols[vols.len() - short..]), "short volume average")?;
        let long_avg = finite(kind, mean(&vols[vols.len() - long..]), "long volume average")?;
        if long_avg <= 0.0 {
            return Err(ScoreError::InvalidComputation {
                indicator: kind,
                reason: "long volume average is zero".into(),
            });
        }

        let last_close = finite(kind, Some(bars[bars.len() - 1].close), "close")?;
        let base_close = finite(kind, Some(bars[bars.len() - 1 - short].close), "base close")?;
        let direction = sign(last_close, base_close);
        let expansion = (short_avg / long_avg - 1.0) * 100.0;
        Ok((direction * expansion).clamp(-100.0, 100.0))
    }
}

// ─── Volatility ──────────────────────────────────────────────────────

/// 100 × (1 − ATR% / target_pct). Calm names score high.
pub struct VolatilityScore;

const VOLATILITY_PARAMS: &[ParamSpec] = &[
    ParamSpec::integer("period", 14, 1, 500),
    ParamSpec::number("target_pct", 5.0, 0.01, 100.0),
];

impl IndicatorCalculator for VolatilityScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Volatility
    }

    fn name(&self) -> &str {
        "Volatility"
    }

    fn params(&self) -> &'static [ParamSpec] {
        VOLATILITY_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        params.integer("period") + 1
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        let kind = self.kind();
        require(kind, bars, self.min_bars_required(params))?;
        let close = finite(kind, Some(bars[bars.len() - 1].close), "close")?;
        if close <= 0.0 {
            return Err(ScoreError::InvalidComputation {
                indicator: kind,
                reason: format!("non-positive close {close}"),
            });
        }
        let range = finite(kind, latest(&atr(bars, params.integer("period"))), "ATR")?;
        let atr_pct = range / close * 100.0;
        Ok((100.0 * (1.0 - atr_pct / params.number("target_pct"))).clamp(-100.0, 100.0))
    }
}

// ─── Trend consistency ───────────────────────────────────────────────

/// 100 × Pearson correlation of close against time over `period` bars.
/// A perfectly flat window scores 0.
pub struct TrendConsistencyScore;

const TREND_CONSISTENCY_PARAMS: &[ParamSpec] = &[ParamSpec::integer("period", 20, 2, 1000)];

impl IndicatorCalculator for TrendConsistencyScore {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::TrendConsistency
    }

    fn name(&self) -> &str {
        "Trend Consistency"
    }

    fn params(&self) -> &'static [ParamSpec] {
        TREND_CONSISTENCY_PARAMS
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize {
        params.integer("period")
    }

    fn calculate_score(
        &self,
        _symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError> {
        let kind = self.kind();
        let period = params.integer("period");
        require(kind, bars, period)?;
        let window = closes(&bars[bars.len() - period..]);
        if window.iter().all(|c| *c == window[0]) {
            return Ok(0.0);
        }
        let time: Vec<f64> = (0..period).map(|i| i as f64).collect();
        let r = finite(kind, latest(&correlation(&window, &time, period)), "correlation")?;
        Ok((100.0 * r).clamp(-100.0, 100.0))
    }
}
