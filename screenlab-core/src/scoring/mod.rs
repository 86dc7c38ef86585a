//! Scoring engine — weighted, bounded indicator scores per symbol.
//!
//! Each [`IndicatorCalculator`] maps a symbol's bars to a score in a fixed
//! range (−100..100 for every built-in). A [`ScoringStrategy`] picks the
//! calculators, their parameters and weights; [`ScoreCalculator`] applies a
//! strategy across a symbol map in parallel and ranks the results.

pub mod calculators;
pub mod engine;
pub mod registry;
pub mod strategy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{default_params, Bar, ParamMap, ParamSpec, ResolvedParams, StrategyId, Symbol};
use crate::error::ConfigError;

pub use engine::ScoreCalculator;
pub use registry::CalculatorRegistry;
pub use strategy::{builtin_strategies, StrategyError, StrategyManager};

/// Built-in indicator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    MaTrend,
    Momentum,
    VolumeTrend,
    Volatility,
    TrendConsistency,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 6] = [
        IndicatorKind::Rsi,
        IndicatorKind::MaTrend,
        IndicatorKind::Momentum,
        IndicatorKind::VolumeTrend,
        IndicatorKind::Volatility,
        IndicatorKind::TrendConsistency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::MaTrend => "ma_trend",
            IndicatorKind::Momentum => "momentum",
            IndicatorKind::VolumeTrend => "volume_trend",
            IndicatorKind::Volatility => "volatility",
            IndicatorKind::TrendConsistency => "trend_consistency",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownIndicator(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("{indicator}: needs {required} bars, have {available}")]
    InsufficientData {
        indicator: IndicatorKind,
        required: usize,
        available: usize,
    },

    #[error("{indicator}: {reason}")]
    InvalidComputation {
        indicator: IndicatorKind,
        reason: String,
    },

    #[error("no calculator registered for indicator '{0}'")]
    UnknownIndicator(IndicatorKind),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Trait for indicator calculators.
pub trait IndicatorCalculator: Send + Sync {
    fn kind(&self) -> IndicatorKind;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Inclusive bounds of every score this calculator produces.
    fn score_range(&self) -> (f64, f64) {
        (-100.0, 100.0)
    }

    /// Recognised parameter keys with defaults and ranges.
    fn params(&self) -> &'static [ParamSpec];

    fn default_parameters(&self) -> ParamMap {
        default_params(self.params())
    }

    fn min_bars_required(&self, params: &ResolvedParams) -> usize;

    /// Checks that span more than one parameter. Each key's own range is
    /// already enforced when the parameters resolve.
    fn validate(&self, _params: &ResolvedParams) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Score `bars` (oldest first). Callers check `min_bars_required` first;
    /// implementations still return `InsufficientData` rather than a made-up
    /// value when history runs short.
    fn calculate_score(
        &self,
        symbol: &str,
        bars: &[Bar],
        params: &ResolvedParams,
    ) -> Result<f64, ScoreError>;
}

/// One indicator inside a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub kind: IndicatorKind,
    pub weight: f64,
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl IndicatorConfig {
    pub fn new(kind: IndicatorKind, weight: f64) -> Self {
        Self {
            kind,
            weight,
            params: ParamMap::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<crate::domain::ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Persisted scoring strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringStrategy {
    pub id: StrategyId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub indicators: Vec<IndicatorConfig>,
    #[serde(default)]
    pub builtin: bool,
}

impl ScoringStrategy {
    pub fn new(name: impl Into<String>, indicators: Vec<IndicatorConfig>) -> Self {
        Self {
            id: StrategyId::new(),
            name: name.into(),
            description: String::new(),
            indicators,
            builtin: false,
        }
    }

    pub fn enabled_indicators(&self) -> impl Iterator<Item = &IndicatorConfig> {
        self.indicators.iter().filter(|i| i.enabled)
    }

    pub fn total_weight(&self) -> f64 {
        self.enabled_indicators().map(|i| i.weight).sum()
    }

    /// Name, indicator list, weights and parameters.
    pub fn validate(&self, registry: &CalculatorRegistry) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.indicators.is_empty() {
            return Err(ConfigError::NoIndicators {
                strategy: self.name.clone(),
            });
        }
        for indicator in &self.indicators {
            if !indicator.weight.is_finite() || indicator.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    strategy: self.name.clone(),
                    indicator: indicator.kind.to_string(),
                    weight: indicator.weight,
                });
            }
            registry.resolve(indicator)?;
        }
        if self.total_weight() <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight {
                strategy: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// One indicator's contribution to a symbol's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorScore {
    pub kind: IndicatorKind,
    pub score: f64,
    pub weight: f64,
    /// `weight × score / total weight`; contributions sum to the total.
    pub contribution: f64,
}

/// Score of one symbol under one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub symbol: Symbol,
    /// `None` when any enabled indicator failed.
    pub total_score: Option<f64>,
    pub breakdown: Vec<IndicatorScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreResult {
    pub fn is_error(&self) -> bool {
        self.total_score.is_none()
    }
}
