use std::cmp::Ordering;
use std::sync::Arc;

use rayon::prelude::*;

use crate::domain::{Bar, BarCache, ResolvedParams};

use super::{
    CalculatorRegistry, IndicatorCalculator, IndicatorKind, IndicatorScore, ScoreError,
    ScoreResult, ScoringStrategy,
};

/// Applies scoring strategies to symbol maps.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    registry: Arc<CalculatorRegistry>,
}

struct PreparedIndicator<'a> {
    kind: IndicatorKind,
    calculator: &'a dyn IndicatorCalculator,
    params: ResolvedParams,
    weight: f64,
}

impl ScoreCalculator {
    pub fn new(registry: Arc<CalculatorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CalculatorRegistry {
        &self.registry
    }

    /// Score every symbol in `symbol_data` under `strategy`.
    ///
    /// Fails only when the strategy itself is invalid. A symbol whose
    /// indicators cannot all be computed gets an error-carrying result.
    /// Results are sorted by total score descending, errors last, ties by
    /// symbol.
    pub fn calculate_scores_for_symbols(
        &self,
        symbol_data: &BarCache,
        strategy: &ScoringStrategy,
    ) -> Result<Vec<ScoreResult>, ScoreError> {
        strategy.validate(&self.registry)?;
        let prepared = self.prepare(strategy)?;
        let total_weight: f64 = prepared.iter().map(|p| p.weight).sum();

        let mut results: Vec<ScoreResult> = symbol_data
            .par_iter()
            .map(|(symbol, bars)| score_one(symbol, bars, &prepared, total_weight))
            .collect();
        results.sort_by(rank_order);

        let failed = results.iter().filter(|r| r.is_error()).count();
        tracing::info!(
            strategy = %strategy.name,
            symbols = results.len(),
            failed,
            "scoring complete"
        );
        Ok(results)
    }

    /// Score a single symbol.
    pub fn calculate_score(
        &self,
        symbol: &str,
        bars: &[Bar],
        strategy: &ScoringStrategy,
    ) -> Result<ScoreResult, ScoreError> {
        strategy.validate(&self.registry)?;
        let prepared = self.prepare(strategy)?;
        let total_weight: f64 = prepared.iter().map(|p| p.weight).sum();
        Ok(score_one(symbol, bars, &prepared, total_weight))
    }

    fn prepare<'a>(
        &'a self,
        strategy: &ScoringStrategy,
    ) -> Result<Vec<PreparedIndicator<'a>>, ScoreError> {
        strategy
            .enabled_indicators()
            .map(|config| -> Result<PreparedIndicator<'a>, ScoreError> {
                let (calculator, params) = self.registry.resolve(config)?;
                Ok(PreparedIndicator {
                    kind: config.kind,
                    calculator,
                    params,
                    weight: config.weight,
                })
            })
            .collect()
    }
}

fn score_one(
    symbol: &str,
    bars: &[Bar],
    prepared: &[PreparedIndicator<'_>],
    total_weight: f64,
) -> ScoreResult {
    let mut breakdown = Vec::with_capacity(prepared.len());
    let mut errors = Vec::new();

    for p in prepared {
        let required = p.calculator.min_bars_required(&p.params);
        let outcome = if bars.len() < required {
            Err(ScoreError::InsufficientData {
                indicator: p.kind,
                required,
                available: bars.len(),
            })
        } else {
            p.calculator.calculate_score(symbol, bars, &p.params)
        };

        match outcome {
            Ok(score) => breakdown.push(IndicatorScore {
                kind: p.kind,
                score,
                weight: p.weight,
                contribution: p.weight * score / total_weight,
            }),
            Err(e) => errors.push(e.to_string()),
        }
    }

    if errors.is_empty() {
        let total = breakdown.iter().map(|b| b.contribution).sum();
        ScoreResult {
            symbol: symbol.to_string(),
            total_score: Some(total),
            breakdown,
            error: None,
        }
    } else {
        tracing::debug!(symbol, errors = ?errors, "symbol not scored");
        ScoreResult {
            symbol: symbol.to_string(),
            total_score: None,
            breakdown,
            error: Some(errors.join("; ")),
        }
    }
}

fn rank_order(a: &ScoreResult, b: &ScoreResult) -> Ordering {
    match (a.total_score, b.total_score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.symbol.cmp(&b.symbol))
}
