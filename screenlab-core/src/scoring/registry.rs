use std::collections::BTreeMap;

use crate::domain::{resolve_params, ResolvedParams};
use crate::error::ConfigError;

use super::calculators::{
    MaTrendScore, MomentumScore, RsiScore, TrendConsistencyScore, VolatilityScore,
    VolumeTrendScore,
};
use super::{IndicatorCalculator, IndicatorConfig, IndicatorKind};

/// Lookup table of indicator calculators keyed by kind.
#[derive(Default)]
pub struct CalculatorRegistry {
    calculators: BTreeMap<IndicatorKind, Box<dyn IndicatorCalculator>>,
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in calculator.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RsiScore));
        registry.register(Box::new(MaTrendScore));
        registry.register(Box::new(MomentumScore));
        registry.register(Box::new(VolumeTrendScore));
        registry.register(Box::new(VolatilityScore));
        registry.register(Box::new(TrendConsistencyScore));
        registry
    }

    pub fn register(&mut self, calculator: Box<dyn IndicatorCalculator>) {
        self.calculators.insert(calculator.kind(), calculator);
    }

    pub fn get(&self, kind: IndicatorKind) -> Option<&dyn IndicatorCalculator> {
        self.calculators.get(&kind).map(|c| c.as_ref())
    }

    pub fn calculators(&self) -> impl Iterator<Item = &dyn IndicatorCalculator> {
        self.calculators.values().map(|c| c.as_ref())
    }

    /// Look up the calculator for `config` and validate its parameters.
    pub fn resolve(
        &self,
        config: &IndicatorConfig,
    ) -> Result<(&dyn IndicatorCalculator, ResolvedParams), ConfigError> {
        let calculator = self
            .get(config.kind)
            .ok_or_else(|| ConfigError::UnknownIndicator(config.kind.to_string()))?;
        let params = resolve_params(config.kind.as_str(), calculator.params(), &config.params)?;
        calculator.validate(&params)?;
        Ok((calculator, params))
    }
}

impl std::fmt::Debug for CalculatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.calculators.keys()).finish()
    }
}
