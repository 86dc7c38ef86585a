//! Screener models — named, persisted, ordered pipelines of screeners.
//!
//! A model is compiled against a [`ScreenerRegistry`] once, then executed any
//! number of times. Execution is an ordered reduction: step *k* sees only the
//! survivors of step *k − 1*, so the surviving set can only shrink.

pub mod manager;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BarCache, ModelId, Symbol};
use crate::error::ConfigError;
use crate::screener::{Metadata, Screener, ScreenerConfig, ScreenerRegistry};

pub use manager::{ModelError, ModelManager};

/// A symbol that survived a whole model, with metadata from every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenedSymbol {
    pub symbol: Symbol,
    /// Index of the last step that admitted the symbol.
    pub step_index: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Bar interval a model is designed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[default]
    Daily,
}

/// Persisted model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerModel {
    pub id: ModelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<ScreenerConfig>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub timeframe: Timeframe,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl ScreenerModel {
    pub fn new(name: impl Into<String>, steps: Vec<ScreenerConfig>) -> Self {
        let now = Utc::now();
        Self {
            id: ModelId::new(),
            name: name.into(),
            description: String::new(),
            steps,
            enabled: true,
            timeframe: Timeframe::Daily,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the document without keeping the compiled form.
    pub fn validate(&self, registry: &ScreenerRegistry) -> Result<(), ConfigError> {
        self.compile(registry).map(|_| ())
    }

    /// Build every step. Fails on an empty name, no steps, or any step the
    /// registry rejects.
    pub fn compile(&self, registry: &ScreenerRegistry) -> Result<CompiledModel, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.steps.is_empty() {
            return Err(ConfigError::EmptyModel {
                model: self.name.clone(),
            });
        }
        let steps = self
            .steps
            .iter()
            .map(|config| {
                registry.create(config).map(|screener| CompiledStep {
                    name: config.display_name().to_string(),
                    screener,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledModel {
            id: self.id,
            name: self.name.clone(),
            steps,
        })
    }
}

struct CompiledStep {
    name: String,
    screener: Box<dyn Screener>,
}

/// A model with every step constructed, ready to execute.
pub struct CompiledModel {
    id: ModelId,
    name: String,
    steps: Vec<CompiledStep>,
}

/// Output of one model execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelRun {
    /// Survivors of every step, in universe order.
    pub symbols: Vec<ScreenedSymbol>,
    /// Survivor count after each step.
    pub step_counts: Vec<usize>,
}

impl ModelRun {
    pub fn symbol_names(&self) -> Vec<&str> {
        self.symbols.iter().map(|s| s.symbol.as_str()).collect()
    }
}

impl CompiledModel {
    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// History the model needs: the largest step requirement.
    pub fn min_bars_required(&self) -> usize {
        self.steps
            .iter()
            .map(|s| s.screener.min_bars_required())
            .max()
            .unwrap_or(0)
    }

    /// Run the pipeline over `universe` against `cache`.
    pub fn execute(&self, universe: &[Symbol], cache: &BarCache) -> ModelRun {
        let mut survivors: Vec<Symbol> = universe.to_vec();
        let mut metadata: BTreeMap<Symbol, Metadata> = BTreeMap::new();
        let mut step_counts = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if survivors.is_empty() {
                step_counts.push(0);
                continue;
            }
            let allowed: HashSet<&str> = survivors.iter().map(String::as_str).collect();
            let mut seen = HashSet::new();
            let hits: Vec<_> = step
                .screener
                .execute(&survivors, cache)
                .into_iter()
                .filter(|hit| allowed.contains(hit.symbol.as_str()) && seen.insert(hit.symbol.clone()))
                .collect();

            let mut next = Vec::with_capacity(hits.len());
            for hit in hits {
                metadata.entry(hit.symbol.clone()).or_default().extend(hit.metadata);
                next.push(hit.symbol);
            }
            tracing::trace!(model = %self.name, step = %step.name, survivors = next.len(), "step complete");
            survivors = next;
            step_counts.push(survivors.len());
        }

        let last_step = self.steps.len().saturating_sub(1);
        let symbols = survivors
            .into_iter()
            .map(|symbol| ScreenedSymbol {
                metadata: metadata.remove(&symbol).unwrap_or_default(),
                symbol,
                step_index: last_step,
            })
            .collect();
        ModelRun {
            symbols,
            step_counts,
        }
    }
}

impl std::fmt::Debug for CompiledModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("steps", &self.step_names().collect::<Vec<_>>())
            .finish()
    }
}
