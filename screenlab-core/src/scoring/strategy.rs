//! On-disk store of scoring strategies, seeded with built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::domain::StrategyId;
use crate::error::ConfigError;
use crate::persist::{json_files, read_json, write_json, JsonFileError};

use super::{CalculatorRegistry, IndicatorConfig, IndicatorKind, ScoringStrategy};

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: malformed strategy document: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("strategy '{name}' is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("strategy not found: {0}")]
    NotFound(StrategyId),

    #[error("built-in strategy '{0}' cannot be deleted")]
    BuiltinProtected(String),
}

/// The three strategies seeded into an empty strategies directory.
pub fn builtin_strategies() -> Vec<ScoringStrategy> {
    let make = |name: &str, description: &str, indicators: Vec<IndicatorConfig>| {
        let mut s = ScoringStrategy::new(name, indicators);
        s.description = description.to_string();
        s.builtin = true;
        s
    };
    vec![
        make(
            "Balanced",
            "Equal weight across every built-in indicator",
            IndicatorKind::ALL
                .into_iter()
                .map(|kind| IndicatorConfig::new(kind, 1.0))
                .collect(),
        ),
        make(
            "Momentum",
            "Favours recent strength confirmed by volume",
            vec![
                IndicatorConfig::new(IndicatorKind::Momentum, 3.0),
                IndicatorConfig::new(IndicatorKind::Rsi, 2.0),
                IndicatorConfig::new(IndicatorKind::VolumeTrend, 1.0),
            ],
        ),
        make(
            "Trend Following",
            "Favours steady, aligned uptrends",
            vec![
                IndicatorConfig::new(IndicatorKind::MaTrend, 3.0),
                IndicatorConfig::new(IndicatorKind::TrendConsistency, 2.0),
                IndicatorConfig::new(IndicatorKind::Momentum, 1.0),
            ],
        ),
    ]
}

/// Loads, validates and persists scoring strategies.
#[derive(Debug)]
pub struct StrategyManager {
    dir: PathBuf,
    registry: Arc<CalculatorRegistry>,
    strategies: BTreeMap<StrategyId, ScoringStrategy>,
}

impl StrategyManager {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<CalculatorRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            strategies: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every document, seeding the built-ins when none exist.
    ///
    /// Aborts on the first unreadable, malformed or invalid document.
    pub fn load_all(&mut self) -> Result<usize, StrategyError> {
        let files = json_files(&self.dir).map_err(|source| StrategyError::Io {
            path: self.dir.clone(),
            source,
        })?;

        if files.is_empty() {
            tracing::info!(dir = %self.dir.display(), "seeding default scoring strategies");
            self.strategies.clear();
            for strategy in builtin_strategies() {
                self.save(strategy)?;
            }
            return Ok(self.strategies.len());
        }

        let mut loaded = BTreeMap::new();
        for path in files {
            let strategy: ScoringStrategy = read_json(&path).map_err(|e| match e {
                JsonFileError::Io(source) => StrategyError::Io {
                    path: path.clone(),
                    source,
                },
                JsonFileError::Json(source) => StrategyError::Malformed {
                    path: path.clone(),
                    source,
                },
            })?;
            self.validate(&strategy)?;
            loaded.insert(strategy.id, strategy);
        }
        tracing::info!(dir = %self.dir.display(), count = loaded.len(), "strategies loaded");
        self.strategies = loaded;
        Ok(self.strategies.len())
    }

    /// Strategies sorted by name.
    pub fn strategies(&self) -> Vec<&ScoringStrategy> {
        let mut all: Vec<_> = self.strategies.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }

    pub fn get(&self, id: StrategyId) -> Option<&ScoringStrategy> {
        self.strategies.get(&id)
    }

    /// Case-insensitive lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<&ScoringStrategy> {
        self.strategies()
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn validate(&self, strategy: &ScoringStrategy) -> Result<(), StrategyError> {
        strategy
            .validate(&self.registry)
            .map_err(|source| StrategyError::Invalid {
                name: strategy.name.clone(),
                source,
            })
    }

    pub fn save(&mut self, strategy: ScoringStrategy) -> Result<&ScoringStrategy, StrategyError> {
        self.validate(&strategy)?;
        let path = self.path_for(strategy.id);
        write_json(&path, &strategy).map_err(|source| StrategyError::Io { path, source })?;
        let id = strategy.id;
        self.strategies.insert(id, strategy);
        self.strategies.get(&id).ok_or(StrategyError::NotFound(id))
    }

    /// Remove a user strategy. Built-ins are protected.
    pub fn delete(&mut self, id: StrategyId) -> Result<ScoringStrategy, StrategyError> {
        let strategy = self.get(id).ok_or(StrategyError::NotFound(id))?;
        if strategy.builtin {
            return Err(StrategyError::BuiltinProtected(strategy.name.clone()));
        }
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StrategyError::Io { path, source }),
        }
        self.strategies.remove(&id).ok_or(StrategyError::NotFound(id))
    }

    fn path_for(&self, id: StrategyId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}
