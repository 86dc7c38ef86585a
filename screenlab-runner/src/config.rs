//! Engine configuration loaded from `screenlab.toml`.
//!
//! ```toml
//! [data]
//! root = "/data/daily"
//! exchanges = ["us"]
//! lookback_padding = 20
//!
//! [paths]
//! models_dir = "models"
//! strategies_dir = "strategies"
//! sessions_dir = "sessions"
//!
//! [backtest]
//! benchmark_symbol = "SPY.US"
//! validation_policy = "drop_insufficient"
//! holding_bars = 5
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use screenlab_core::data::BarStore;
use screenlab_core::domain::{normalize_symbol, Symbol};
use screenlab_core::ConfigError;

use crate::runner::ValidationPolicy;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data: DataSection,
    pub paths: PathsSection,
    pub backtest: BacktestSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Root of the flat-file tree (`<root>/<exchange>/**/<symbol>.txt`).
    pub root: PathBuf,
    /// Exchange directories to index; empty means all.
    pub exchanges: Vec<String>,
    /// Extra bars loaded beyond a model's requirement.
    pub lookback_padding: usize,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            exchanges: Vec::new(),
            lookback_padding: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub models_dir: PathBuf,
    pub strategies_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            strategies_dir: PathBuf::from("strategies"),
            sessions_dir: PathBuf::from("sessions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub benchmark_symbol: Option<String>,
    pub validation_policy: ValidationPolicy,
    /// Forward window for performance statistics.
    pub holding_bars: usize,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            benchmark_symbol: Some("SPY.US".into()),
            validation_policy: ValidationPolicy::Strict,
            holding_bars: 5,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(format!("engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// `from_file` when `path` exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(format!("engine config: {e}")))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backtest.holding_bars == 0 {
            return Err(ConfigError::Invalid {
                component: "backtest".into(),
                reason: "holding_bars must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The benchmark in store spelling (`spy.us` → `SPY.US`); blank is none.
    pub fn benchmark(&self) -> Option<Symbol> {
        self.backtest
            .benchmark_symbol
            .as_deref()
            .map(normalize_symbol)
            .filter(|s| !s.is_empty())
    }

    /// A bar store over the configured data root.
    pub fn bar_store(&self) -> BarStore {
        BarStore::new(&self.data.root, self.data.exchanges.clone())
    }

    /// Bars to load for a model needing `min_bars`.
    pub fn bars_to_load(&self, min_bars: usize) -> usize {
        min_bars + self.data.lookback_padding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.paths.models_dir, PathBuf::from("models"));
        assert_eq!(config.backtest.validation_policy, ValidationPolicy::Strict);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
[data]
root = "/srv/bars"
exchanges = ["us", "hk"]

[backtest]
validation_policy = "drop_insufficient"
"#,
        )
        .unwrap();
        assert_eq!(config.data.root, PathBuf::from("/srv/bars"));
        assert_eq!(config.data.exchanges, vec!["us", "hk"]);
        assert_eq!(config.data.lookback_padding, 20);
        assert_eq!(
            config.backtest.validation_policy,
            ValidationPolicy::DropInsufficient
        );
        assert_eq!(config.backtest.holding_bars, 5);
        assert_eq!(config.bars_to_load(50), 70);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("[backtest]\nvalidation_policy = \"lenient\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("[backtest]\nholding_bars = 0"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = EngineConfig::default();
        config.backtest.benchmark_symbol = Some("QQQ.US".into());
        config.data.exchanges = vec!["us".into()];
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn benchmark_is_normalized() {
        let config = EngineConfig::from_toml("[backtest]\nbenchmark_symbol = \" spy.us \"").unwrap();
        assert_eq!(config.benchmark().as_deref(), Some("SPY.US"));

        let blank = EngineConfig::from_toml("[backtest]\nbenchmark_symbol = \"  \"").unwrap();
        assert_eq!(blank.benchmark(), None);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(&dir.path().join("screenlab.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
