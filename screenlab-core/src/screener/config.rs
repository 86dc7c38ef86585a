use serde::{Deserialize, Serialize};

use crate::domain::ParamMap;

/// One configured pipeline step: a screener type plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Registry identifier, e.g. `"dollar_volume"`.
    pub screener: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Replaces the screener's own history requirement when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_bars_override: Option<usize>,
    #[serde(default)]
    pub params: ParamMap,
}

impl ScreenerConfig {
    pub fn new(screener: impl Into<String>) -> Self {
        let screener = screener.into();
        Self {
            name: screener.clone(),
            screener,
            description: String::new(),
            min_bars_override: None,
            params: ParamMap::new(),
        }
    }

    /// Builder-style parameter override.
    pub fn with_param(mut self, key: &str, value: impl Into<crate::domain::ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_min_bars(mut self, min_bars: usize) -> Self {
        self.min_bars_override = Some(min_bars);
        self
    }

    /// Name for display, falling back to the screener type.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.screener
        } else {
            &self.name
        }
    }
}
