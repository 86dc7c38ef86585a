//! Configuration errors shared by screeners, models and scoring strategies.
//!
//! Configuration is validated when it is saved or loaded, never in the
//! middle of a run, so these errors surface early.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown screener type: {0}")]
    UnknownScreener(String),

    #[error("unknown indicator type: {0}")]
    UnknownIndicator(String),

    #[error("{component}: unknown parameter '{key}'")]
    UnknownParameter { component: String, key: String },

    #[error("{component}: parameter '{key}' must be {expected}")]
    WrongParameterType {
        component: String,
        key: String,
        expected: &'static str,
    },

    #[error("{component}: parameter '{key}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        component: String,
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{component}: parameter '{key}' = '{value}' is not one of {allowed}")]
    InvalidChoice {
        component: String,
        key: String,
        value: String,
        allowed: String,
    },

    #[error("{component}: {reason}")]
    Invalid { component: String, reason: String },

    #[error("model '{model}' has no screening steps")]
    EmptyModel { model: String },

    #[error("name must not be empty")]
    EmptyName,

    #[error("strategy '{strategy}' has no indicators")]
    NoIndicators { strategy: String },

    #[error("strategy '{strategy}' has zero total weight across enabled indicators")]
    ZeroTotalWeight { strategy: String },

    #[error("strategy '{strategy}': weight {weight} for '{indicator}' must be finite and >= 0")]
    InvalidWeight {
        strategy: String,
        indicator: String,
        weight: f64,
    },

    #[error("config parse error: {0}")]
    Parse(String),
}
