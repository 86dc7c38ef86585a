//! Scalar parameter maps with per-component declared keys.
//!
//! Persisted configurations carry a loose `key → scalar` map. Each screener
//! and indicator calculator declares the keys it recognises as a static
//! `ParamSpec` table; `resolve_params` checks overrides against that table and
//! fills in defaults, so concrete components only ever read validated values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Loose parameter map as persisted in model and strategy documents.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Accepted shape of a declared parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamKind {
    Number { min: f64, max: f64 },
    Integer { min: usize, max: usize },
    Flag,
    Choice(&'static [&'static str]),
}

/// Default of a declared parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamDefault {
    Number(f64),
    Integer(usize),
    Flag(bool),
    Choice(&'static str),
}

/// A recognised parameter key with its kind and default.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

impl ParamSpec {
    pub const fn number(key: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            key,
            kind: ParamKind::Number { min, max },
            default: ParamDefault::Number(default),
        }
    }

    pub const fn integer(key: &'static str, default: usize, min: usize, max: usize) -> Self {
        Self {
            key,
            kind: ParamKind::Integer { min, max },
            default: ParamDefault::Integer(default),
        }
    }

    pub const fn choice(
        key: &'static str,
        default: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            kind: ParamKind::Choice(options),
            default: ParamDefault::Choice(default),
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self.default {
            ParamDefault::Number(v) => ParamValue::Number(v),
            ParamDefault::Integer(v) => ParamValue::Number(v as f64),
            ParamDefault::Flag(v) => ParamValue::Bool(v),
            ParamDefault::Choice(v) => ParamValue::Text(v.to_string()),
        }
    }

    fn check(&self, component: &str, value: &ParamValue) -> Result<(), ConfigError> {
        let wrong_type = |expected: &'static str| ConfigError::WrongParameterType {
            component: component.to_string(),
            key: self.key.to_string(),
            expected,
        };
        let out_of_range = |value: f64, min: f64, max: f64| ConfigError::OutOfRange {
            component: component.to_string(),
            key: self.key.to_string(),
            value,
            min,
            max,
        };

        match self.kind {
            ParamKind::Number { min, max } => {
                let v = value.as_f64().ok_or_else(|| wrong_type("a number"))?;
                if !v.is_finite() || v < min || v > max {
                    return Err(out_of_range(v, min, max));
                }
            }
            ParamKind::Integer { min, max } => {
                let v = value.as_f64().ok_or_else(|| wrong_type("a whole number"))?;
                if v.fract() != 0.0 {
                    return Err(wrong_type("a whole number"));
                }
                if v < min as f64 || v > max as f64 {
                    return Err(out_of_range(v, min as f64, max as f64));
                }
            }
            ParamKind::Flag => {
                value.as_bool().ok_or_else(|| wrong_type("true or false"))?;
            }
            ParamKind::Choice(options) => {
                let v = value.as_str().ok_or_else(|| wrong_type("a string"))?;
                if !options.contains(&v) {
                    return Err(ConfigError::InvalidChoice {
                        component: component.to_string(),
                        key: self.key.to_string(),
                        value: v.to_string(),
                        allowed: options.join("|"),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Default map for a spec table.
pub fn default_params(specs: &[ParamSpec]) -> ParamMap {
    specs
        .iter()
        .map(|s| (s.key.to_string(), s.default_value()))
        .collect()
}

/// Parameters after validation, with every declared key present.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    values: ParamMap,
}

impl ResolvedParams {
    pub fn number(&self, key: &str) -> f64 {
        self.values
            .get(key)
            .and_then(ParamValue::as_f64)
            .unwrap_or(f64::NAN)
    }

    pub fn integer(&self, key: &str) -> usize {
        self.values
            .get(key)
            .and_then(ParamValue::as_f64)
            .map(|v| v as usize)
            .unwrap_or(0)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.values
            .get(key)
            .and_then(ParamValue::as_bool)
            .unwrap_or(false)
    }

    pub fn text(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(ParamValue::as_str)
            .unwrap_or("")
    }

    pub fn as_map(&self) -> &ParamMap {
        &self.values
    }
}

/// Validate `overrides` against `specs` and merge them over the defaults.
pub fn resolve_params(
    component: &str,
    specs: &[ParamSpec],
    overrides: &ParamMap,
) -> Result<ResolvedParams, ConfigError> {
    for (key, value) in overrides {
        let spec = specs
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| ConfigError::UnknownParameter {
                component: component.to_string(),
                key: key.clone(),
            })?;
        spec.check(component, value)?;
    }

    let mut values = default_params(specs);
    for (key, value) in overrides {
        values.insert(key.clone(), value.clone());
    }
    Ok(ResolvedParams { values })
}
