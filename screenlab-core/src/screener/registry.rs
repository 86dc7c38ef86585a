//! Screener registry — converts `ScreenerConfig` into runtime trait objects.
//!
//! Each built-in screener is described by a [`ScreenerDescriptor`]: display
//! metadata, the parameter keys it recognises with their defaults and ranges,
//! and a constructor that receives already-validated parameters.

use std::collections::BTreeMap;

use crate::domain::{default_params, resolve_params, ParamMap, ParamSpec, ResolvedParams};
use crate::error::ConfigError;

use super::price::{AtrPercent, PriceRange, RsiRange};
use super::rank::{TopN, TopNMetric};
use super::trend::{MaAlignment, MaDirection, MaType, NearHigh};
use super::volume::{DollarVolume, VolumeSpike};
use super::{MinBarsOverride, Screener, ScreenerConfig};

type Constructor = fn(&ResolvedParams) -> Result<Box<dyn Screener>, ConfigError>;

/// Static description of one screener type.
#[derive(Clone, Copy)]
pub struct ScreenerDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    build: Constructor,
}

impl ScreenerDescriptor {
    pub const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        params: &'static [ParamSpec],
        build: Constructor,
    ) -> Self {
        Self {
            id,
            name,
            description,
            params,
            build,
        }
    }

    pub fn default_params(&self) -> ParamMap {
        default_params(self.params)
    }

    pub fn recognised_keys(&self) -> impl Iterator<Item = &'static str> {
        self.params.iter().map(|p| p.key)
    }
}

impl std::fmt::Debug for ScreenerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenerDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Lookup table of screener types.
#[derive(Debug, Clone, Default)]
pub struct ScreenerRegistry {
    descriptors: BTreeMap<&'static str, ScreenerDescriptor>,
}

impl ScreenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in screener.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in BUILTIN {
            registry.register(*descriptor);
        }
        registry
    }

    /// Add or replace a screener type.
    pub fn register(&mut self, descriptor: ScreenerDescriptor) {
        self.descriptors.insert(descriptor.id, descriptor);
    }

    pub fn get(&self, id: &str) -> Option<&ScreenerDescriptor> {
        self.descriptors.get(id)
    }

    /// Descriptors in identifier order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ScreenerDescriptor> {
        self.descriptors.values()
    }

    /// A config for `id` populated with its defaults.
    pub fn default_config(&self, id: &str) -> Result<ScreenerConfig, ConfigError> {
        let descriptor = self
            .get(id)
            .ok_or_else(|| ConfigError::UnknownScreener(id.to_string()))?;
        Ok(ScreenerConfig {
            screener: descriptor.id.to_string(),
            name: descriptor.name.to_string(),
            description: descriptor.description.to_string(),
            min_bars_override: None,
            params: descriptor.default_params(),
        })
    }

    /// Validate `config` and build the screener it describes.
    pub fn create(&self, config: &ScreenerConfig) -> Result<Box<dyn Screener>, ConfigError> {
        let descriptor = self
            .get(&config.screener)
            .ok_or_else(|| ConfigError::UnknownScreener(config.screener.clone()))?;
        let params = resolve_params(descriptor.id, descriptor.params, &config.params)?;
        let screener = (descriptor.build)(&params)?;
        Ok(match config.min_bars_override {
            Some(min_bars) => Box::new(MinBarsOverride::new(screener, min_bars)),
            None => screener,
        })
    }
}

// ─── Built-in descriptors ────────────────────────────────────────────

const BUILTIN: &[ScreenerDescriptor] = &[
    ScreenerDescriptor::new(
        "dollar_volume",
        "Dollar Volume",
        "Average close × volume over the lookback at or above a minimum",
        &[
            ParamSpec::number("min_dollar_volume", 10_000_000.0, 0.0, f64::MAX),
            ParamSpec::integer("lookback", 1, 1, 1000),
        ],
        build_dollar_volume,
    ),
    ScreenerDescriptor::new(
        "volume_spike",
        "Volume Spike",
        "Latest volume at least a multiple of the recent average",
        &[
            ParamSpec::number("multiplier", 2.0, 0.0, 1000.0),
            ParamSpec::integer("lookback", 20, 1, 1000),
        ],
        build_volume_spike,
    ),
    ScreenerDescriptor::new(
        "ma_alignment",
        "Moving Average Alignment",
        "Close and fast, medium and slow averages stacked in one direction",
        &[
            ParamSpec::integer("fast", 10, 1, 1000),
            ParamSpec::integer("medium", 20, 1, 1000),
            ParamSpec::integer("slow", 50, 1, 1000),
            ParamSpec::choice("ma_type", "sma", &["sma", "ema"]),
            ParamSpec::choice("direction", "bullish", &["bullish", "bearish"]),
        ],
        build_ma_alignment,
    ),
    ScreenerDescriptor::new(
        "price_range",
        "Price Range",
        "Latest close between a minimum and maximum price",
        &[
            ParamSpec::number("min_price", 5.0, 0.0, f64::MAX),
            ParamSpec::number("max_price", 10_000.0, 0.0, f64::MAX),
        ],
        build_price_range,
    ),
    ScreenerDescriptor::new(
        "rsi_range",
        "RSI Range",
        "RSI between a lower and upper bound",
        &[
            ParamSpec::integer("period", 14, 1, 500),
            ParamSpec::number("min_rsi", 30.0, 0.0, 100.0),
            ParamSpec::number("max_rsi", 70.0, 0.0, 100.0),
        ],
        build_rsi_range,
    ),
    ScreenerDescriptor::new(
        "near_high",
        "Near High",
        "Close within a percentage of the recent highest high",
        &[
            ParamSpec::integer("lookback", 50, 1, 2000),
            ParamSpec::number("within_pct", 5.0, 0.0, 100.0),
        ],
        build_near_high,
    ),
    ScreenerDescriptor::new(
        "atr_percent",
        "ATR Percent",
        "Average true range as a percent of close inside a band",
        &[
            ParamSpec::integer("period", 14, 1, 500),
            ParamSpec::number("min_pct", 0.0, 0.0, 1000.0),
            ParamSpec::number("max_pct", 10.0, 0.0, 1000.0),
        ],
        build_atr_percent,
    ),
    ScreenerDescriptor::new(
        "top_n",
        "Top N",
        "Keep the highest-ranked candidates by dollar volume or momentum",
        &[
            ParamSpec::integer("count", 25, 1, 100_000),
            ParamSpec::choice("metric", "dollar_volume", &["dollar_volume", "momentum"]),
            ParamSpec::integer("lookback", 20, 1, 1000),
        ],
        build_top_n,
    ),
];

// ─── Constructors ────────────────────────────────────────────────────

fn invalid(component: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        component: component.to_string(),
        reason: reason.into(),
    }
}

fn ordered_bounds(component: &str, min_key: &str, min: f64, max_key: &str, max: f64) -> Result<(), ConfigError> {
    if min > max {
        return Err(invalid(component, format!("{min_key} ({min}) exceeds {max_key} ({max})")));
    }
    Ok(())
}

fn build_dollar_volume(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    Ok(Box::new(DollarVolume::new(
        p.number("min_dollar_volume"),
        p.integer("lookback"),
    )))
}

fn build_volume_spike(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    Ok(Box::new(VolumeSpike::new(p.number("multiplier"), p.integer("lookback"))))
}

fn build_ma_alignment(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    let (fast, medium, slow) = (p.integer("fast"), p.integer("medium"), p.integer("slow"));
    if !(fast < medium && medium < slow) {
        return Err(invalid(
            "ma_alignment",
            format!("periods must satisfy fast < medium < slow, got {fast}/{medium}/{slow}"),
        ));
    }
    let ma_type = MaType::parse(p.text("ma_type"))
        .ok_or_else(|| invalid("ma_alignment", "unrecognised ma_type"))?;
    let direction = MaDirection::parse(p.text("direction"))
        .ok_or_else(|| invalid("ma_alignment", "unrecognised direction"))?;
    Ok(Box::new(MaAlignment::new(fast, medium, slow, ma_type, direction)))
}

fn build_price_range(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    let (min, max) = (p.number("min_price"), p.number("max_price"));
    ordered_bounds("price_range", "min_price", min, "max_price", max)?;
    Ok(Box::new(PriceRange::new(min, max)))
}

fn build_rsi_range(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    let (min, max) = (p.number("min_rsi"), p.number("max_rsi"));
    ordered_bounds("rsi_range", "min_rsi", min, "max_rsi", max)?;
    Ok(Box::new(RsiRange::new(p.integer("period"), min, max)))
}

fn build_near_high(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    Ok(Box::new(NearHigh::new(p.integer("lookback"), p.number("within_pct"))))
}

fn build_atr_percent(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    let (min, max) = (p.number("min_pct"), p.number("max_pct"));
    ordered_bounds("atr_percent", "min_pct", min, "max_pct", max)?;
    Ok(Box::new(AtrPercent::new(p.integer("period"), min, max)))
}

fn build_top_n(p: &ResolvedParams) -> Result<Box<dyn Screener>, ConfigError> {
    let metric = TopNMetric::parse(p.text("metric"))
        .ok_or_else(|| invalid("top_n", "unrecognised metric"))?;
    Ok(Box::new(TopN::new(p.integer("count"), metric, p.integer("lookback"))))
}
