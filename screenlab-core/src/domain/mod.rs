//! Domain types for ScreenLab

pub mod bar;
pub mod ids;
pub mod params;
pub mod series;

pub use bar::Bar;
pub use ids::{DatasetHash, ModelId, StrategyId};
pub use params::{
    default_params, resolve_params, ParamKind, ParamMap, ParamSpec, ParamValue, ResolvedParams,
};
pub use series::{BarCache, BarSeries};

/// Symbol type alias
pub type Symbol = String;

/// Canonical symbol spelling: trimmed and upper-cased (`aapl.us` → `AAPL.US`).
pub fn normalize_symbol(raw: &str) -> Symbol {
    raw.trim().to_ascii_uppercase()
}
