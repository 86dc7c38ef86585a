//! ScreenLab Core — bar data, indicators, screeners, models, cache slicing, scoring.
//!
//! This crate contains everything a screening run needs except the run
//! orchestration itself:
//! - Domain types (bars, shared bar series, parameter maps, identifiers)
//! - Flat-file bar store with parallel loading
//! - Indicator math over numeric series and bar slices
//! - Screener trait, registry and built-in screeners
//! - Screener models compiled into ordered pipelines
//! - Point-in-time cache slicing and history validation
//! - Weighted indicator scoring with persisted strategies

pub mod data;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod model;
pub mod persist;
pub mod scoring;
pub mod screener;
pub mod slicer;

pub use error::ConfigError;
