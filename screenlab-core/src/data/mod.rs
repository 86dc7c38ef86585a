//! Bar data store: flat-file parsing, symbol discovery, and parallel loading
//! into an in-memory [`BarCache`].

pub mod parser;
pub mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{normalize_symbol, Bar, BarCache, BarSeries, DatasetHash};

pub use parser::{parse_bar_file, parse_bars, LoadWindow};
pub use store::{join_load, scan_directory, BarStore, LoadFailure, LoadReport, SymbolLocation};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data root {0} is not a readable directory")]
    InvalidRoot(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}line {line}: {reason}", path.as_ref().map(|p| format!("{}: ", p.display())).unwrap_or_default())]
    Parse {
        path: Option<PathBuf>,
        line: usize,
        reason: String,
    },

    #[error("{path}: file contains no bars")]
    Empty { path: PathBuf },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("background load thread panicked")]
    LoaderPanicked,
}

impl DataError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        DataError::Parse {
            path: None,
            line,
            reason: reason.into(),
        }
    }

    /// Attach a file path to a parse error that lacks one.
    pub(crate) fn with_path(self, file: &Path) -> Self {
        match self {
            DataError::Parse {
                path: None,
                line,
                reason,
            } => DataError::Parse {
                path: Some(file.to_path_buf()),
                line,
                reason,
            },
            other => other,
        }
    }
}

/// Build a cache from raw per-symbol bar vectors.
///
/// Symbols are normalized, bars are sorted by date, and later duplicates of a
/// date are dropped. Used when bars arrive from somewhere other than the flat
/// files (tests, imports).
pub fn build_cache<I, S>(entries: I) -> BarCache
where
    I: IntoIterator<Item = (S, Vec<Bar>)>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|(symbol, mut bars)| {
            bars.sort_by_key(|b| b.date);
            bars.dedup_by_key(|b| b.date);
            (normalize_symbol(symbol.as_ref()), BarSeries::new(bars))
        })
        .collect()
}

/// Content hash of a cache: symbol names and every bar field, in symbol order.
///
/// Two caches with identical contents hash identically regardless of how the
/// series were sliced or shared.
pub fn dataset_hash(cache: &BarCache) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for (symbol, series) in cache {
        hasher.update(symbol.as_bytes());
        hasher.update(&(series.len() as u64).to_le_bytes());
        for bar in series.iter() {
            hasher.update(&bar.date.to_string().into_bytes());
            for v in [bar.open, bar.high, bar.low, bar.close, bar.volume, bar.open_interest] {
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

/// Per-symbol bar counts, handy for logging and reports.
pub fn bar_counts(cache: &BarCache) -> BTreeMap<String, usize> {
    cache.iter().map(|(s, series)| (s.clone(), series.len())).collect()
}
