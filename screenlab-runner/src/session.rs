//! Backtest sessions: the aggregate of one multi-date, multi-model run.
//!
//! A session is built by the runner's worker thread, finalized once, then
//! handed to the caller. It persists as a single JSON document.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use screenlab_core::domain::{Bar, BarCache, DatasetHash, ModelId};
use screenlab_core::model::{ScreenedSymbol, ScreenerModel};
use screenlab_core::persist::{read_json, write_json, JsonFileError};

use crate::performance::{evaluate_picks, PerformanceStats};

/// Current schema version for persisted sessions.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Colours handed to models in order, cycling when exhausted.
pub const MODEL_PALETTE: &[&str] = &[
    "#4C78A8", "#F58518", "#54A24B", "#E45756", "#72B7B2", "#EECA3B", "#B279A2", "#FF9DA6",
    "#9D755D", "#BAB0AC",
];

pub fn model_color(index: usize) -> &'static str {
    MODEL_PALETTE[index % MODEL_PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Still being filled by the runner.
    Running,
    Completed,
    Cancelled,
}

/// One model's output on one simulated date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBacktestResult {
    pub date: NaiveDate,
    pub model_id: ModelId,
    pub model_name: String,
    pub symbols: Vec<ScreenedSymbol>,
    /// Survivors after each pipeline step.
    #[serde(default)]
    pub step_counts: Vec<usize>,
    /// Candidates the model started from.
    #[serde(default)]
    pub universe_size: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceStats>,
}

impl DailyBacktestResult {
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

/// Per-model roll-up of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model_id: ModelId,
    pub model_name: String,
    pub days: usize,
    pub total_hits: usize,
    pub avg_hits_per_day: f64,
    /// Mean of daily win rates over days with evaluated picks.
    pub mean_win_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSession {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub benchmark_symbol: Option<String>,
    #[serde(default)]
    pub benchmark_bars: Vec<Bar>,
    /// Snapshots of the models as they were when the run started.
    pub models: Vec<ScreenerModel>,
    /// Ordered by date, then model order.
    pub results: Vec<DailyBacktestResult>,
    #[serde(default)]
    pub model_colors: BTreeMap<ModelId, String>,
    pub dataset_hash: DatasetHash,
}

impl BacktestSession {
    /// A fresh, running session. Colours are assigned in model order.
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        models: Vec<ScreenerModel>,
        dataset_hash: DatasetHash,
    ) -> Self {
        let model_colors = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, model_color(i).to_string()))
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            finalized_at: None,
            status: SessionStatus::Running,
            start_date,
            end_date,
            benchmark_symbol: None,
            benchmark_bars: Vec::new(),
            models,
            results: Vec::new(),
            model_colors,
            dataset_hash,
        }
    }

    pub fn with_benchmark(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.benchmark_symbol = Some(symbol.into());
        self.benchmark_bars = bars;
        self
    }

    pub(crate) fn push_result(&mut self, result: DailyBacktestResult) {
        self.results.push(result);
    }

    pub(crate) fn finalize(&mut self, status: SessionStatus) {
        self.status = status;
        self.finalized_at = Some(Utc::now());
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    /// Distinct simulated dates with at least one result, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.results.iter().map(|r| r.date).collect();
        dates.dedup();
        dates
    }

    pub fn results_for(&self, model_id: ModelId) -> impl Iterator<Item = &DailyBacktestResult> {
        self.results.iter().filter(move |r| r.model_id == model_id)
    }

    pub fn results_on(&self, date: NaiveDate) -> impl Iterator<Item = &DailyBacktestResult> {
        self.results.iter().filter(move |r| r.date == date)
    }

    pub fn color_for(&self, model_id: ModelId) -> Option<&str> {
        self.model_colors.get(&model_id).map(String::as_str)
    }

    /// Compute forward-return stats for every result from `master`.
    ///
    /// Each result is scored once; results that already carry stats are left
    /// alone. Returns how many results were updated.
    pub fn attach_performance(&mut self, master: &BarCache, holding_bars: usize) -> usize {
        let benchmark = self
            .benchmark_symbol
            .as_deref()
            .and_then(|s| master.get(s))
            .map(|series| series.as_slice());

        let mut updated = 0;
        for result in self.results.iter_mut().filter(|r| r.performance.is_none()) {
            let stats = evaluate_picks(
                result.symbols.iter().map(|s| s.symbol.as_str()),
                result.date,
                master,
                holding_bars,
                benchmark,
            );
            result.performance = Some(stats);
            updated += 1;
        }
        tracing::info!(session = %self.id, updated, holding_bars, "performance attached");
        updated
    }

    /// One summary per model, in model order.
    pub fn summary(&self) -> Vec<ModelSummary> {
        self.models
            .iter()
            .map(|model| {
                let results: Vec<_> = self.results_for(model.id).collect();
                let days = results.len();
                let total_hits: usize = results.iter().map(|r| r.symbol_count()).sum();
                let win_rates: Vec<f64> = results
                    .iter()
                    .filter_map(|r| r.performance.as_ref())
                    .filter(|p| p.evaluated > 0)
                    .map(|p| p.win_rate)
                    .collect();
                ModelSummary {
                    model_id: model.id,
                    model_name: model.name.clone(),
                    days,
                    total_hits,
                    avg_hits_per_day: if days == 0 {
                        0.0
                    } else {
                        total_hits as f64 / days as f64
                    },
                    mean_win_rate: (!win_rates.is_empty())
                        .then(|| win_rates.iter().sum::<f64>() / win_rates.len() as f64),
                }
            })
            .collect()
    }
}

// ─── Persistence ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: malformed session document: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: session schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

/// Write `session` to `path` as pretty JSON (atomic replace).
pub fn save_session(session: &BacktestSession, path: &Path) -> Result<(), SessionError> {
    write_json(path, session).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(session = %session.id, path = %path.display(), results = session.results.len(), "session saved");
    Ok(())
}

pub fn load_session(path: &Path) -> Result<BacktestSession, SessionError> {
    let session: BacktestSession = read_json(path).map_err(|e| match e {
        JsonFileError::Io(source) => SessionError::Io {
            path: path.to_path_buf(),
            source,
        },
        JsonFileError::Json(source) => SessionError::Malformed {
            path: path.to_path_buf(),
            source,
        },
    })?;
    if session.schema_version > SCHEMA_VERSION {
        return Err(SessionError::UnsupportedSchema {
            path: path.to_path_buf(),
            found: session.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(session)
}

/// Conventional file name for a session inside a sessions directory.
pub fn session_file_name(session: &BacktestSession) -> String {
    format!(
        "{}_{}_{}.json",
        session.start_date.format("%Y%m%d"),
        session.end_date.format("%Y%m%d"),
        session.id.simple()
    )
}
