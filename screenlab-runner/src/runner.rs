//! Backtest runner: replays screener models across a range of trading dates.
//!
//! Two entry points:
//! - `run_backtest()`: synchronous, runs on the caller's thread. Used by the
//!   CLI and by tests.
//! - `BacktestRunner::start()`: spawns a named worker thread that calls
//!   `run_backtest()` and reports through a `BacktestEvent` channel.
//!
//! Architecture invariant: every model on date D sees `slice_upto(master, D)`
//! and nothing else, so no result can depend on bars after D.

use std::collections::HashSet;
use std::io;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use screenlab_core::data::dataset_hash;
use screenlab_core::domain::{normalize_symbol, BarCache, ModelId, Symbol};
use screenlab_core::model::{CompiledModel, ScreenerModel};
use screenlab_core::screener::ScreenerRegistry;
use screenlab_core::slicer::{slice_upto, validate_cache, CacheValidation, ValidationError};
use screenlab_core::ConfigError;

use crate::calendar::generate_trading_dates;
use crate::cancel::CancelToken;
use crate::observer::{BacktestEvent, BacktestObserver, ChannelObserver};
use crate::session::{BacktestSession, DailyBacktestResult, SessionStatus};

/// Errors that end a run without a session.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("cache validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("model '{model}' is invalid: {source}")]
    Config {
        model: String,
        #[source]
        source: ConfigError,
    },

    #[error("no enabled models to run")]
    NoEnabledModels,

    #[error("universe is empty after validation")]
    EmptyUniverse,

    #[error("a backtest is already running")]
    AlreadyRunning,

    #[error("failed to spawn backtest worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("backtest worker panicked")]
    WorkerPanicked,
}

/// What to do with universe symbols lacking history at the start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Any insufficient symbol fails the run.
    #[default]
    Strict,
    /// Remove insufficient symbols from the universe and carry on.
    DropInsufficient,
}

/// Everything a run needs. Models are snapshotted when the run starts.
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub models: Vec<ScreenerModel>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub master: Arc<BarCache>,
    /// Candidate symbols in screening order. `None` means every symbol in
    /// the master cache.
    pub universe: Option<Vec<Symbol>>,
    pub benchmark_symbol: Option<String>,
    pub policy: ValidationPolicy,
    pub registry: Arc<ScreenerRegistry>,
}

impl BacktestRequest {
    pub fn new(
        models: Vec<ScreenerModel>,
        start: NaiveDate,
        end: NaiveDate,
        master: Arc<BarCache>,
        registry: Arc<ScreenerRegistry>,
    ) -> Self {
        Self {
            models,
            start,
            end,
            master,
            universe: None,
            benchmark_symbol: None,
            policy: ValidationPolicy::default(),
            registry,
        }
    }

    pub fn with_universe(mut self, universe: Vec<Symbol>) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn with_benchmark(mut self, symbol: impl Into<String>) -> Self {
        self.benchmark_symbol = Some(symbol.into());
        self
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Terminal outcome of a run that did not fail.
#[derive(Debug)]
pub enum BacktestOutcome {
    Completed(BacktestSession),
    /// Holds only the dates processed before cancellation was seen.
    Cancelled(BacktestSession),
}

impl BacktestOutcome {
    pub fn session(&self) -> &BacktestSession {
        match self {
            BacktestOutcome::Completed(s) | BacktestOutcome::Cancelled(s) => s,
        }
    }

    pub fn into_session(self) -> BacktestSession {
        match self {
            BacktestOutcome::Completed(s) | BacktestOutcome::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BacktestOutcome::Cancelled(_))
    }
}

struct PreparedRun {
    snapshots: Vec<ScreenerModel>,
    models: Vec<CompiledModel>,
    universe: Vec<Symbol>,
    dates: Vec<NaiveDate>,
}

/// Run a backtest on the current thread.
///
/// Failures are reported to `observer.on_failed` and returned; no session
/// is produced. Cancellation is checked before each trading date and is not
/// an error.
pub fn run_backtest(
    request: &BacktestRequest,
    cancel: &CancelToken,
    observer: &dyn BacktestObserver,
) -> Result<BacktestOutcome, BacktestError> {
    let started = Instant::now();
    let result = prepare(request, observer).and_then(|prepared| simulate(request, prepared, cancel, observer));
    match &result {
        Ok(outcome) => tracing::info!(
            session = %outcome.session().id,
            cancelled = outcome.is_cancelled(),
            results = outcome.session().results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backtest finished"
        ),
        Err(error) => {
            tracing::error!(error = %error, "backtest failed");
            observer.on_failed(error);
        }
    }
    result
}

fn prepare(
    request: &BacktestRequest,
    observer: &dyn BacktestObserver,
) -> Result<PreparedRun, BacktestError> {
    observer.on_preparing("validating request");
    if request.end < request.start {
        return Err(ValidationError::InvalidDateRange {
            start: request.start,
            end: request.end,
        }
        .into());
    }

    let snapshots: Vec<ScreenerModel> = request.models.iter().filter(|m| m.enabled).cloned().collect();
    if snapshots.is_empty() {
        return Err(BacktestError::NoEnabledModels);
    }

    observer.on_preparing("compiling models");
    let models = snapshots
        .iter()
        .map(|m| {
            m.compile(&request.registry).map_err(|source| BacktestError::Config {
                model: m.name.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let required = models
        .iter()
        .map(CompiledModel::min_bars_required)
        .max()
        .unwrap_or(0);

    observer.on_preparing(&format!(
        "validating cache: {required} bars required on {}",
        request.start
    ));
    let validation = validate_cache(&request.master, request.start, request.end, required)?;
    let universe = resolve_universe(request, &validation)?;

    let dates = generate_trading_dates(request.start, request.end);
    tracing::info!(
        models = models.len(),
        universe = universe.len(),
        dates = dates.len(),
        required_bars = required,
        "backtest prepared"
    );
    Ok(PreparedRun {
        snapshots,
        models,
        universe,
        dates,
    })
}

/// Candidate symbols, filtered by the validation policy.
fn resolve_universe(
    request: &BacktestRequest,
    validation: &CacheValidation,
) -> Result<Vec<Symbol>, BacktestError> {
    let candidates: Vec<Symbol> = match &request.universe {
        Some(list) => {
            let mut seen = HashSet::new();
            list.iter()
                .map(|s| normalize_symbol(s))
                .filter(|s| seen.insert(s.clone()))
                .collect()
        }
        None => request.master.keys().cloned().collect(),
    };

    let sufficient: HashSet<&str> = validation.sufficient.iter().map(String::as_str).collect();
    let (universe, insufficient): (Vec<Symbol>, Vec<Symbol>) = candidates
        .into_iter()
        .partition(|s| sufficient.contains(s.as_str()));

    if !insufficient.is_empty() {
        match request.policy {
            ValidationPolicy::Strict => {
                return Err(ValidationError::InsufficientHistory {
                    start: validation.start,
                    required: validation.required,
                    symbols: insufficient,
                }
                .into());
            }
            ValidationPolicy::DropInsufficient => {
                tracing::warn!(
                    dropped = insufficient.len(),
                    required = validation.required,
                    first = %insufficient[0],
                    "dropping symbols without enough history"
                );
            }
        }
    }

    if universe.is_empty() {
        return Err(BacktestError::EmptyUniverse);
    }
    Ok(universe)
}

fn simulate(
    request: &BacktestRequest,
    prepared: PreparedRun,
    cancel: &CancelToken,
    observer: &dyn BacktestObserver,
) -> Result<BacktestOutcome, BacktestError> {
    let PreparedRun {
        snapshots,
        models,
        universe,
        dates,
    } = prepared;

    let mut session = BacktestSession::new(
        request.start,
        request.end,
        snapshots,
        dataset_hash(&request.master),
    );
    if let Some(raw) = &request.benchmark_symbol {
        let symbol = normalize_symbol(raw);
        let bars = match request.master.get(&symbol) {
            Some(series) => series.between(request.start, request.end).to_vec(),
            None => {
                tracing::warn!(symbol = %symbol, "benchmark symbol not in cache");
                Vec::new()
            }
        };
        session = session.with_benchmark(symbol, bars);
    }

    let total = dates.len();
    for (index, &date) in dates.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(processed = index, total, "backtest cancelled");
            session.finalize(SessionStatus::Cancelled);
            observer.on_cancelled(&session);
            return Ok(BacktestOutcome::Cancelled(session));
        }

        observer.on_date_started(index, total, date);
        let date_started = Instant::now();
        let sliced = slice_upto(&request.master, date);

        for model in &models {
            let model_started = Instant::now();
            let run = model.execute(&universe, &sliced);
            let duration_ms = model_started.elapsed().as_millis() as u64;
            observer.on_model_completed(date, model.id(), model.name(), run.symbols.len());
            session.push_result(DailyBacktestResult {
                date,
                model_id: model.id(),
                model_name: model.name().to_string(),
                symbols: run.symbols,
                step_counts: run.step_counts,
                universe_size: universe.len(),
                duration_ms,
                performance: None,
            });
        }

        tracing::debug!(
            %date,
            elapsed_ms = date_started.elapsed().as_millis() as u64,
            "date processed"
        );
        observer.on_progress((index + 1) as f64 / total as f64);
    }

    session.finalize(SessionStatus::Completed);
    observer.on_completed(&session);
    Ok(BacktestOutcome::Completed(session))
}

// ─── Background runner ───────────────────────────────────────────────

/// Lifecycle of a [`BacktestRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerState {
    #[default]
    Idle,
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunnerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunnerState::Completed | RunnerState::Failed | RunnerState::Cancelled
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the runner, its worker and the handle.
#[derive(Debug, Default)]
struct RunSlot {
    state: RunnerState,
    /// The worker thread has returned (or unwound).
    worker_done: bool,
    /// The handle was joined or dropped.
    released: bool,
}

impl RunSlot {
    /// Back to Idle once both the worker and the handle are finished.
    fn settle(&mut self) {
        if self.worker_done && self.released {
            self.state = RunnerState::Idle;
        }
    }
}

/// Marks the worker finished when dropped, including on panic.
struct WorkerDone(Arc<Mutex<RunSlot>>);

impl Drop for WorkerDone {
    fn drop(&mut self) {
        let mut slot = lock(&self.0);
        slot.worker_done = true;
        slot.settle();
    }
}

/// Runs one backtest at a time on a background thread.
///
/// Idle → Preparing → Running → {Completed | Failed | Cancelled} → Idle.
/// The terminal state stays visible until the [`RunHandle`] is joined or
/// dropped and the worker has exited; then the runner is Idle again.
#[derive(Debug, Default)]
pub struct BacktestRunner {
    slot: Arc<Mutex<RunSlot>>,
    cancel: Mutex<CancelToken>,
}

impl BacktestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunnerState {
        lock(&self.slot).state
    }

    pub fn is_idle(&self) -> bool {
        self.state() == RunnerState::Idle
    }

    /// Start `request` on a worker thread and return immediately.
    ///
    /// Events go to `events`; the outcome comes back through the handle.
    pub fn start(
        &self,
        request: BacktestRequest,
        events: Sender<BacktestEvent>,
    ) -> Result<RunHandle, BacktestError> {
        {
            let mut slot = lock(&self.slot);
            if slot.state != RunnerState::Idle {
                return Err(BacktestError::AlreadyRunning);
            }
            *slot = RunSlot {
                state: RunnerState::Preparing,
                worker_done: false,
                released: false,
            };
        }

        let token = CancelToken::new();
        *lock(&self.cancel) = token.clone();

        let observer = StateObserver {
            inner: ChannelObserver::new(events),
            slot: Arc::clone(&self.slot),
        };
        let done = WorkerDone(Arc::clone(&self.slot));
        let worker_token = token.clone();
        let spawned = thread::Builder::new()
            .name("backtest-worker".into())
            .spawn(move || {
                // Dropped in reverse order: the slot is settled before the
                // event channel closes.
                let observer = observer;
                let _done = done;
                run_backtest(&request, &worker_token, &observer)
            });

        match spawned {
            Ok(handle) => Ok(RunHandle {
                handle: Some(handle),
                slot: Arc::clone(&self.slot),
                cancel: token,
            }),
            Err(e) => {
                *lock(&self.slot) = RunSlot::default();
                Err(BacktestError::Spawn(e))
            }
        }
    }

    /// Ask the current run to stop before its next date.
    pub fn cancel(&self) {
        lock(&self.cancel).cancel();
    }
}

/// Owner's handle on a background run.
///
/// Dropping it detaches the worker; the runner returns to Idle as soon as
/// the worker exits.
#[derive(Debug)]
pub struct RunHandle {
    handle: Option<JoinHandle<Result<BacktestOutcome, BacktestError>>>,
    slot: Arc<Mutex<RunSlot>>,
    cancel: CancelToken,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker and take ownership of its outcome. The runner
    /// returns to Idle.
    pub fn join(mut self) -> Result<BacktestOutcome, BacktestError> {
        let outcome = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                tracing::error!("backtest worker panicked");
                Err(BacktestError::WorkerPanicked)
            }),
            None => Err(BacktestError::WorkerPanicked),
        };
        let mut slot = lock(&self.slot);
        slot.worker_done = true;
        slot.released = true;
        slot.state = RunnerState::Idle;
        outcome
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if !slot.released {
            slot.released = true;
            slot.settle();
        }
    }
}

/// Tracks runner state from run callbacks, then forwards them.
struct StateObserver {
    inner: ChannelObserver,
    slot: Arc<Mutex<RunSlot>>,
}

impl StateObserver {
    fn set(&self, state: RunnerState) {
        lock(&self.slot).state = state;
    }
}

impl BacktestObserver for StateObserver {
    fn on_preparing(&self, message: &str) {
        self.set(RunnerState::Preparing);
        self.inner.on_preparing(message);
    }

    fn on_date_started(&self, index: usize, total: usize, date: NaiveDate) {
        self.set(RunnerState::Running);
        self.inner.on_date_started(index, total, date);
    }

    fn on_model_completed(
        &self,
        date: NaiveDate,
        model_id: ModelId,
        model_name: &str,
        symbol_count: usize,
    ) {
        self.inner
            .on_model_completed(date, model_id, model_name, symbol_count);
    }

    fn on_progress(&self, fraction: f64) {
        self.inner.on_progress(fraction);
    }

    fn on_completed(&self, session: &BacktestSession) {
        self.set(RunnerState::Completed);
        self.inner.on_completed(session);
    }

    fn on_failed(&self, error: &BacktestError) {
        self.set(RunnerState::Failed);
        self.inner.on_failed(error);
    }

    fn on_cancelled(&self, session: &BacktestSession) {
        self.set(RunnerState::Cancelled);
        self.inner.on_cancelled(session);
    }
}
