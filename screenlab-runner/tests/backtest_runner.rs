//! Integration tests for the runner: whole runs over synthetic caches.
//!
//! Covers the five-day single-model run, cancellation after two of ten
//! dates, failure without a session, and the background runner's event
//! stream and state machine, including a dropped handle.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use screenlab_core::domain::{Bar, BarCache, BarSeries, ModelId};
use screenlab_core::model::ScreenerModel;
use screenlab_core::screener::{ScreenerConfig, ScreenerRegistry};
use screenlab_core::slicer::ValidationError;
use screenlab_runner::{
    generate_trading_dates, run_backtest, BacktestError, BacktestEvent, BacktestObserver,
    BacktestRequest, BacktestRunner, CancelToken, NoopObserver, RunnerState, SessionStatus,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Weekday bars from `from` through `to`, drifting up 0.1% a day from `base`.
fn weekday_bars(from: NaiveDate, to: NaiveDate, base: f64, volume: f64) -> Vec<Bar> {
    generate_trading_dates(from, to)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let c = base * (1.0 + 0.001 * i as f64);
            Bar::new(date, c, c + 1.0, c - 1.0, c, volume)
        })
        .collect()
}

fn master() -> Arc<BarCache> {
    let from = d(2023, 10, 2);
    let to = d(2024, 3, 29);
    let mut cache = BarCache::new();
    cache.insert("CHEAP.US".into(), BarSeries::new(weekday_bars(from, to, 2.0, 10_000.0)));
    cache.insert("MID.US".into(), BarSeries::new(weekday_bars(from, to, 40.0, 500_000.0)));
    cache.insert("BIG.US".into(), BarSeries::new(weekday_bars(from, to, 300.0, 2_000_000.0)));
    cache.insert("SPY.US".into(), BarSeries::new(weekday_bars(from, to, 450.0, 50_000_000.0)));
    Arc::new(cache)
}

fn price_model() -> ScreenerModel {
    ScreenerModel::new(
        "Above $10",
        vec![ScreenerConfig::new("price_range").with_param("min_price", 10.0)],
    )
}

fn request(models: Vec<ScreenerModel>, start: NaiveDate, end: NaiveDate) -> BacktestRequest {
    BacktestRequest::new(models, start, end, master(), Arc::new(ScreenerRegistry::builtin()))
}

/// Records every callback as a string for ordering assertions.
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl BacktestObserver for Recorder {
    fn on_date_started(&self, index: usize, total: usize, date: NaiveDate) {
        self.push(format!("date {index}/{total} {date}"));
    }

    fn on_model_completed(&self, date: NaiveDate, _id: ModelId, name: &str, count: usize) {
        self.push(format!("model {date} {name} {count}"));
    }

    fn on_progress(&self, fraction: f64) {
        self.push(format!("progress {fraction:.2}"));
    }

    fn on_completed(&self, session: &screenlab_runner::BacktestSession) {
        self.push(format!("completed {}", session.results.len()));
    }

    fn on_failed(&self, _error: &BacktestError) {
        self.push("failed".into());
    }

    fn on_cancelled(&self, session: &screenlab_runner::BacktestSession) {
        self.push(format!("cancelled {}", session.results.len()));
    }
}

#[test]
fn five_trading_days_one_model() {
    // Mon 2024-03-04 .. Fri 2024-03-08
    let req = request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8)).with_benchmark("SPY.US");
    let recorder = Recorder::default();
    let outcome = run_backtest(&req, &CancelToken::new(), &recorder).unwrap();

    assert!(!outcome.is_cancelled());
    let session = outcome.into_session();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.is_finalized());
    assert_eq!(session.results.len(), 5);

    let dates: Vec<_> = session.results.iter().map(|r| r.date).collect();
    assert_eq!(dates, generate_trading_dates(d(2024, 3, 4), d(2024, 3, 8)));
    assert!(dates.windows(2).all(|w| w[0] < w[1]));

    for result in &session.results {
        assert_eq!(result.model_name, "Above $10");
        assert_eq!(result.universe_size, 4);
        let names: Vec<_> = result.symbols.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["BIG.US", "MID.US", "SPY.US"]);
    }
    assert_eq!(session.benchmark_bars.len(), 5);

    let log = recorder.entries();
    assert_eq!(log.first().map(String::as_str), Some("date 0/5 2024-03-04"));
    assert_eq!(log.last().map(String::as_str), Some("completed 5"));
    assert!(log.contains(&"progress 1.00".to_string()));
}

#[test]
fn results_are_ordered_by_date_then_model() {
    let second = ScreenerModel::new(
        "Liquid",
        vec![ScreenerConfig::new("dollar_volume").with_param("min_dollar_volume", 1_000_000.0)],
    );
    let models = vec![price_model(), second];
    let ids: Vec<_> = models.iter().map(|m| m.id).collect();
    let req = request(models, d(2024, 3, 4), d(2024, 3, 6));
    let session = run_backtest(&req, &CancelToken::new(), &NoopObserver)
        .unwrap()
        .into_session();

    assert_eq!(session.results.len(), 6);
    for (i, result) in session.results.iter().enumerate() {
        assert_eq!(result.model_id, ids[i % 2]);
    }
    assert_eq!(session.dates().len(), 3);
    assert_eq!(session.model_colors.len(), 2);
}

/// Cancels once the second date's models have all completed.
struct CancelAfter {
    token: CancelToken,
    date: NaiveDate,
    recorder: Recorder,
}

impl BacktestObserver for CancelAfter {
    fn on_model_completed(&self, date: NaiveDate, id: ModelId, name: &str, count: usize) {
        self.recorder.on_model_completed(date, id, name, count);
        if date == self.date {
            self.token.cancel();
        }
    }

    fn on_cancelled(&self, session: &screenlab_runner::BacktestSession) {
        self.recorder.on_cancelled(session);
    }
}

#[test]
fn cancel_after_second_of_ten_dates() {
    // Mon 2024-03-04 .. Fri 2024-03-15: ten trading days.
    let dates = generate_trading_dates(d(2024, 3, 4), d(2024, 3, 15));
    assert_eq!(dates.len(), 10);

    let token = CancelToken::new();
    let observer = CancelAfter {
        token: token.clone(),
        date: dates[1],
        recorder: Recorder::default(),
    };
    let req = request(vec![price_model()], dates[0], dates[9]);
    let outcome = run_backtest(&req, &token, &observer).unwrap();

    assert!(outcome.is_cancelled());
    let session = outcome.session();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert_eq!(session.dates(), dates[..2].to_vec());
    assert_eq!(session.results.len(), 2);
    assert!(session.results.iter().all(|r| r.symbols.len() == 3));
    assert_eq!(
        observer.recorder.entries().last().map(String::as_str),
        Some("cancelled 2")
    );
}

#[test]
fn insufficient_history_fails_without_session() {
    // rsi_range needs 15 bars; the cache starts 2023-10-02, so a run starting
    // on the 5th trading day has too little history.
    let model = ScreenerModel::new("RSI", vec![ScreenerConfig::new("rsi_range")]);
    let req = request(vec![model], d(2023, 10, 6), d(2023, 10, 13));
    let recorder = Recorder::default();

    let err = run_backtest(&req, &CancelToken::new(), &recorder).unwrap_err();
    assert!(matches!(
        err,
        BacktestError::Validation(ValidationError::InsufficientHistory { required: 15, .. })
    ));
    assert_eq!(recorder.entries(), vec!["failed"]);
}

#[test]
fn weekend_only_range_completes_empty() {
    let req = request(vec![price_model()], d(2024, 3, 9), d(2024, 3, 10));
    let outcome = run_backtest(&req, &CancelToken::new(), &NoopObserver).unwrap();
    assert!(!outcome.is_cancelled());
    assert!(outcome.session().results.is_empty());
}

#[test]
fn background_runner_streams_events_and_returns_to_idle() {
    let runner = BacktestRunner::new();
    assert_eq!(runner.state(), RunnerState::Idle);

    let (tx, rx) = mpsc::channel();
    let req = request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8));
    let handle = runner.start(req, tx).unwrap();

    let events: Vec<BacktestEvent> = rx.iter().collect();
    let outcome = handle.join().unwrap();
    assert_eq!(runner.state(), RunnerState::Idle);
    assert_eq!(outcome.session().results.len(), 5);

    assert!(matches!(events.first(), Some(BacktestEvent::Preparing { .. })));
    let date_events = events
        .iter()
        .filter(|e| matches!(e, BacktestEvent::DateStarted { .. }))
        .count();
    assert_eq!(date_events, 5);
    match events.last() {
        Some(BacktestEvent::Completed {
            session_id,
            dates_processed,
            results,
        }) => {
            assert_eq!(*session_id, outcome.session().id);
            assert_eq!(*dates_processed, 5);
            assert_eq!(*results, 5);
        }
        other => panic!("expected completion event, got {other:?}"),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[test]
fn runner_rejects_second_start_until_joined() {
    let runner = BacktestRunner::new();
    let (tx, rx) = mpsc::channel();
    let handle = runner
        .start(request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8)), tx)
        .unwrap();

    let (tx2, _rx2) = mpsc::channel();
    let second = runner.start(request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8)), tx2);
    assert!(matches!(second, Err(BacktestError::AlreadyRunning)));

    // Drain until the worker hangs up, then the runner is in a terminal state.
    let _ = rx.iter().count();
    assert!(runner.state().is_terminal());
    handle.join().unwrap();
    assert!(runner.is_idle());
}

#[test]
fn dropped_handle_returns_runner_to_idle() {
    let runner = BacktestRunner::new();
    let (tx, rx) = mpsc::channel();
    let handle = runner
        .start(request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8)), tx)
        .unwrap();
    drop(handle);

    // The channel closes only after the worker has exited.
    let _ = rx.iter().count();
    assert!(runner.is_idle());

    let (tx, rx) = mpsc::channel();
    let handle = runner
        .start(request(vec![price_model()], d(2024, 3, 4), d(2024, 3, 8)), tx)
        .unwrap();
    let _ = rx.iter().count();
    // Worker finished first, handle dropped second.
    assert!(runner.state().is_terminal());
    drop(handle);
    assert!(runner.is_idle());
}

#[test]
fn background_failure_reports_failed_state() {
    let runner = BacktestRunner::new();
    let (tx, rx) = mpsc::channel();
    let handle = runner
        .start(request(vec![], d(2024, 3, 4), d(2024, 3, 8)), tx)
        .unwrap();

    let events: Vec<_> = rx.iter().collect();
    assert!(matches!(events.last(), Some(BacktestEvent::Failed { .. })));
    assert_eq!(runner.state(), RunnerState::Failed);
    assert!(matches!(handle.join(), Err(BacktestError::NoEnabledModels)));
    assert!(runner.is_idle());
}

#[test]
fn runner_cancel_stops_a_long_run() {
    let runner = BacktestRunner::new();
    let (tx, rx) = mpsc::channel();
    // The worker may finish a few dates before it sees the flag.
    let handle = runner
        .start(request(vec![price_model()], d(2023, 11, 1), d(2024, 3, 29)), tx)
        .unwrap();
    runner.cancel();
    let _events: Vec<_> = rx.iter().collect();
    let outcome = handle.join().unwrap();

    let session = outcome.session();
    // One result per processed date, never a partial date.
    assert_eq!(session.results.len(), session.dates().len());
    if outcome.is_cancelled() {
        assert_eq!(session.status, SessionStatus::Cancelled);
    }
}
