//! Progress reporting for backtest runs.
//!
//! Callbacks run on whichever thread executes the backtest, usually the
//! runner's worker thread. Nothing here assumes a UI thread exists; callers
//! that need one forward through [`ChannelObserver`].

use std::sync::mpsc::Sender;

use chrono::NaiveDate;
use uuid::Uuid;

use screenlab_core::domain::ModelId;

use crate::runner::BacktestError;
use crate::session::BacktestSession;

/// Receives lifecycle and progress notifications from a run.
///
/// Every method has a no-op default so observers implement only what they
/// care about.
pub trait BacktestObserver: Send {
    fn on_preparing(&self, _message: &str) {}

    /// `index` is zero-based; `total` is the number of trading dates.
    fn on_date_started(&self, _index: usize, _total: usize, _date: NaiveDate) {}

    fn on_model_completed(
        &self,
        _date: NaiveDate,
        _model_id: ModelId,
        _model_name: &str,
        _symbol_count: usize,
    ) {
    }

    /// Fraction of trading dates fully processed, 0.0..=1.0.
    fn on_progress(&self, _fraction: f64) {}

    fn on_completed(&self, _session: &BacktestSession) {}

    fn on_failed(&self, _error: &BacktestError) {}

    /// `session` holds only fully processed dates.
    fn on_cancelled(&self, _session: &BacktestSession) {}
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BacktestObserver for NoopObserver {}

/// Messages sent by [`ChannelObserver`].
///
/// Terminal events carry counts only; the session itself is handed over
/// once, by [`crate::RunHandle::join`].
#[derive(Debug, Clone)]
pub enum BacktestEvent {
    Preparing {
        message: String,
    },
    DateStarted {
        index: usize,
        total: usize,
        date: NaiveDate,
    },
    ModelCompleted {
        date: NaiveDate,
        model_id: ModelId,
        model_name: String,
        symbol_count: usize,
    },
    Progress(f64),
    Completed {
        session_id: Uuid,
        dates_processed: usize,
        results: usize,
    },
    Failed {
        error: String,
    },
    Cancelled {
        session_id: Uuid,
        dates_processed: usize,
        results: usize,
    },
}

impl BacktestEvent {
    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BacktestEvent::Completed { .. }
                | BacktestEvent::Failed { .. }
                | BacktestEvent::Cancelled { .. }
        )
    }
}

/// Forwards every notification over an `mpsc` channel.
///
/// A dropped receiver is not an error; the run carries on and the events
/// are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<BacktestEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<BacktestEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: BacktestEvent) {
        let _ = self.tx.send(event);
    }
}

impl BacktestObserver for ChannelObserver {
    fn on_preparing(&self, message: &str) {
        self.send(BacktestEvent::Preparing {
            message: message.to_string(),
        });
    }

    fn on_date_started(&self, index: usize, total: usize, date: NaiveDate) {
        self.send(BacktestEvent::DateStarted { index, total, date });
    }

    fn on_model_completed(
        &self,
        date: NaiveDate,
        model_id: ModelId,
        model_name: &str,
        symbol_count: usize,
    ) {
        self.send(BacktestEvent::ModelCompleted {
            date,
            model_id,
            model_name: model_name.to_string(),
            symbol_count,
        });
    }

    fn on_progress(&self, fraction: f64) {
        self.send(BacktestEvent::Progress(fraction));
    }

    fn on_completed(&self, session: &BacktestSession) {
        self.send(BacktestEvent::Completed {
            session_id: session.id,
            dates_processed: session.dates().len(),
            results: session.results.len(),
        });
    }

    fn on_failed(&self, error: &BacktestError) {
        self.send(BacktestEvent::Failed {
            error: error.to_string(),
        });
    }

    fn on_cancelled(&self, session: &BacktestSession) {
        self.send(BacktestEvent::Cancelled {
            session_id: session.id,
            dates_processed: session.dates().len(),
            results: session.results.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_observer_forwards_in_order() {
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        observer.on_preparing("loading");
        observer.on_date_started(0, 1, date);
        observer.on_progress(1.0);
        drop(observer);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], BacktestEvent::Preparing { message } if message == "loading"));
        assert!(matches!(events[1], BacktestEvent::DateStarted { index: 0, total: 1, .. }));
        assert!(matches!(events[2], BacktestEvent::Progress(p) if p == 1.0));
        assert!(!events[2].is_terminal());
    }

    #[test]
    fn terminal_events_carry_counts_not_sessions() {
        use screenlab_core::domain::DatasetHash;

        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let session = BacktestSession::new(start, start, Vec::new(), DatasetHash::from_bytes(b""));
        observer.on_completed(&session);
        observer.on_cancelled(&session);
        drop(observer);

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(
            events[0],
            BacktestEvent::Completed { session_id, dates_processed: 0, results: 0 } if session_id == session.id
        ));
        assert!(matches!(
            events[1],
            BacktestEvent::Cancelled { session_id, .. } if session_id == session.id
        ));
        assert!(events.iter().all(BacktestEvent::is_terminal));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelObserver::new(tx).on_preparing("nobody listening");
    }
}
