//! ScreenLab Runner — replays screener models across historical dates.
//!
//! This crate builds on `screenlab-core` to provide:
//! - Trading calendar (weekday dates)
//! - Synchronous and background backtest runners with cooperative cancellation
//! - Observer callbacks and a channel-backed event stream
//! - Backtest sessions with JSON persistence
//! - Forward-return performance statistics
//! - TOML engine configuration

pub mod calendar;
pub mod cancel;
pub mod config;
pub mod observer;
pub mod performance;
pub mod runner;
pub mod session;

pub use calendar::{generate_trading_dates, is_trading_day};
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use observer::{BacktestEvent, BacktestObserver, ChannelObserver, NoopObserver};
pub use performance::PerformanceStats;
pub use runner::{
    run_backtest, BacktestError, BacktestOutcome, BacktestRequest, BacktestRunner, RunHandle,
    RunnerState, ValidationPolicy,
};
pub use session::{
    load_session, save_session, session_file_name, BacktestSession, DailyBacktestResult,
    ModelSummary, SessionError, SessionStatus, SCHEMA_VERSION,
};
