//! Trading calendar: the dates a backtest simulates.
//!
//! A trading date is any weekday. Exchange holidays are not modelled; a
//! holiday simply produces a slice identical to the previous session.

use chrono::{Datelike, NaiveDate, Weekday};

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekdays from `start` to `end`, both inclusive, ascending.
///
/// Empty when `end < start`.
pub fn generate_trading_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_trading_day(*d))
        .collect()
}
