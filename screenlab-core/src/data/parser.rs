//! Flat-file bar parser.
//!
//! One file per symbol, one CSV row per bar:
//! `TICKER,PER,DATE,TIME,OPEN,HIGH,LOW,CLOSE,VOL,OPENINT`
//! with `DATE` as `YYYYMMDD`. An optional `<TICKER>,<PER>,...` header line is
//! skipped. `OPENINT` may be missing.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};

use super::DataError;
use crate::domain::Bar;

/// Which rows of a file to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadWindow {
    /// Every row.
    #[default]
    All,
    /// Only the most recent `n` rows.
    LastBars(usize),
    /// Rows with `from <= date <= to`.
    Range { from: NaiveDate, to: NaiveDate },
}

/// Read and parse one symbol file.
pub fn parse_bar_file(path: &Path, window: LoadWindow) -> Result<Vec<Bar>, DataError> {
    let content = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = parse_bars(&content, window).map_err(|e| e.with_path(path))?;
    if bars.is_empty() && window == LoadWindow::All {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(bars)
}

/// Parse file content into ascending, date-unique bars restricted to `window`.
///
/// Rows are expected in date order. Out-of-order input is detected and
/// re-parsed in full before truncation, so a `LastBars` window is always the
/// true tail of the series.
pub fn parse_bars(content: &str, window: LoadWindow) -> Result<Vec<Bar>, DataError> {
    let parsed = parse_rows(content, window)?;
    if parsed.ordered {
        return Ok(parsed.bars);
    }

    let mut bars = match window {
        LoadWindow::LastBars(_) => parse_rows(content, LoadWindow::All)?.bars,
        _ => parsed.bars,
    };
    bars.sort_by_key(|b| b.date);
    let before = bars.len();
    bars.dedup_by_key(|b| b.date);
    if bars.len() != before {
        tracing::warn!(dropped = before - bars.len(), "duplicate bar dates dropped");
    }
    if let LoadWindow::LastBars(n) = window {
        let excess = bars.len().saturating_sub(n);
        bars.drain(..excess);
    }
    Ok(bars)
}

struct ParsedRows {
    bars: Vec<Bar>,
    /// Dates were strictly increasing across every row read.
    ordered: bool,
}

fn parse_rows(content: &str, window: LoadWindow) -> Result<ParsedRows, DataError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let mut ring: VecDeque<Bar> = match window {
        LoadWindow::LastBars(n) => VecDeque::with_capacity(n.min(4096)),
        _ => VecDeque::new(),
    };
    let mut last_date: Option<NaiveDate> = None;
    let mut ordered = true;
    let mut malformed = 0usize;

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record = record.map_err(|e| DataError::parse(line, e.to_string()))?;
        if is_header_or_blank(&record) {
            continue;
        }
        let bar = parse_record(&record, line)?;
        if !bar.is_sane() {
            malformed += 1;
        }

        if let Some(prev) = last_date {
            if bar.date <= prev {
                ordered = false;
            }
        }
        last_date = Some(bar.date);

        match window {
            LoadWindow::All => ring.push_back(bar),
            LoadWindow::LastBars(n) => {
                if n == 0 {
                    continue;
                }
                if ring.len() == n {
                    ring.pop_front();
                }
                ring.push_back(bar);
            }
            LoadWindow::Range { from, to } => {
                if bar.date >= from && bar.date <= to {
                    ring.push_back(bar);
                }
            }
        }
    }

    if malformed > 0 {
        tracing::debug!(malformed, "rows with inconsistent OHLC values kept as-is");
    }
    Ok(ParsedRows {
        bars: ring.into(),
        ordered,
    })
}

fn is_header_or_blank(record: &StringRecord) -> bool {
    match record.get(0) {
        None => true,
        Some(first) => (first.is_empty() && record.len() == 1) || first.starts_with('<'),
    }
}

fn parse_record(record: &StringRecord, line: usize) -> Result<Bar, DataError> {
    if record.len() < 9 {
        return Err(DataError::parse(
            line,
            format!("expected at least 9 fields, found {}", record.len()),
        ));
    }

    let field = |i: usize| record.get(i).unwrap_or("");
    let number = |i: usize, name: &str| -> Result<f64, DataError> {
        field(i)
            .parse::<f64>()
            .map_err(|e| DataError::parse(line, format!("invalid {name} '{}': {e}", field(i))))
    };

    let date = NaiveDate::parse_from_str(field(2), "%Y%m%d")
        .map_err(|e| DataError::parse(line, format!("invalid date '{}': {e}", field(2))))?;

    let open_interest = match record.get(9) {
        Some(v) if !v.is_empty() => number(9, "open interest")?,
        _ => 0.0,
    };

    Ok(Bar {
        date,
        open: number(4, "open")?,
        high: number(5, "high")?,
        low: number(6, "low")?,
        close: number(7, "close")?,
        volume: number(8, "volume")?,
        open_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
<TICKER>,<PER>,<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>,<OPENINT>
AAPL.US,D,20240102,000000,187.15,188.44,183.885,185.64,82488674.2,0
AAPL.US,D,20240103,000000,184.22,185.88,183.43,184.25,58414460.1,0
AAPL.US,D,20240104,000000,182.15,183.0872,180.88,181.91,71983570.3,0
AAPL.US,D,20240105,000000,181.99,182.76,180.17,181.18,62303315.7,0
";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_all_rows_and_skips_header() {
        let bars = parse_bars(SAMPLE, LoadWindow::All).unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].date, d(2024, 1, 2));
        assert_eq!(bars[0].open, 187.15);
        assert_eq!(bars[3].close, 181.18);
        assert_eq!(bars[1].volume, 58414460.1);
    }

    #[test]
    fn last_bars_keeps_tail() {
        let bars = parse_bars(SAMPLE, LoadWindow::LastBars(2)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(2024, 1, 4));
        assert_eq!(bars[1].date, d(2024, 1, 5));
    }

    #[test]
    fn range_window_is_inclusive() {
        let bars = parse_bars(
            SAMPLE,
            LoadWindow::Range {
                from: d(2024, 1, 3),
                to: d(2024, 1, 4),
            },
        )
        .unwrap();
        let dates: Vec<_> = bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 3), d(2024, 1, 4)]);
    }

    #[test]
    fn missing_open_interest_defaults_to_zero() {
        let bars = parse_bars("X.US,D,20240102,000000,1,2,0.5,1.5,100", LoadWindow::All).unwrap();
        assert_eq!(bars[0].open_interest, 0.0);
    }

    #[test]
    fn unordered_rows_are_sorted_and_deduplicated() {
        let content = "\
X.US,D,20240104,000000,3,3,3,3,10,0
X.US,D,20240102,000000,1,1,1,1,10,0
X.US,D,20240103,000000,2,2,2,2,10,0
X.US,D,20240103,000000,9,9,9,9,10,0
";
        let bars = parse_bars(content, LoadWindow::All).unwrap();
        let closes: Vec<_> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn unordered_rows_with_tail_window_take_true_tail() {
        let content = "\
X.US,D,20240105,000000,5,5,5,5,10,0
X.US,D,20240102,000000,2,2,2,2,10,0
X.US,D,20240103,000000,3,3,3,3,10,0
";
        let bars = parse_bars(content, LoadWindow::LastBars(1)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, d(2024, 1, 5));
    }

    #[test]
    fn bad_number_reports_line() {
        let content = "X.US,D,20240102,000000,1,2,0.5,abc,100,0";
        match parse_bars(content, LoadWindow::All) {
            Err(DataError::Parse { line, reason, .. }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("close"), "{reason}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn short_row_is_rejected() {
        assert!(parse_bars("X.US,D,20240102", LoadWindow::All).is_err());
    }

    #[test]
    fn bad_date_is_rejected() {
        let content = "X.US,D,2024-01-02,000000,1,2,0.5,1.5,100,0";
        assert!(parse_bars(content, LoadWindow::All).is_err());
    }
}
