//! Symbol discovery and parallel loading of per-symbol flat files.
//!
//! Layout: `<root>/<exchange>/**/<symbol>.txt`. The first directory level
//! under the root names the exchange; deeper nesting is walked recursively.
//! The symbol is the file stem, upper-cased (`aapl.us.txt` → `AAPL.US`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use chrono::NaiveDate;
use rayon::prelude::*;

use super::parser::{parse_bar_file, LoadWindow};
use super::DataError;
use crate::domain::{normalize_symbol, BarCache, BarSeries, Symbol};

/// Where a symbol's file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLocation {
    pub exchange: String,
    pub path: PathBuf,
}

/// A symbol that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub symbol: Symbol,
    pub error: DataError,
}

/// Outcome of a bulk load.
///
/// Every requested symbol has an entry in `cache`; failed symbols map to an
/// empty series and are listed in `failures`.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub cache: BarCache,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn requested(&self) -> usize {
        self.cache.len()
    }

    pub fn loaded(&self) -> usize {
        self.cache.len() - self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fraction of requested symbols that loaded, in [0, 1].
    pub fn coverage(&self) -> f64 {
        if self.cache.is_empty() {
            return 1.0;
        }
        self.loaded() as f64 / self.requested() as f64
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.symbol.as_str()).collect()
    }
}

/// Walk `root` and index every `*.txt` file by symbol.
///
/// `exchanges` filters the first directory level (case-insensitive); empty
/// means all. When a symbol appears under several exchanges the first one in
/// directory-name order wins.
pub fn scan_directory(
    root: &Path,
    exchanges: &[String],
) -> Result<BTreeMap<Symbol, SymbolLocation>, DataError> {
    if !root.is_dir() {
        return Err(DataError::InvalidRoot(root.to_path_buf()));
    }

    let mut exchange_dirs = read_dir_sorted(root)?
        .into_iter()
        .filter(|p| p.is_dir())
        .filter_map(|p| {
            let name = p.file_name()?.to_string_lossy().into_owned();
            Some((name, p))
        })
        .filter(|(name, _)| {
            exchanges.is_empty() || exchanges.iter().any(|e| e.eq_ignore_ascii_case(name))
        })
        .collect::<Vec<_>>();
    exchange_dirs.sort();

    let mut index: BTreeMap<Symbol, SymbolLocation> = BTreeMap::new();
    for (exchange, dir) in exchange_dirs {
        let mut files = Vec::new();
        collect_txt_files(&dir, &mut files)?;
        for path in files {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
                continue;
            };
            let symbol = normalize_symbol(&stem);
            if symbol.is_empty() {
                continue;
            }
            if let Some(existing) = index.get(&symbol) {
                tracing::debug!(
                    symbol = %symbol,
                    kept = %existing.path.display(),
                    ignored = %path.display(),
                    "duplicate symbol file"
                );
                continue;
            }
            index.insert(
                symbol,
                SymbolLocation {
                    exchange: exchange.clone(),
                    path,
                },
            );
        }
    }

    tracing::info!(root = %root.display(), symbols = index.len(), "symbol scan complete");
    Ok(index)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let io_err = |source| DataError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}

fn collect_txt_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DataError> {
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_txt_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Read-only access to a directory tree of per-symbol bar files.
///
/// The directory is scanned at most once; the symbol index is memoised for
/// the life of the store.
#[derive(Debug)]
pub struct BarStore {
    root: PathBuf,
    exchanges: Vec<String>,
    index: OnceLock<BTreeMap<Symbol, SymbolLocation>>,
}

impl BarStore {
    pub fn new(root: impl Into<PathBuf>, exchanges: Vec<String>) -> Self {
        Self {
            root: root.into(),
            exchanges,
            index: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index(&self) -> Result<&BTreeMap<Symbol, SymbolLocation>, DataError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let scanned = scan_directory(&self.root, &self.exchanges)?;
        Ok(self.index.get_or_init(|| scanned))
    }

    /// All available symbols, sorted.
    pub fn scan(&self) -> Result<Vec<Symbol>, DataError> {
        Ok(self.index()?.keys().cloned().collect())
    }

    /// Symbols found under one exchange directory.
    pub fn symbols_on(&self, exchange: &str) -> Result<Vec<Symbol>, DataError> {
        Ok(self
            .index()?
            .iter()
            .filter(|(_, loc)| loc.exchange.eq_ignore_ascii_case(exchange))
            .map(|(s, _)| s.clone())
            .collect())
    }

    pub fn contains(&self, symbol: &str) -> Result<bool, DataError> {
        Ok(self.index()?.contains_key(&normalize_symbol(symbol)))
    }

    /// File path for `symbol`.
    pub fn path_for(&self, symbol: &str) -> Result<PathBuf, DataError> {
        let symbol = normalize_symbol(symbol);
        self.index()?
            .get(&symbol)
            .map(|loc| loc.path.clone())
            .ok_or(DataError::SymbolNotFound { symbol })
    }

    /// Load a single symbol.
    pub fn load_symbol(&self, symbol: &str, window: LoadWindow) -> Result<BarSeries, DataError> {
        let path = self.path_for(symbol)?;
        parse_bar_file(&path, window).map(BarSeries::new)
    }

    /// Load many symbols in parallel.
    ///
    /// Fails only when the root cannot be scanned. Per-symbol failures become
    /// empty series plus an entry in [`LoadReport::failures`].
    pub fn load(&self, symbols: &[String], window: LoadWindow) -> Result<LoadReport, DataError> {
        self.index()?;

        let mut requested: Vec<Symbol> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        requested.sort();
        requested.dedup();

        let results: Vec<(Symbol, Result<BarSeries, DataError>)> = requested
            .into_par_iter()
            .map(|symbol| {
                let loaded = self.load_symbol(&symbol, window);
                (symbol, loaded)
            })
            .collect();

        let mut report = LoadReport::default();
        for (symbol, loaded) in results {
            match loaded {
                Ok(series) => {
                    report.cache.insert(symbol, series);
                }
                Err(error) => {
                    tracing::warn!(symbol = %symbol, error = %error, "symbol failed to load");
                    report.cache.insert(symbol.clone(), BarSeries::empty());
                    report.failures.push(LoadFailure { symbol, error });
                }
            }
        }

        tracing::info!(
            requested = report.requested(),
            loaded = report.loaded(),
            failed = report.failures.len(),
            "bar load complete"
        );
        Ok(report)
    }

    /// Load the most recent `min_bars` bars of each symbol.
    pub fn load_last_bars(
        &self,
        symbols: &[String],
        min_bars: usize,
    ) -> Result<LoadReport, DataError> {
        self.load(symbols, LoadWindow::LastBars(min_bars))
    }

    /// Load bars dated within `[from, to]` for each symbol.
    pub fn load_range(
        &self,
        symbols: &[String],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<LoadReport, DataError> {
        self.load(symbols, LoadWindow::Range { from, to })
    }

    /// Run [`BarStore::load`] on a background thread.
    pub fn load_async(
        self: &Arc<Self>,
        symbols: Vec<String>,
        window: LoadWindow,
    ) -> Result<JoinHandle<Result<LoadReport, DataError>>, DataError> {
        let store = Arc::clone(self);
        thread::Builder::new()
            .name("bar-loader".into())
            .spawn(move || store.load(&symbols, window))
            .map_err(|source| DataError::Io {
                path: self.root.clone(),
                source,
            })
    }
}

/// Wait for a [`BarStore::load_async`] handle.
pub fn join_load(
    handle: JoinHandle<Result<LoadReport, DataError>>,
) -> Result<LoadReport, DataError> {
    handle.join().map_err(|_| DataError::LoaderPanicked)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(root: &Path, rel: &str, rows: &[(&str, f64)]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut body = String::from("<TICKER>,<PER>,<DATE>,<TIME>,<OPEN>,<HIGH>,<LOW>,<CLOSE>,<VOL>,<OPENINT>\n");
        for (date, close) in rows {
            body.push_str(&format!(
                "X,D,{date},000000,{close},{},{},{close},1000,0\n",
                close + 1.0,
                close - 1.0
            ));
        }
        fs::write(path, body).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let rows = [("20240102", 10.0), ("20240103", 11.0), ("20240104", 12.0)];
        write_file(root, "nasdaq/stocks/1/aapl.us.txt", &rows);
        write_file(root, "nyse/stocks/ibm.us.txt", &rows);
        write_file(root, "nyse/etfs/spy.us.txt", &rows);
        fs::write(root.join("nyse/stocks/broken.us.txt"), "garbage\n").unwrap();
        fs::write(root.join("nyse/stocks/readme.md"), "ignored").unwrap();
        dir
    }

    #[test]
    fn scan_finds_sorted_symbols() {
        let dir = fixture();
        let root = dir.path();
        let store = BarStore::new(root, vec![]);
        assert_eq!(
            store.scan().unwrap(),
            vec!["AAPL.US", "BROKEN.US", "IBM.US", "SPY.US"]
        );
        assert_eq!(store.symbols_on("NASDAQ").unwrap(), vec!["AAPL.US"]);
    }

    #[test]
    fn exchange_filter_limits_scan() {
        let dir = fixture();
        let root = dir.path();
        let store = BarStore::new(root, vec!["nasdaq".into()]);
        assert_eq!(store.scan().unwrap(), vec!["AAPL.US"]);
        assert!(matches!(
            store.path_for("IBM.US"),
            Err(DataError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn scan_is_memoised() {
        let dir = fixture();
        let root = dir.path();
        let store = BarStore::new(root, vec![]);
        assert_eq!(store.scan().unwrap().len(), 4);
        write_file(root, "nyse/stocks/new.us.txt", &[("20240102", 1.0)]);
        assert_eq!(store.scan().unwrap().len(), 4);
    }

    #[test]
    fn missing_root_is_an_error() {
        let store = BarStore::new("/nonexistent/screenlab/root", vec![]);
        assert!(matches!(store.scan(), Err(DataError::InvalidRoot(_))));
    }

    #[test]
    fn load_reports_partial_failures() {
        let dir = fixture();
        let root = dir.path();
        let store = BarStore::new(root, vec![]);
        let symbols = vec!["aapl.us".into(), "BROKEN.US".into(), "NOPE.US".into()];
        let report = store.load(&symbols, LoadWindow::All).unwrap();

        assert_eq!(report.requested(), 3);
        assert_eq!(report.loaded(), 1);
        assert_eq!(report.cache["AAPL.US"].len(), 3);
        assert!(report.cache["BROKEN.US"].is_empty());
        assert!(report.cache["NOPE.US"].is_empty());
        assert_eq!(report.failed_symbols(), vec!["BROKEN.US", "NOPE.US"]);
        assert!((report.coverage() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn load_windows() {
        let dir = fixture();
        let root = dir.path();
        let store = BarStore::new(root, vec![]);
        let symbols = vec!["IBM.US".to_string()];

        let tail = store.load_last_bars(&symbols, 2).unwrap();
        assert_eq!(tail.cache["IBM.US"].len(), 2);
        assert_eq!(tail.cache["IBM.US"][0].close, 11.0);

        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let range = store.load_range(&symbols, d(2), d(3)).unwrap();
        assert_eq!(range.cache["IBM.US"].len(), 2);
        assert_eq!(range.cache["IBM.US"].last_date(), Some(d(3)));
    }

    #[test]
    fn load_async_matches_sync() {
        let dir = fixture();
        let root = dir.path();
        let store = Arc::new(BarStore::new(root, vec![]));
        let symbols = store.scan().unwrap();
        let handle = store.load_async(symbols.clone(), LoadWindow::All).unwrap();
        let async_report = join_load(handle).unwrap();
        let sync_report = store.load(&symbols, LoadWindow::All).unwrap();
        assert_eq!(async_report.cache, sync_report.cache);
        assert_eq!(async_report.failures.len(), 1);
    }
}
