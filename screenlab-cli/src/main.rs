//! ScreenLab CLI — scan, screen, score, and backtest commands.
//!
//! Commands:
//! - `scan` — index the data root and report symbols per exchange
//! - `screen` — run one saved model against the latest (or an as-of) cache
//! - `score` — rank symbols under a scoring strategy
//! - `backtest` — replay models across a date range and save the session
//! - `models list|validate` — inspect saved screener models
//! - `strategies list` — inspect scoring strategies (seeding defaults)
//!
//! Settings come from `screenlab.toml` when present.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use screenlab_core::data::{BarStore, LoadReport, LoadWindow};
use screenlab_core::domain::{BarCache, Symbol};
use screenlab_core::model::{ModelManager, ScreenerModel};
use screenlab_core::scoring::{
    CalculatorRegistry, IndicatorCalculator, ScoreCalculator, ScoringStrategy, StrategyManager,
};
use screenlab_core::screener::ScreenerRegistry;
use screenlab_core::slicer::slice_upto;
use screenlab_runner::{
    run_backtest, save_session, session_file_name, BacktestObserver, BacktestRequest,
    BacktestSession, CancelToken, EngineConfig,
};

#[derive(Parser)]
#[command(
    name = "screenlab",
    about = "ScreenLab CLI — stock screening and screener backtesting"
)]
struct Cli {
    /// Engine config file.
    #[arg(long, global = true, default_value = "screenlab.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the data root and report symbol counts per exchange.
    Scan,
    /// Run a saved model against the most recent bars.
    Screen {
        /// Model name (case-insensitive).
        #[arg(long)]
        model: String,

        /// Screen as of this date (YYYY-MM-DD). Defaults to the latest bar.
        #[arg(long)]
        as_of: Option<String>,

        /// Restrict the universe to these symbols.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,
    },
    /// Score symbols under a scoring strategy.
    Score {
        /// Strategy name (case-insensitive).
        #[arg(long)]
        strategy: String,

        /// Symbols to score. Defaults to every symbol in the data root.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Number of rows to print.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Replay models across a date range.
    Backtest {
        /// First simulated date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Last simulated date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Model names. Defaults to every enabled model.
        #[arg(long = "model")]
        models: Vec<String>,

        /// Restrict the universe to these symbols.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Session file. Defaults to `<sessions_dir>/<start>_<end>_<id>.json`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Saved screener models.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Scoring strategies.
    Strategies {
        #[command(subcommand)]
        action: StrategiesAction,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    /// List models with their pipelines.
    List,
    /// Load and validate every model document.
    Validate,
}

#[derive(Subcommand)]
enum StrategiesAction {
    /// List strategies with indicator weights.
    List,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;

    match cli.command {
        Commands::Scan => run_scan(&config),
        Commands::Screen {
            model,
            as_of,
            symbols,
        } => run_screen(&config, &model, as_of.as_deref(), &symbols),
        Commands::Score {
            strategy,
            symbols,
            top,
        } => run_score(&config, &strategy, &symbols, top),
        Commands::Backtest {
            start,
            end,
            models,
            symbols,
            output,
        } => run_backtest_cmd(&config, &start, &end, &models, &symbols, output),
        Commands::Models { action } => match action {
            ModelsAction::List => run_models_list(&config),
            ModelsAction::Validate => run_models_validate(&config),
        },
        Commands::Strategies { action } => match action {
            StrategiesAction::List => run_strategies_list(&config),
        },
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn load_models(config: &EngineConfig) -> Result<ModelManager> {
    let mut manager = ModelManager::new(
        &config.paths.models_dir,
        Arc::new(ScreenerRegistry::builtin()),
    );
    manager
        .load_all()
        .with_context(|| format!("loading models from {}", config.paths.models_dir.display()))?;
    Ok(manager)
}

fn load_strategies(config: &EngineConfig) -> Result<StrategyManager> {
    let mut manager = StrategyManager::new(
        &config.paths.strategies_dir,
        Arc::new(CalculatorRegistry::builtin()),
    );
    manager.load_all().with_context(|| {
        format!(
            "loading strategies from {}",
            config.paths.strategies_dir.display()
        )
    })?;
    Ok(manager)
}

/// `requested` when given, every indexed symbol otherwise.
fn universe(store: &BarStore, requested: &[String]) -> Result<Vec<Symbol>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    store
        .scan()
        .with_context(|| format!("scanning {}", store.root().display()))
}

fn load_bars(store: &BarStore, symbols: &[Symbol], window: LoadWindow) -> Result<BarCache> {
    let report = store
        .load(symbols, window)
        .with_context(|| format!("loading bars from {}", store.root().display()))?;
    report_failures(&report);
    Ok(report
        .cache
        .into_iter()
        .filter(|(_, series)| !series.is_empty())
        .collect())
}

fn report_failures(report: &LoadReport) {
    if report.is_complete() {
        return;
    }
    eprintln!(
        "WARNING: {} of {} symbols failed to load ({:.1}% coverage)",
        report.failures.len(),
        report.requested(),
        report.coverage() * 100.0
    );
    for failure in report.failures.iter().take(10) {
        eprintln!("  {}: {}", failure.symbol, failure.error);
    }
}

fn run_scan(config: &EngineConfig) -> Result<()> {
    let store = config.bar_store();
    let symbols = store
        .scan()
        .with_context(|| format!("scanning {}", store.root().display()))?;

    let mut per_exchange: BTreeMap<String, usize> = BTreeMap::new();
    for symbol in &symbols {
        let exchange = symbol.rsplit_once('.').map_or("?", |(_, suffix)| suffix);
        *per_exchange.entry(exchange.to_string()).or_default() += 1;
    }

    println!("Data root: {}", store.root().display());
    println!("Symbols:   {}", symbols.len());
    println!();
    println!("{:<10} {:>8}", "Suffix", "Symbols");
    println!("{}", "-".repeat(19));
    for (exchange, count) in &per_exchange {
        println!("{exchange:<10} {count:>8}");
    }
    Ok(())
}

fn run_screen(
    config: &EngineConfig,
    model_name: &str,
    as_of: Option<&str>,
    requested: &[String],
) -> Result<()> {
    let manager = load_models(config)?;
    let model = manager
        .find_by_name(model_name)
        .with_context(|| format!("no model named '{model_name}'"))?;
    let compiled = model
        .compile(manager.registry())
        .with_context(|| format!("compiling model '{}'", model.name))?;

    let store = config.bar_store();
    let symbols = universe(&store, requested)?;
    let as_of = as_of.map(parse_date).transpose()?;

    let cache = match as_of {
        Some(date) => slice_upto(&load_bars(&store, &symbols, LoadWindow::All)?, date),
        None => load_bars(
            &store,
            &symbols,
            LoadWindow::LastBars(config.bars_to_load(compiled.min_bars_required())),
        )?,
    };
    let candidates: Vec<Symbol> = cache.keys().cloned().collect();
    let run = compiled.execute(&candidates, &cache);

    println!();
    println!("=== {} ===", model.name);
    if let Some(date) = as_of {
        println!("As of:      {date}");
    }
    println!("Universe:   {}", candidates.len());
    for (step, count) in compiled.step_names().zip(&run.step_counts) {
        println!("  {step:<20} {count:>6}");
    }
    println!("Matches:    {}", run.symbols.len());
    println!();
    for hit in &run.symbols {
        let details: Vec<String> = hit
            .metadata
            .iter()
            .map(|(k, v)| format!("{k}={v:.2}"))
            .collect();
        println!("{:<12} {}", hit.symbol, details.join(" "));
    }
    Ok(())
}

/// Bars needed by the strategy's most demanding indicator.
fn strategy_min_bars(registry: &CalculatorRegistry, strategy: &ScoringStrategy) -> Result<usize> {
    let mut required = 1;
    for config in strategy.enabled_indicators() {
        let (calculator, params) = registry
            .resolve(config)
            .with_context(|| format!("strategy '{}'", strategy.name))?;
        required = required.max(calculator.min_bars_required(&params));
    }
    Ok(required)
}

fn run_score(config: &EngineConfig, strategy_name: &str, requested: &[String], top: usize) -> Result<()> {
    let manager = load_strategies(config)?;
    let strategy = manager
        .find_by_name(strategy_name)
        .with_context(|| format!("no strategy named '{strategy_name}'"))?;

    let registry = Arc::new(CalculatorRegistry::builtin());
    let min_bars = strategy_min_bars(&registry, strategy)?;

    let store = config.bar_store();
    let symbols = universe(&store, requested)?;
    let cache = load_bars(&store, &symbols, LoadWindow::LastBars(config.bars_to_load(min_bars)))?;

    let results = ScoreCalculator::new(registry)
        .calculate_scores_for_symbols(&cache, strategy)
        .with_context(|| format!("scoring with '{}'", strategy.name))?;

    let failed = results.iter().filter(|r| r.is_error()).count();
    println!();
    println!("=== {} ===", strategy.name);
    println!("Scored:  {}", results.len() - failed);
    println!("Errors:  {failed}");
    println!();
    println!("{:<12} {:>8}  Breakdown", "Symbol", "Score");
    println!("{}", "-".repeat(60));
    for result in results.iter().filter(|r| !r.is_error()).take(top) {
        let breakdown: Vec<String> = result
            .breakdown
            .iter()
            .map(|b| format!("{}={:.0}", b.kind, b.score))
            .collect();
        println!(
            "{:<12} {:>8.1}  {}",
            result.symbol,
            result.total_score.unwrap_or_default(),
            breakdown.join(" ")
        );
    }
    Ok(())
}

/// Logs each simulated date as it starts.
struct ConsoleProgress;

impl BacktestObserver for ConsoleProgress {
    fn on_date_started(&self, index: usize, total: usize, date: NaiveDate) {
        tracing::info!(date = %date, "simulating {}/{}", index + 1, total);
    }
}

fn run_backtest_cmd(
    config: &EngineConfig,
    start: &str,
    end: &str,
    model_names: &[String],
    requested: &[String],
    output: Option<PathBuf>,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if end < start {
        bail!("--end {end} is before --start {start}");
    }

    let manager = load_models(config)?;
    let models: Vec<ScreenerModel> = if model_names.is_empty() {
        manager.enabled().into_iter().cloned().collect()
    } else {
        model_names
            .iter()
            .map(|name| {
                manager
                    .find_by_name(name)
                    .cloned()
                    .with_context(|| format!("no model named '{name}'"))
            })
            .collect::<Result<_>>()?
    };
    if models.is_empty() {
        bail!(
            "no enabled models in {}",
            config.paths.models_dir.display()
        );
    }

    let store = config.bar_store();
    let mut symbols = universe(&store, requested)?;
    let benchmark = config.benchmark();
    if let Some(benchmark) = &benchmark {
        if !symbols.contains(benchmark) && store.contains(benchmark).unwrap_or(false) {
            symbols.push(benchmark.clone());
        }
    }
    let master = Arc::new(load_bars(&store, &symbols, LoadWindow::All)?);

    let mut request = BacktestRequest::new(
        models,
        start,
        end,
        Arc::clone(&master),
        Arc::new(ScreenerRegistry::builtin()),
    )
    .with_policy(config.backtest.validation_policy);
    if !requested.is_empty() {
        request = request.with_universe(requested.to_vec());
    }
    if let Some(benchmark) = benchmark {
        request = request.with_benchmark(benchmark);
    }

    let outcome = run_backtest(&request, &CancelToken::new(), &ConsoleProgress)?;
    let cancelled = outcome.is_cancelled();
    let mut session = outcome.into_session();
    session.attach_performance(&master, config.backtest.holding_bars);

    print_summary(&session, cancelled);

    let path = match output {
        Some(path) => path,
        None => config.paths.sessions_dir.join(session_file_name(&session)),
    };
    save_session(&session, &path).with_context(|| format!("saving {}", path.display()))?;
    println!("Session saved to: {}", path.display());
    Ok(())
}

fn print_summary(session: &BacktestSession, cancelled: bool) {
    println!();
    println!("=== Backtest Session ===");
    println!("Session:   {}", session.id);
    println!("Period:    {} to {}", session.start_date, session.end_date);
    println!("Dates:     {}", session.dates().len());
    println!("Dataset:   {}", session.dataset_hash);
    if let Some(benchmark) = &session.benchmark_symbol {
        println!("Benchmark: {benchmark}");
    }
    println!();
    println!(
        "{:<24} {:>6} {:>8} {:>10} {:>9}",
        "Model", "Days", "Hits", "Hits/Day", "Win Rate"
    );
    println!("{}", "-".repeat(61));
    for summary in session.summary() {
        let win_rate = summary
            .mean_win_rate
            .map_or_else(|| "-".to_string(), |w| format!("{:.1}%", w * 100.0));
        println!(
            "{:<24} {:>6} {:>8} {:>10.1} {:>9}",
            summary.model_name, summary.days, summary.total_hits, summary.avg_hits_per_day, win_rate
        );
    }
    if cancelled {
        println!();
        println!("WARNING: run was cancelled; the session is partial");
    }
    println!();
}

fn run_models_list(config: &EngineConfig) -> Result<()> {
    let manager = load_models(config)?;
    let models = manager.models();
    if models.is_empty() {
        println!("No models in {}", config.paths.models_dir.display());
        return Ok(());
    }
    for model in models {
        let steps: Vec<&str> = model.steps.iter().map(|s| s.screener.as_str()).collect();
        let flag = if model.enabled { "" } else { " (disabled)" };
        println!("{}{flag}", model.name);
        println!("  {}", steps.join(" -> "));
    }
    Ok(())
}

fn run_models_validate(config: &EngineConfig) -> Result<()> {
    let manager = load_models(config)?;
    println!(
        "{} model(s) in {} are valid",
        manager.models().len(),
        config.paths.models_dir.display()
    );
    Ok(())
}

fn run_strategies_list(config: &EngineConfig) -> Result<()> {
    let manager = load_strategies(config)?;
    for strategy in manager.strategies() {
        let flag = if strategy.builtin { " (built-in)" } else { "" };
        println!("{}{flag}", strategy.name);
        for indicator in strategy.enabled_indicators() {
            println!("  {:<18} weight {:.2}", indicator.kind.as_str(), indicator.weight);
        }
    }
    Ok(())
}
