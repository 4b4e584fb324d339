//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_range_store::JsonRangeStore;
use crate::adapters::report::ranking_log::{format_params, format_summary};
use crate::adapters::report::FileReportAdapter;
use crate::domain::backtest::{run_backtest, BacktestWindow, Ledger, SizingConfig};
use crate::domain::config_validation::{
    parse_date, parse_optional, strategy_section, validate_backtest_config, validate_data_config,
    validate_optimizer_config, validate_strategy_config,
};
use crate::domain::error::TraderError;
use crate::domain::metrics::PerformanceReport;
use crate::domain::ohlcv::PriceBar;
use crate::domain::optimizer::evaluation::{BacktestEvaluator, Constraints};
use crate::domain::optimizer::{self, resolve_ranges, FailurePolicy, OptimizationReport, OptimizerConfig};
use crate::domain::params::{ParameterFields, StrategyParameters};
use crate::domain::signal::{evaluate_rules, RuleEvaluation};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::range_port::RangeStore;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "etftrader",
    about = "ETF trend-following backtester and parameter optimizer"
)]
pub struct Cli {
    /// Log at debug level (every executed trade)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the configured strategy on one symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Write ledger and signal tables here (implies file output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Search strategy parameters for one symbol
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// Overrides [optimizer] seed
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Show the data range available for a symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            symbol,
            output,
        } => run_backtest_command(&config, symbol.as_deref(), output.as_deref()),
        Command::Optimize {
            config,
            symbol,
            seed,
            output,
        } => run_optimize_command(&config, symbol.as_deref(), seed, output.as_deref()),
        Command::Validate { config, symbol } => run_validate(&config, symbol.as_deref()),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// `--symbol` wins over `[data] symbol`.
pub fn resolve_symbol(symbol_override: Option<&str>, config: &dyn ConfigPort) -> Result<String, TraderError> {
    symbol_override
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| config.get_string("data", "symbol"))
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })
}

pub fn build_data_port(config: &dyn ConfigPort) -> Result<CsvAdapter, TraderError> {
    let dir = config
        .get_string("data", "dir")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "data".into(),
            key: "dir".into(),
        })?;
    Ok(CsvAdapter::new(PathBuf::from(dir)))
}

fn to_count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

pub fn build_sizing_config(config: &dyn ConfigPort) -> SizingConfig {
    let defaults = SizingConfig::default();
    SizingConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        commission_rate: config.get_double("backtest", "commission_rate", defaults.commission_rate),
        max_allocation: config.get_double("backtest", "max_allocation", defaults.max_allocation),
        buy_increment: config.get_double("backtest", "buy_increment", defaults.buy_increment),
        sell_decrement: config.get_double("backtest", "sell_decrement", defaults.sell_decrement),
        lot_size: u64::try_from(config.get_int("backtest", "lot_size", defaults.lot_size as i64))
            .unwrap_or(0),
    }
}

pub fn build_window(config: &dyn ConfigPort) -> Result<BacktestWindow, TraderError> {
    Ok(BacktestWindow::new(
        parse_date(config, "backtest", "start_date")?,
        parse_date(config, "backtest", "end_date")?,
    ))
}

/// Strategy parameters for `symbol`: `[strategy.<SYMBOL>]`, then
/// `[strategy]`, then built-in defaults, key by key.
pub fn build_strategy_params(
    config: &dyn ConfigPort,
    symbol: Option<&str>,
) -> Result<StrategyParameters, TraderError> {
    let d = ParameterFields::default();
    let int = |key: &str, default: usize| {
        to_count(config.get_int(&strategy_section(config, symbol, key), key, default as i64))
    };
    let real = |key: &str, default: f64| {
        config.get_double(&strategy_section(config, symbol, key), key, default)
    };

    StrategyParameters::new(ParameterFields {
        short_window: int("short_window", d.short_window),
        long_window: int("long_window", d.long_window),
        volume_window: int("volume_window", d.volume_window),
        volume_surge_multiplier: real("volume_surge_multiplier", d.volume_surge_multiplier),
        volume_sell_multiplier: real("volume_sell_multiplier", d.volume_sell_multiplier),
        rsi_period: int("rsi_period", d.rsi_period),
        rsi_oversold: real("rsi_oversold", d.rsi_oversold),
        rsi_surge_multiplier: real("rsi_surge_multiplier", d.rsi_surge_multiplier),
        divergence_threshold: real("divergence_threshold", d.divergence_threshold),
    })
}

/// Optimizer settings from `[optimizer]`; commission, allocation cap and lot
/// size are shared with `[backtest]`.
pub fn build_optimizer_config(
    config: &dyn ConfigPort,
    seed_override: Option<u64>,
) -> Result<OptimizerConfig, TraderError> {
    let d = OptimizerConfig::default();
    let section = "optimizer";
    let backtest = build_sizing_config(config);

    let seed = match seed_override {
        Some(seed) => Some(seed),
        None => parse_optional::<u64>(config, section, "seed")?,
    };

    Ok(OptimizerConfig {
        phase1_samples: to_count(config.get_int(section, "phase1_samples", d.phase1_samples as i64)),
        phase2_samples: to_count(config.get_int(section, "phase2_samples", d.phase2_samples as i64)),
        top_k: to_count(config.get_int(section, "top_k", d.top_k as i64)),
        jitter_pct: config.get_double(section, "jitter_pct", d.jitter_pct),
        train_ratio: config.get_double(section, "train_ratio", d.train_ratio),
        validation_weight: config.get_double(section, "validation_weight", d.validation_weight),
        constraints: Constraints {
            max_train_drawdown: config.get_double(
                section,
                "max_train_drawdown",
                d.constraints.max_train_drawdown,
            ),
            min_train_trades: to_count(config.get_int(
                section,
                "min_train_trades",
                d.constraints.min_train_trades as i64,
            )),
        },
        min_bars: to_count(config.get_int(section, "min_bars", d.min_bars as i64)),
        seed,
        workers: parse_optional::<usize>(config, section, "workers")?,
        failure_policy: parse_optional::<FailurePolicy>(config, section, "failure_policy")?
            .unwrap_or_default(),
        sizing: SizingConfig {
            initial_capital: config.get_double(section, "initial_capital", d.sizing.initial_capital),
            buy_increment: config.get_double(section, "buy_increment", d.sizing.buy_increment),
            sell_decrement: config.get_double(section, "sell_decrement", d.sizing.sell_decrement),
            ..backtest
        },
    })
}

/// Everything produced by one backtest run.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub bars: Vec<PriceBar>,
    pub evaluation: RuleEvaluation,
    pub ledger: Ledger,
    pub performance: PerformanceReport,
}

/// data -> signals -> ledger -> metrics for one symbol.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    symbol: &str,
    params: &StrategyParameters,
    sizing: &SizingConfig,
    window: &BacktestWindow,
) -> Result<BacktestRun, TraderError> {
    let bars = data_port.fetch_bars(symbol)?;
    let evaluation = evaluate_rules(&bars, params)?;
    let ledger = run_backtest(&bars, &evaluation.signals, sizing, window)?;
    let performance = PerformanceReport::compute(&ledger);
    Ok(BacktestRun {
        bars,
        evaluation,
        ledger,
        performance,
    })
}

/// Resolve ranges and run the two-phase search for one symbol.
pub fn run_optimize_pipeline(
    data_port: &dyn DataPort,
    symbol: &str,
    config: &OptimizerConfig,
    range_store: Option<&dyn RangeStore>,
) -> Result<OptimizationReport, TraderError> {
    let bars = data_port.fetch_bars(symbol)?;
    let ranges = resolve_ranges(symbol, &bars, None, range_store)?;
    let evaluator = BacktestEvaluator::new(&bars, config.sizing);
    optimizer::optimize(&bars, &ranges, &evaluator, config)
}

fn output_dir(config: &dyn ConfigPort, output_override: Option<&Path>) -> PathBuf {
    output_override
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("backtest", "output_dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("pic"))
}

fn print_performance(symbol: &str, run: &BacktestRun) {
    let p = &run.performance;
    let (first, last) = match (run.ledger.states.first(), run.ledger.states.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return,
    };
    eprintln!("\n=== {symbol} Backtest ===");
    eprintln!("Period:           {first} to {last} ({} days)", p.num_days);
    eprintln!("Initial Capital:  {:.2}", p.initial_capital);
    eprintln!("Final Value:      {:.2}", p.final_value);
    eprintln!("Total Return:     {:.2}%", p.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", p.annualized_return * 100.0);
    eprintln!("Max Drawdown:     {:.2}%", p.max_drawdown * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", p.sharpe_ratio);
    eprintln!("Total Trades:     {}", p.trade_count);
    eprintln!("Win Rate:         {:.1}%", p.win_rate * 100.0);
    eprintln!("Commission Paid:  {:.2}", run.ledger.total_commission());
}

fn run_backtest_command(
    config_path: &Path,
    symbol_override: Option<&str>,
    output_override: Option<&Path>,
) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_data_config(&config, symbol_override)?;
    validate_backtest_config(&config)?;

    let symbol = resolve_symbol(symbol_override, &config)?;
    validate_strategy_config(&config, Some(&symbol))?;
    let params = build_strategy_params(&config, Some(&symbol))?;
    let sizing = build_sizing_config(&config);
    let window = build_window(&config)?;
    let data_port = build_data_port(&config)?;

    eprintln!("Running backtest for {symbol}");
    let run = run_backtest_pipeline(&data_port, &symbol, &params, &sizing, &window)?;
    print_performance(&symbol, &run);

    if output_override.is_some() || config.get_bool("backtest", "enable_file_output", false) {
        let reports = FileReportAdapter::new(output_dir(&config, output_override));
        reports.write_ledger(&symbol, &run.ledger)?;
        reports.write_signals(&symbol, &run.bars, &run.evaluation)?;
        eprintln!("\nTables written to: {}", reports.output_dir().display());
    }
    Ok(())
}

fn run_optimize_command(
    config_path: &Path,
    symbol_override: Option<&str>,
    seed: Option<u64>,
    output_override: Option<&Path>,
) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_data_config(&config, symbol_override)?;
    validate_backtest_config(&config)?;
    validate_optimizer_config(&config)?;

    let symbol = resolve_symbol(symbol_override, &config)?;
    let opt_config = build_optimizer_config(&config, seed)?;
    let data_port = build_data_port(&config)?;
    let store = config
        .get_string("optimizer", "ranges_cache")
        .map(|path| JsonRangeStore::new(PathBuf::from(path)));

    eprintln!(
        "Optimizing {symbol}: {} + {} samples, keeping top {}",
        opt_config.phase1_samples, opt_config.phase2_samples, opt_config.top_k
    );
    let report = run_optimize_pipeline(
        &data_port,
        &symbol,
        &opt_config,
        store.as_ref().map(|s| s as &dyn RangeStore),
    )?;

    let reports = FileReportAdapter::new(output_dir(&config, output_override));
    reports.write_rankings(&symbol, &report)?;

    if report.total_failed() > 0 {
        eprintln!(
            "warning: {} candidate evaluations failed and were discarded",
            report.total_failed()
        );
    }
    if report.top.is_empty() {
        eprintln!("\nno valid parameter combination found");
        return Ok(());
    }

    eprintln!("\n=== {symbol} Top {} ===", report.top.len().min(5));
    for (i, candidate) in report.top.iter().take(5).enumerate() {
        eprintln!("#{} score {:.4}", i + 1, candidate.score);
        eprintln!("  {}", format_params(candidate));
        eprintln!("  train:      {}", format_summary(&candidate.train));
        eprintln!("  validation: {}", format_summary(&candidate.validation));
    }
    eprintln!("\nRankings written to: {}", reports.output_dir().display());
    Ok(())
}

fn run_validate(config_path: &Path, symbol_override: Option<&str>) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    validate_data_config(&config, symbol_override)?;
    validate_backtest_config(&config)?;
    validate_optimizer_config(&config)?;

    let symbol = resolve_symbol(symbol_override, &config)?;
    validate_strategy_config(&config, Some(&symbol))?;
    let params = build_strategy_params(&config, Some(&symbol))?;
    build_sizing_config(&config).validate()?;
    build_optimizer_config(&config, None)?.validate()?;

    let p = params.fields();
    eprintln!("\nStrategy parameters for {symbol}:");
    eprintln!(
        "  windows:    short={} long={} volume={} rsi={}",
        p.short_window, p.long_window, p.volume_window, p.rsi_period
    );
    eprintln!(
        "  volume:     surge x{} sell x{}",
        p.volume_surge_multiplier, p.volume_sell_multiplier
    );
    eprintln!(
        "  rsi:        oversold {} surge x{}",
        p.rsi_oversold, p.rsi_surge_multiplier
    );
    eprintln!("  divergence: {}", p.divergence_threshold);
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_info(config_path: &Path, symbol_override: Option<&str>) -> Result<(), TraderError> {
    let config = load_config(config_path)?;
    let symbol = resolve_symbol(symbol_override, &config)?;
    let data_port = build_data_port(&config)?;

    match data_port.data_range(&symbol)? {
        Some((first, last, count)) => println!("{symbol}: {count} bars, {first} to {last}"),
        None => eprintln!("{symbol}: no data found"),
    }
    Ok(())
}
