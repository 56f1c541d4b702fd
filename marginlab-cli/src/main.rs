//! MarginLab CLI: run and validate margin-account backtests.
//!
//! Commands:
//! - `run` - execute a backtest from a TOML config file and/or command-line flags
//! - `validate` - parse and check a config file without running it

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use marginlab_runner::{
    run_backtest, save_artifacts, BacktestConfig, BacktestResult, BacktestSection, DataSection, StrategyConfig,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "marginlab",
    about = "MarginLab CLI - leveraged margin-account backtesting"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence when set).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file and/or flags.
    Run(RunArgs),
    /// Parse and validate a config file without running it.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Daily CSV for the traded index (date,open,high,low,close).
    #[arg(long)]
    index: Option<PathBuf>,

    /// Daily CSV for the volatility reference (same layout and dates).
    #[arg(long)]
    volatility: Option<PathBuf>,

    /// Generate synthetic series instead of reading CSV files.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Seed for synthetic data.
    #[arg(long)]
    seed: Option<u64>,

    /// Trading days of synthetic data.
    #[arg(long)]
    days: Option<usize>,

    /// Strategy: losscut_value or leverage_ratio.
    #[arg(long)]
    strategy: Option<String>,

    /// Initial deposit.
    #[arg(long)]
    initial: Option<f64>,

    /// Periodic deposit, paid every `--interval` trading days.
    #[arg(long)]
    income: Option<f64>,

    /// Trading days between periodic deposits.
    #[arg(long)]
    interval: Option<usize>,

    /// First day to simulate (YYYY-MM-DD, inclusive).
    #[arg(long)]
    start: Option<String>,

    /// Last day to simulate (YYYY-MM-DD, inclusive).
    #[arg(long)]
    end: Option<String>,

    /// Output directory for run artifacts.
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Skip writing artifacts.
    #[arg(long, default_value_t = false)]
    no_save: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run_backtest_cmd(args),
        Commands::Validate { config } => run_validate(config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_backtest_cmd(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let result = run_backtest(&config)?;

    print_summary(&result);

    if !args.no_save {
        let run_dir = save_artifacts(&result, &args.output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn run_validate(path: PathBuf) -> Result<()> {
    let config = BacktestConfig::from_file(&path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = %path.display(), "config is valid");
    println!("OK: {} ({})", path.display(), config.strategy.name());
    Ok(())
}

/// Start from the config file (or defaults) and apply flag overrides.
fn build_config(args: &RunArgs) -> Result<BacktestConfig> {
    let mut config = match &args.config {
        Some(path) => BacktestConfig::from_file(path)?,
        None => BacktestConfig {
            backtest: BacktestSection::default(),
            data: DataSection::default(),
            spread: Default::default(),
            strategy: StrategyConfig::default(),
        },
    };

    if args.synthetic && (args.index.is_some() || args.volatility.is_some()) {
        bail!("--synthetic cannot be combined with --index/--volatility");
    }
    if args.synthetic {
        config.data.synthetic = true;
    }
    if let Some(path) = &args.index {
        config.data.index_path = Some(path.clone());
        config.data.synthetic = false;
    }
    if let Some(path) = &args.volatility {
        config.data.volatility_path = Some(path.clone());
        config.data.synthetic = false;
    }
    if let Some(seed) = args.seed {
        config.data.seed = seed;
    }
    if let Some(days) = args.days {
        config.data.days = days;
    }

    if let Some(name) = &args.strategy {
        config.strategy = match StrategyConfig::from_name(name) {
            Some(s) => s,
            None => bail!("unknown strategy '{name}'. Valid: losscut_value, leverage_ratio"),
        };
    }
    if let Some(initial) = args.initial {
        config.backtest.initial_deposit = initial;
    }
    if let Some(income) = args.income {
        config.backtest.periodic_deposit = income;
    }
    if let Some(interval) = args.interval {
        config.backtest.deposit_interval_days = interval;
    }
    if let Some(start) = &args.start {
        config.backtest.start_date = Some(parse_date(start)?);
    }
    if let Some(end) = &args.end {
        config.backtest.end_date = Some(parse_date(end)?);
    }

    config.validate()?;
    Ok(config)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn print_summary(result: &BacktestResult) {
    let s = &result.stats;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Period:         {} to {}", result.start_date, result.end_date);
    println!("Days:           {}", result.day_count);
    println!("Deposits:       {:.2} (initial {:.2})", s.total_deposit, s.initial_deposit);
    println!();
    println!("--- Performance ---");
    println!("Final Value:    {:.2}", s.final_valuation);
    println!("Total Return:   {:.4}x", s.total_return);
    println!("CAGR:           {:.2}%", s.cagr * 100.0);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!(
        "Monthly:        mean {:.2}%  stdev {:.2}%  sharpe {:.3}",
        s.monthly.mean * 100.0,
        s.monthly.stdev * 100.0,
        s.monthly.sharpe
    );
    println!(
        "Yearly:         mean {:.2}%  stdev {:.2}%  sharpe {:.3}",
        s.yearly.mean * 100.0,
        s.yearly.stdev * 100.0,
        s.yearly.sharpe
    );
    println!("Closed:         {} (win rate {:.1}%)", s.trade_count, s.win_rate * 100.0);
    println!("Losscuts:       {}", s.losscut_count);
    println!("Margin Calls:   {}", s.margin_call_count);
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
