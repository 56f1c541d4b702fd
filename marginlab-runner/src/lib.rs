//! MarginLab Runner: backtest orchestration, data loading, statistics, export.
//!
//! This crate builds on `marginlab-core` to provide:
//! - TOML configuration with validation
//! - Daily CSV loading with a seeded synthetic fallback for development
//! - Single-backtest runner with date windowing and dataset hashing
//! - Monthly/yearly performance statistics
//! - JSON, CSV, and Markdown artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use config::{BacktestConfig, BacktestSection, ConfigError, DataSection, StrategyConfig};
pub use data_loader::{load_data, read_daily_csv, LoadError, LoadedData};
pub use export::{
    export_json, export_trades_csv, export_valuations_csv, generate_report, import_json, load_artifacts,
    save_artifacts,
};
pub use metrics::{PerformanceStats, PeriodStats};
pub use runner::{run_backtest, run_backtest_from_data, BacktestResult, RunError, SCHEMA_VERSION};
