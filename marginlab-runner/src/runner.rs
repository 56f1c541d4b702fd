//! Backtest runner: wires together data loading, the simulation driver, and statistics.
//!
//! Two entry points:
//! - `run_backtest()`: loads or generates data per the config, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes pre-loaded data. No I/O.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use marginlab_core::data::filter_date_window;
use marginlab_core::engine::{run_simulation, DailyValuation, SimulationError, TradeRecord};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{compute_dataset_hash, load_data, LoadError, LoadedData};
use crate::metrics::{drawdown_series, PerformanceStats};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
    #[error("no trading days between {start:?} and {end:?}")]
    EmptyWindow {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy: String,
    pub config: BacktestConfig,
    pub stats: PerformanceStats,
    pub valuations: Vec<DailyValuation>,
    /// `valuation / running_high - 1` for each day in `valuations`.
    pub drawdowns: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub start_date: String,
    pub end_date: String,
    pub day_count: usize,
    /// BLAKE3 over the simulated days only.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run a single backtest from a validated config.
pub fn run_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let loaded = load_data(&config.data, config.backtest.start_date)?;
    run_backtest_from_data(config, loaded)
}

/// Run a backtest with pre-loaded data - no I/O.
///
/// The config's date window is applied here, so the same loaded series can
/// back several runs over different windows.
pub fn run_backtest_from_data(config: &BacktestConfig, loaded: LoadedData) -> Result<BacktestResult, RunError> {
    let (start, end) = (config.backtest.start_date, config.backtest.end_date);
    let days = filter_date_window(loaded.days, start, end);
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        return Err(RunError::EmptyWindow { start, end });
    };
    let (start_date, end_date) = (first.date.to_string(), last.date.to_string());
    let dataset_hash = compute_dataset_hash(&days);

    let mut strategy = config.strategy.build();
    info!(
        strategy = strategy.name(),
        days = days.len(),
        start = %start_date,
        end = %end_date,
        "running backtest"
    );

    let sim = run_simulation(&config.simulation_config(), strategy.as_mut(), &days)?;
    let stats = PerformanceStats::compute(&sim);
    let drawdowns = drawdown_series(&sim.valuations);

    info!(
        final_valuation = stats.final_valuation,
        total_return = stats.total_return,
        max_drawdown = stats.max_drawdown,
        trades = stats.trade_count,
        losscuts = stats.losscut_count,
        margin_calls = stats.margin_call_count,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        strategy: sim.strategy,
        config: config.clone(),
        stats,
        valuations: sim.valuations,
        drawdowns,
        trades: sim.trades,
        start_date,
        end_date,
        day_count: days.len(),
        dataset_hash,
        has_synthetic: loaded.synthetic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;

    #[test]
    fn synthetic_run_produces_one_valuation_per_day() {
        let config = BacktestConfig::synthetic(42, 120);
        let result = run_backtest(&config).unwrap();
        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.day_count, 120);
        assert_eq!(result.valuations.len(), 120);
        assert_eq!(result.drawdowns.len(), 120);
        assert!(result.has_synthetic);
        assert_eq!(result.strategy, "leverage_ratio");
        assert_eq!(result.dataset_hash.len(), 64);
    }

    #[test]
    fn both_strategies_run() {
        for name in ["losscut_value", "leverage_ratio"] {
            let mut config = BacktestConfig::synthetic(3, 200);
            config.strategy = StrategyConfig::from_name(name).unwrap();
            let result = run_backtest(&config).unwrap();
            assert_eq!(result.strategy, name);
            assert!(result.stats.final_valuation.is_finite());
        }
    }

    #[test]
    fn date_window_is_inclusive() {
        let mut config = BacktestConfig::synthetic(5, 60);
        config.backtest.start_date = NaiveDate::from_ymd_opt(2020, 1, 2);
        let all = run_backtest(&config).unwrap();

        config.backtest.end_date = NaiveDate::from_ymd_opt(2020, 1, 10);
        let windowed = run_backtest(&config).unwrap();
        assert_eq!(windowed.start_date, "2020-01-02");
        assert_eq!(windowed.end_date, "2020-01-10");
        // Jan 2, 3, 6, 7, 8, 9, 10
        assert_eq!(windowed.day_count, 7);
        assert_ne!(windowed.dataset_hash, all.dataset_hash);
    }

    #[test]
    fn empty_window_is_an_error() {
        let mut config = BacktestConfig::synthetic(5, 10);
        let loaded = load_data(&config.data, NaiveDate::from_ymd_opt(2020, 1, 2)).unwrap();
        config.backtest.start_date = NaiveDate::from_ymd_opt(2030, 1, 1);
        config.backtest.end_date = NaiveDate::from_ymd_opt(2030, 2, 1);
        assert!(matches!(
            run_backtest_from_data(&config, loaded),
            Err(RunError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn runs_are_deterministic() {
        let config = BacktestConfig::synthetic(11, 150);
        let a = run_backtest(&config).unwrap();
        let b = run_backtest(&config).unwrap();
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.trades, b.trades);
    }
}
