//! Serializable backtest configuration, read from TOML.
//!
//! ```toml
//! [backtest]
//! initial_deposit = 3000.0
//! periodic_deposit = 0.0
//! deposit_interval_days = 21
//! start_date = "2020-01-02"   # optional, inclusive
//! end_date = "2020-08-24"     # optional, inclusive
//!
//! [data]
//! index_path = "data/SP500_daily.csv"
//! volatility_path = "data/VIX_daily.csv"
//! # or: synthetic = true, seed = 42, days = 756
//!
//! [spread]
//! bid_factor = 1.0
//! ask_factor = 1.0
//!
//! [strategy]
//! type = "LEVERAGE_RATIO"
//! formula = "volatility_regime"
//! max_leverage = 10.0
//! ```

use chrono::NaiveDate;
use marginlab_core::domain::Spread;
use marginlab_core::engine::SimulationConfig;
use marginlab_core::strategy::{
    LeverageRatioParams, LeverageRatioStrategy, LosscutValueParams, LosscutValueStrategy, Strategy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub spread: Spread,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_deposit: f64,
    pub periodic_deposit: f64,
    pub deposit_interval_days: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            initial_deposit: sim.initial_deposit,
            periodic_deposit: sim.periodic_deposit,
            deposit_interval_days: sim.deposit_interval_days,
            start_date: None,
            end_date: None,
        }
    }
}

/// Where the index and volatility series come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub index_path: Option<PathBuf>,
    pub volatility_path: Option<PathBuf>,
    /// Generate both series instead of reading files.
    pub synthetic: bool,
    pub seed: u64,
    /// Trading days to generate in synthetic mode.
    pub days: usize,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            index_path: None,
            volatility_path: None,
            synthetic: false,
            seed: 42,
            days: 756,
        }
    }
}

/// Strategy selection (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    /// One shared stop-loss price, recomputed daily.
    LosscutValue(LosscutValueParams),
    /// One shared leverage ratio, recomputed daily.
    LeverageRatio(LeverageRatioParams),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::LeverageRatio(LeverageRatioParams::default())
    }
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::LosscutValue(params) => Box::new(LosscutValueStrategy::new(params.clone())),
            StrategyConfig::LeverageRatio(params) => Box::new(LeverageRatioStrategy::new(params.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::LosscutValue(_) => "losscut_value",
            StrategyConfig::LeverageRatio(_) => "leverage_ratio",
        }
    }

    /// Parse a strategy name as accepted on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "losscut_value" | "losscut" => Some(StrategyConfig::LosscutValue(LosscutValueParams::default())),
            "leverage_ratio" | "leverage" => Some(StrategyConfig::LeverageRatio(LeverageRatioParams::default())),
            _ => None,
        }
    }
}

impl BacktestConfig {
    /// Read, parse and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Synthetic data with default settings.
    pub fn synthetic(seed: u64, days: usize) -> Self {
        Self {
            backtest: BacktestSection::default(),
            data: DataSection {
                synthetic: true,
                seed,
                days,
                ..DataSection::default()
            },
            spread: Spread::default(),
            strategy: StrategyConfig::default(),
        }
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            initial_deposit: self.backtest.initial_deposit,
            periodic_deposit: self.backtest.periodic_deposit,
            deposit_interval_days: self.backtest.deposit_interval_days,
            spread: self.spread,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        for (name, value) in [
            ("initial_deposit", b.initial_deposit),
            ("periodic_deposit", b.periodic_deposit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a finite non-negative amount, got {value}")));
            }
        }
        if b.deposit_interval_days == 0 {
            return Err(invalid("deposit_interval_days must be at least 1"));
        }
        if let (Some(start), Some(end)) = (b.start_date, b.end_date) {
            if start > end {
                return Err(invalid(format!("start_date {start} is after end_date {end}")));
            }
        }

        let s = &self.spread;
        if !(s.bid_factor.is_finite() && s.bid_factor > 0.0 && s.ask_factor.is_finite() && s.ask_factor > 0.0) {
            return Err(invalid("spread factors must be finite and positive"));
        }
        if s.bid_factor > s.ask_factor {
            return Err(invalid(format!(
                "bid_factor {} exceeds ask_factor {}",
                s.bid_factor, s.ask_factor
            )));
        }

        let d = &self.data;
        if d.synthetic {
            if d.days == 0 {
                return Err(invalid("synthetic data needs days >= 1"));
            }
        } else if d.index_path.is_none() || d.volatility_path.is_none() {
            return Err(invalid("data needs index_path and volatility_path, or synthetic = true"));
        }

        match &self.strategy {
            StrategyConfig::LosscutValue(p) => {
                check_windows(p.index_window, p.volatility_window)?;
                if !(p.min_margin_rate > 0.0 && p.min_margin_rate < 1.0) {
                    return Err(invalid(format!("min_margin_rate must be in (0, 1), got {}", p.min_margin_rate)));
                }
            }
            StrategyConfig::LeverageRatio(p) => {
                check_windows(p.index_window, p.volatility_window)?;
                if !p.max_leverage.is_finite() || p.max_leverage < 0.0 {
                    return Err(invalid(format!("max_leverage must be finite and >= 0, got {}", p.max_leverage)));
                }
            }
        }
        Ok(())
    }
}

fn check_windows(index_window: usize, volatility_window: usize) -> Result<(), ConfigError> {
    if index_window == 0 || volatility_window == 0 {
        return Err(invalid("indicator windows must be at least 1"));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
