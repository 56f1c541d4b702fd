//! Simulation engine: the day-by-day driver and its record types.

pub mod loop_runner;
pub mod state;

pub use loop_runner::{run_simulation, simulate_series, SimulationError};
pub use state::{DailyValuation, SimulationConfig, SimulationResult, TradeRecord};
