//! Simulation configuration, daily records, and run result types.

use crate::domain::{CloseReason, PositionId, Settlement, Spread};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Configuration for a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Cash deposited before the first day.
    pub initial_deposit: f64,
    /// Cash deposited on every `deposit_interval_days`-th day, starting with day 0.
    pub periodic_deposit: f64,
    pub deposit_interval_days: usize,
    pub spread: Spread,
}

impl SimulationConfig {
    pub fn new(initial_deposit: f64) -> Self {
        Self {
            initial_deposit,
            ..Self::default()
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_deposit: 3000.0,
            periodic_deposit: 0.0,
            deposit_interval_days: 21,
            spread: Spread::none(),
        }
    }
}

/// End-of-day account state, marked at the index close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyValuation {
    pub date: NaiveDate,
    pub valuation: f64,
    pub unbound_cash: f64,
    pub position_count: usize,
    pub required_margin: f64,
}

/// A settlement stamped with the day it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub position_id: PositionId,
    pub entry_price: f64,
    pub exit_price: f64,
    pub bound_margin: f64,
    pub proceeds: f64,
    pub pnl: f64,
    pub reason: CloseReason,
}

impl TradeRecord {
    pub fn from_settlement(date: NaiveDate, settlement: &Settlement) -> Self {
        Self {
            date,
            position_id: settlement.position_id,
            entry_price: settlement.entry_price,
            exit_price: settlement.exit_price,
            bound_margin: settlement.bound_margin,
            proceeds: settlement.proceeds,
            pnl: settlement.pnl(),
            reason: settlement.reason,
        }
    }
}

/// Result of a completed simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub strategy: String,
    pub initial_deposit: f64,
    /// Initial deposit plus every periodic deposit made.
    pub total_deposit: f64,
    pub valuations: Vec<DailyValuation>,
    pub trades: Vec<TradeRecord>,
    /// Positions force-closed at their losscut value.
    pub losscut_events: usize,
    /// Days on which a margin call liquidated the account.
    pub margin_calls: usize,
}

impl SimulationResult {
    /// Valuation at the last simulated close, or the total deposit for an empty run.
    pub fn final_valuation(&self) -> f64 {
        self.valuations
            .last()
            .map_or(self.total_deposit, |v| v.valuation)
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}
