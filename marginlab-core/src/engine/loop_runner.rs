//! Day-by-day driver: the heart of the simulation.
//!
//! Per trading day, in order:
//! 1. Periodic deposit (every `deposit_interval_days`, starting on day 0)
//! 2. Strategy rebalances at the index open
//! 3. Losscuts triggered by the index low
//! 4. Margin call checked at the index low
//! 5. Mark-to-market at the index close; settlements stamped with the date

use crate::data::{align_series, AlignError, DayPrices};
use crate::domain::{Account, AccountError, DailyBar};
use crate::strategy::Strategy;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use super::state::{DailyValuation, SimulationConfig, SimulationResult, TradeRecord};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Align(#[from] AlignError),

    #[error("deposit interval must be at least one day")]
    ZeroDepositInterval,

    #[error("account invariant violated on {date}: {source}")]
    Account {
        date: NaiveDate,
        #[source]
        source: AccountError,
    },
}

/// Align the two series, then simulate.
pub fn simulate_series(
    config: &SimulationConfig,
    strategy: &mut dyn Strategy,
    index: &[DailyBar],
    volatility: &[DailyBar],
) -> Result<SimulationResult, SimulationError> {
    let days = align_series(index, volatility)?;
    run_simulation(config, strategy, &days)
}

/// Run `strategy` over aligned days on a fresh account.
pub fn run_simulation(
    config: &SimulationConfig,
    strategy: &mut dyn Strategy,
    days: &[DayPrices],
) -> Result<SimulationResult, SimulationError> {
    if config.deposit_interval_days == 0 {
        return Err(SimulationError::ZeroDepositInterval);
    }

    let mut account = Account::with_spread(config.spread);
    account.deposit(config.initial_deposit);
    let mut total_deposit = config.initial_deposit;

    let mut valuations = Vec::with_capacity(days.len());
    let mut trades = Vec::new();
    let mut losscut_events = 0;
    let mut margin_calls = 0;

    for (i, day) in days.iter().enumerate() {
        let at = |source: AccountError| SimulationError::Account { date: day.date, source };

        if i % config.deposit_interval_days == 0 {
            account.deposit(config.periodic_deposit);
            total_deposit += config.periodic_deposit;
        }

        strategy
            .prepare_day(&mut account, day.index.open, day.volatility.open)
            .map_err(at)?;

        losscut_events += account.exec_losscut(day.index.low);
        if account.exec_margin_call(day.index.low) {
            margin_calls += 1;
        }

        let valuation = DailyValuation {
            date: day.date,
            valuation: account.valuation(day.index.close),
            unbound_cash: account.unbound_cash(),
            position_count: account.positions().len(),
            required_margin: account.positions().required_margin(),
        };
        trades.extend(
            account
                .take_settlements()
                .iter()
                .map(|s| TradeRecord::from_settlement(day.date, s)),
        );

        debug!(
            date = %day.date,
            valuation = valuation.valuation,
            positions = valuation.position_count,
            "day done"
        );
        valuations.push(valuation);
    }

    Ok(SimulationResult {
        strategy: strategy.name().to_string(),
        initial_deposit: config.initial_deposit,
        total_deposit,
        valuations,
        trades,
        losscut_events,
        margin_calls,
    })
}
