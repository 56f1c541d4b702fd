//! Strategies: daily rebalancing policies driven by index and volatility.
//!
//! A strategy sees the day's opening index level and volatility reading,
//! updates its trailing windows, and reshapes the account through the
//! account's batch operations. It never touches cash or positions directly.

pub mod leverage_ratio;
pub mod losscut_value;

pub use leverage_ratio::{LeverageFormula, LeverageRatioParams, LeverageRatioStrategy};
pub use losscut_value::{LosscutFormula, LosscutValueParams, LosscutValueStrategy};

use crate::domain::{Account, AccountError};

/// Daily position policy.
///
/// # Invariants
/// - `prepare_day()` is called exactly once per trading day, before the
///   account's losscut and margin-call checks for that day
/// - Any error returned is an invariant violation from the account, not a
///   capacity limit
pub trait Strategy: Send {
    /// Strategy name for manifest/logging
    fn name(&self) -> &str;

    /// Rebalance `account` at the day's opening `index` level.
    fn prepare_day(&mut self, account: &mut Account, index: f64, volatility: f64) -> Result<(), AccountError>;
}

/// Whether the account currently holds positions below their entry.
fn has_valuation_loss(account: &Account, index: f64) -> bool {
    account.positions().valuation_loss(account.spread().bid(index)) > 0.0
}
