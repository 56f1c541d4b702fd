//! Account: unbound cash plus an exclusively owned position ledger.
//!
//! Every public operation is one atomic transition on `(unbound_cash, ledger)`.
//! Capacity checks are advisory: an open that cannot be afforded is a no-op,
//! closing an empty ledger is a no-op. Only contradictions are errors:
//! an invalid risk parameter, or unbound cash going negative after an
//! operation whose capacity check passed.
//!
//! Batch rebalancing is order-sensitive:
//! - stop-loss changes walk up from the minimum entry price and free margin
//!   by closing from the maximum;
//! - leverage changes walk down from the maximum and free margin by closing
//!   from the minimum.
//!
//! Either way a position is never closed to pay for its own change while a
//! position on the far side of it is still open.

use super::ledger::PositionLedger;
use super::position::{Position, PositionError, PositionId, RiskParameter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that indicate a corrupted or misused account.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("invalid risk parameter: {0}")]
    InvalidRiskParameter(#[from] PositionError),

    #[error("unbound cash went negative ({cash}) during {operation}")]
    NegativeCash { cash: f64, operation: &'static str },
}

/// Bid/ask multipliers applied to reference prices.
///
/// Opening fills at `price * ask_factor`; valuation, closing and losscut
/// triggers use `price * bid_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spread {
    pub bid_factor: f64,
    pub ask_factor: f64,
}

impl Spread {
    pub fn new(bid_factor: f64, ask_factor: f64) -> Self {
        Self {
            bid_factor,
            ask_factor,
        }
    }

    /// Frictionless fills at the reference price.
    pub fn none() -> Self {
        Self::new(1.0, 1.0)
    }

    pub fn bid(&self, price: f64) -> f64 {
        price * self.bid_factor
    }

    pub fn ask(&self, price: f64) -> f64 {
        price * self.ask_factor
    }
}

impl Default for Spread {
    fn default() -> Self {
        Self::none()
    }
}

/// Why a position left the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicit close by the strategy.
    Close,
    /// Stop-loss / liquidation price reached.
    Losscut,
    /// Account valuation fell below required margin.
    MarginCall,
    /// Closed to free margin for a batch risk-parameter change.
    Rebalance,
}

/// Realized outcome of removing one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub position_id: PositionId,
    pub entry_price: f64,
    pub exit_price: f64,
    pub bound_margin: f64,
    /// Cash credited back to the account (`valuation(exit_price)`).
    pub proceeds: f64,
    pub reason: CloseReason,
}

impl Settlement {
    /// Realized profit relative to the margin that was bound.
    pub fn pnl(&self) -> f64 {
        self.proceeds - self.bound_margin
    }
}

/// Point-in-time view of the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub price: f64,
    pub valuation: f64,
    pub unbound_cash: f64,
    pub remaining: f64,
    pub position_count: usize,
    pub required_margin: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, Copy)]
enum End {
    Min,
    Max,
}

/// A leveraged trading account over a single price series.
#[derive(Debug, Clone, Default)]
pub struct Account {
    ledger: PositionLedger,
    unbound_cash: f64,
    spread: Spread,
    next_id: u64,
    journal: Vec<Settlement>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spread(spread: Spread) -> Self {
        Self {
            spread,
            ..Self::default()
        }
    }

    pub fn positions(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn unbound_cash(&self) -> f64 {
        self.unbound_cash
    }

    pub fn spread(&self) -> Spread {
        self.spread
    }

    pub fn deposit(&mut self, amount: f64) {
        self.unbound_cash += amount;
    }

    /// Available margin: unbound cash minus aggregate unrealized loss.
    ///
    /// Negative when the account is under-margined.
    pub fn remaining(&self, price: f64) -> f64 {
        self.unbound_cash - self.ledger.valuation_loss(self.spread.bid(price))
    }

    /// Unbound cash plus mark-to-market value of every position.
    pub fn valuation(&self, price: f64) -> f64 {
        self.unbound_cash + self.ledger.valuation(self.spread.bid(price))
    }

    pub fn snapshot(&self, price: f64) -> AccountSnapshot {
        AccountSnapshot {
            price,
            valuation: self.valuation(price),
            unbound_cash: self.unbound_cash,
            remaining: self.remaining(price),
            position_count: self.ledger.len(),
            required_margin: self.ledger.required_margin(),
            leverage: self.ledger.leverage(),
        }
    }

    /// Drain the settlements recorded since the last call.
    pub fn take_settlements(&mut self) -> Vec<Settlement> {
        std::mem::take(&mut self.journal)
    }

    // ── Opening ────────────────────────────────────────────────────────

    /// Whether one more unit at `price` fits in the remaining margin.
    pub fn can_open(&self, price: f64, risk: RiskParameter) -> bool {
        risk.bound_margin(self.spread.ask(price))
            .is_some_and(|margin| self.remaining(price) >= margin)
    }

    /// Open one unit if affordable. Returns whether a position was opened.
    pub fn open(&mut self, price: f64, risk: RiskParameter) -> Result<bool, AccountError> {
        let position = Position::new(PositionId(self.next_id), self.spread.ask(price), risk)?;
        if self.remaining(price) < position.bound_margin() {
            return Ok(false);
        }
        self.insert(position, "open")?;
        Ok(true)
    }

    /// Open units until the remaining margin cannot cover one more.
    pub fn full_open(&mut self, price: f64, risk: RiskParameter) -> Result<usize, AccountError> {
        let mut opened = 0;
        while self.open(price, risk)? {
            opened += 1;
        }
        Ok(opened)
    }

    pub fn full_open_with_leverage(&mut self, price: f64, leverage: f64) -> Result<usize, AccountError> {
        self.full_open(price, RiskParameter::Leverage(leverage))
    }

    /// Capacity check with the sub-1x rule: below 1x leverage only that
    /// fraction of the (non-negative) remaining margin may be committed.
    pub fn can_open_with_leverage2(&self, price: f64, leverage: f64) -> bool {
        RiskParameter::Leverage(leverage)
            .bound_margin(self.spread.ask(price))
            .is_some_and(|margin| self.scaled_remaining(price, leverage) >= margin)
    }

    /// `full_open_with_leverage` under the sub-1x rule. Leverage ≤ 0 opens nothing.
    pub fn full_open_with_leverage2(&mut self, price: f64, leverage: f64) -> Result<usize, AccountError> {
        let mut opened = 0;
        while self.can_open_with_leverage2(price, leverage) {
            let entry = self.spread.ask(price);
            let position = Position::with_leverage(PositionId(self.next_id), entry, leverage)?;
            self.insert(position, "full_open_with_leverage2")?;
            opened += 1;
        }
        Ok(opened)
    }

    fn insert(&mut self, position: Position, operation: &'static str) -> Result<(), AccountError> {
        self.next_id += 1;
        self.unbound_cash -= position.bound_margin();
        self.ledger.add(position);
        self.ensure_solvent(operation)
    }

    // ── Closing ────────────────────────────────────────────────────────

    /// Close the highest-entry position at `price`.
    pub fn close_max(&mut self, price: f64) -> Option<Settlement> {
        self.close_end(End::Max, price, CloseReason::Close)
    }

    /// Close the lowest-entry position at `price`.
    pub fn close_min(&mut self, price: f64) -> Option<Settlement> {
        self.close_end(End::Min, price, CloseReason::Close)
    }

    /// Close everything, highest entry first. Returns the number closed.
    pub fn close_all(&mut self, price: f64) -> usize {
        self.close_all_with(price, CloseReason::Close)
    }

    /// Close highest-entry positions until at most `target` remain.
    pub fn trim_to(&mut self, price: f64, target: usize) -> usize {
        let mut closed = 0;
        while self.ledger.len() > target && self.close_max(price).is_some() {
            closed += 1;
        }
        closed
    }

    fn close_all_with(&mut self, price: f64, reason: CloseReason) -> usize {
        let mut closed = 0;
        while self.close_end(End::Max, price, reason).is_some() {
            closed += 1;
        }
        closed
    }

    fn close_end(&mut self, end: End, price: f64, reason: CloseReason) -> Option<Settlement> {
        let position = match end {
            End::Min => self.ledger.remove_min(),
            End::Max => self.ledger.remove_max(),
        }?;
        let exit_price = self.spread.bid(price);
        Some(self.settle(position, exit_price, reason))
    }

    fn settle(&mut self, position: Position, exit_price: f64, reason: CloseReason) -> Settlement {
        let proceeds = position.valuation(exit_price);
        self.unbound_cash += proceeds;
        let settlement = Settlement {
            position_id: position.id(),
            entry_price: position.entry_price(),
            exit_price,
            bound_margin: position.bound_margin(),
            proceeds,
            reason,
        };
        self.journal.push(settlement.clone());
        settlement
    }

    // ── Forced liquidation ─────────────────────────────────────────────

    /// Liquidate positions whose losscut value is at or above `low`.
    ///
    /// Scans down from the highest entry and stops at the first position that
    /// is not triggered. Triggered positions settle at their own losscut value.
    /// The early exit assumes losscut values are ordered like entry prices,
    /// which holds whenever all positions share one risk parameter.
    pub fn exec_losscut(&mut self, low: f64) -> usize {
        let trigger = self.spread.bid(low);
        let mut closed = 0;
        while let Some(losscut_value) = self.ledger.max().map(Position::losscut_value) {
            if losscut_value < trigger {
                break;
            }
            let Some(position) = self.ledger.remove_max() else {
                break;
            };
            let settlement = self.settle(position, losscut_value, CloseReason::Losscut);
            info!(
                position = %settlement.position_id,
                entry_price = settlement.entry_price,
                losscut_value,
                proceeds = settlement.proceeds,
                "losscut executed"
            );
            closed += 1;
        }
        closed
    }

    /// Close everything if valuation at `low` is below the required margin.
    ///
    /// Returns whether the margin call fired.
    pub fn exec_margin_call(&mut self, low: f64) -> bool {
        let required = self.ledger.required_margin();
        let valuation = self.valuation(low);
        if valuation >= required {
            return false;
        }
        let closed = self.close_all_with(low, CloseReason::MarginCall);
        info!(low, valuation, required, closed, "margin call executed");
        true
    }

    // ── Batch risk-parameter changes ───────────────────────────────────

    /// Move every position to stop-loss `losscut_value`.
    ///
    /// Positions are updated from the minimum entry price upward. When the
    /// remaining margin cannot cover a position's additional margin, the
    /// highest-entry positions are closed until it can; if that reaches the
    /// position being updated, processing stops.
    pub fn set_losscut_value_with_close(&mut self, price: f64, losscut_value: f64) -> Result<(), AccountError> {
        let risk = RiskParameter::StopLoss(losscut_value);
        let mut n = 0;
        while let Some(position) = self.ledger.nth_from_min(n) {
            let additional = position.additional_margin_to(risk)?;
            while self.remaining(price) < additional {
                self.close_end(End::Max, price, CloseReason::Rebalance);
                if self.ledger.len() <= n {
                    debug!(losscut_value, updated = n, "rebalance closed the position being updated");
                    return Ok(());
                }
            }
            let Some(position) = self.ledger.nth_from_min_mut(n) else {
                break;
            };
            let delta = position.set_risk_parameter(risk)?;
            self.unbound_cash -= delta;
            self.ensure_solvent("set_losscut_value_with_close")?;
            n += 1;
        }
        Ok(())
    }

    /// Move every position to `leverage`.
    ///
    /// Mirror image of [`set_losscut_value_with_close`](Self::set_losscut_value_with_close):
    /// positions are updated from the maximum entry price downward and margin
    /// is freed by closing the lowest-entry positions, which at constant
    /// leverage free the most margin per close.
    pub fn set_leverage_with_close(&mut self, price: f64, leverage: f64) -> Result<(), AccountError> {
        self.rebalance_leverage(price, leverage, "set_leverage_with_close", |account, price, _| {
            account.remaining(price)
        })
    }

    /// `set_leverage_with_close` with position pre-trimming and the sub-1x rule.
    ///
    /// First closes lowest-entry positions until no more remain than
    /// `valuation * leverage / entry` units. Below 1x only that fraction of
    /// the non-negative remaining margin counts as available. Leverage ≤ 0
    /// means holding nothing.
    pub fn set_leverage_with_close2(&mut self, price: f64, leverage: f64) -> Result<(), AccountError> {
        if leverage.is_nan() || leverage <= 0.0 {
            while self.close_end(End::Min, price, CloseReason::Rebalance).is_some() {}
            return Ok(());
        }
        let affordable = (self.valuation(price) * leverage / self.spread.ask(price)).floor();
        let affordable = if affordable.is_finite() && affordable > 0.0 {
            affordable as usize
        } else {
            0
        };
        while self.ledger.len() > affordable {
            self.close_end(End::Min, price, CloseReason::Rebalance);
        }
        self.rebalance_leverage(price, leverage, "set_leverage_with_close2", |account, price, leverage| {
            account.scaled_remaining(price, leverage)
        })
    }

    fn rebalance_leverage(
        &mut self,
        price: f64,
        leverage: f64,
        operation: &'static str,
        available: impl Fn(&Self, f64, f64) -> f64,
    ) -> Result<(), AccountError> {
        let risk = RiskParameter::Leverage(leverage);
        let mut n = 0;
        while let Some(position) = self.ledger.nth_from_max(n) {
            let additional = position.additional_margin_to(risk)?;
            while available(&*self, price, leverage) < additional {
                self.close_end(End::Min, price, CloseReason::Rebalance);
                if self.ledger.len() <= n {
                    debug!(leverage, updated = n, "rebalance closed the position being updated");
                    return Ok(());
                }
            }
            let Some(position) = self.ledger.nth_from_max_mut(n) else {
                break;
            };
            let delta = position.set_risk_parameter(risk)?;
            self.unbound_cash -= delta;
            self.ensure_solvent(operation)?;
            n += 1;
        }
        Ok(())
    }

    fn scaled_remaining(&self, price: f64, leverage: f64) -> f64 {
        let remaining = self.remaining(price);
        if leverage < 1.0 {
            remaining.max(0.0) * leverage
        } else {
            remaining
        }
    }

    fn ensure_solvent(&self, operation: &'static str) -> Result<(), AccountError> {
        if self.unbound_cash < 0.0 {
            return Err(AccountError::NegativeCash {
                cash: self.unbound_cash,
                operation,
            });
        }
        Ok(())
    }
}
