//! Stop-loss strategy: every position shares one losscut value, recomputed
//! each day from the trailing index average and the volatility regime.

use super::{has_valuation_loss, Strategy};
use crate::domain::{Account, AccountError, RiskParameter};
use crate::indicators::TrailingWindow;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the daily target stop is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LosscutFormula {
    /// Discount the index average: 10% per volatility point above 10 when
    /// volatility is above its average, 1% per point above 20 otherwise.
    #[default]
    AverageDiscount,
    /// Like `AverageDiscount` in the rising regime, but the calm regime
    /// discounts from 10 and the base is capped at 95% of today's index.
    CappedDiscount,
    /// Single linear discount that widens stops as volatility grows.
    GrowPosition,
}

impl LosscutFormula {
    pub fn losscut_value(&self, index: f64, volatility: f64, avg_index: f64, avg_volatility: f64) -> f64 {
        match self {
            LosscutFormula::AverageDiscount => {
                let percent = if volatility > avg_volatility {
                    100.0 - (volatility - 10.0) * 10.0
                } else {
                    100.0 - (volatility - 20.0)
                };
                avg_index * percent / 100.0
            }
            LosscutFormula::CappedDiscount => {
                let percent = if volatility > avg_volatility {
                    100.0 - (volatility - 10.0) * 10.0
                } else {
                    100.0 - (volatility - 10.0)
                };
                let base = (index * 0.95).min(avg_index);
                base * percent / 100.0
            }
            LosscutFormula::GrowPosition => avg_index * (1.0 - (volatility + 32.0) / 16.0 * 5.0 / 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LosscutValueParams {
    pub index_window: usize,
    pub volatility_window: usize,
    pub formula: LosscutFormula,
    /// Minimum distance between any entry price and the stop, as a fraction.
    pub min_margin_rate: f64,
    /// Keep losing positions (re-stopped) instead of closing everything daily.
    pub carry_losing_positions: bool,
}

impl Default for LosscutValueParams {
    fn default() -> Self {
        Self {
            index_window: 40,
            volatility_window: 20,
            formula: LosscutFormula::default(),
            min_margin_rate: 0.01,
            carry_losing_positions: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LosscutValueStrategy {
    params: LosscutValueParams,
    index: TrailingWindow,
    volatility: TrailingWindow,
}

impl LosscutValueStrategy {
    pub fn new(params: LosscutValueParams) -> Self {
        Self {
            index: TrailingWindow::new(params.index_window.max(1)),
            volatility: TrailingWindow::new(params.volatility_window.max(1)),
            params,
        }
    }

    pub fn params(&self) -> &LosscutValueParams {
        &self.params
    }

    pub fn index_window(&self) -> &TrailingWindow {
        &self.index
    }

    pub fn volatility_window(&self) -> &TrailingWindow {
        &self.volatility
    }

    /// Pull the target strictly below every entry price the stop will apply to.
    fn clamp(&self, account: &Account, index: f64, target: f64) -> f64 {
        let lowest_entry = account
            .positions()
            .min()
            .map_or(f64::INFINITY, |p| p.entry_price());
        let ceiling = account.spread().ask(index).min(lowest_entry) * (1.0 - self.params.min_margin_rate);
        if target > ceiling {
            warn!(target, ceiling, "losscut value clamped below entry");
            return ceiling;
        }
        target
    }
}

impl Default for LosscutValueStrategy {
    fn default() -> Self {
        Self::new(LosscutValueParams::default())
    }
}

impl Strategy for LosscutValueStrategy {
    fn name(&self) -> &str {
        "losscut_value"
    }

    fn prepare_day(&mut self, account: &mut Account, index: f64, volatility: f64) -> Result<(), AccountError> {
        self.index.push(index);
        self.volatility.push(volatility);

        let target = self
            .params
            .formula
            .losscut_value(index, volatility, self.index.average(), self.volatility.average());
        if !target.is_finite() {
            warn!(index, volatility, "non-finite losscut value, standing aside");
            account.close_all(index);
            return Ok(());
        }
        let losscut_value = self.clamp(account, index, target);

        if self.params.carry_losing_positions && has_valuation_loss(account, index) {
            account.set_losscut_value_with_close(index, losscut_value)?;
        } else {
            account.close_all(index);
        }
        account.full_open(index, RiskParameter::StopLoss(losscut_value))?;
        Ok(())
    }
}
