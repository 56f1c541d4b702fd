//! Leverage strategy: every position shares one leverage ratio, recomputed
//! each day from the volatility reading and its trailing statistics.

use super::{has_valuation_loss, Strategy};
use crate::domain::{Account, AccountError};
use crate::indicators::TrailingWindow;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How the daily target leverage is derived from volatility `iv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageFormula {
    /// Always `max_leverage`.
    Fixed,
    /// `100 / iv`.
    TargetVolatility,
    /// `10 - (iv - 5)` above the volatility average, `10 - (iv - 5) / 5` otherwise.
    #[default]
    VolatilityRegime,
    /// Size so that the expected daily move stays inside a 10% required
    /// margin plus a volatility-scaled buffer; halved while volatility is
    /// above its average.
    MarginRate,
    /// Margin-rate sizing damped by the volatility RCI: full size while
    /// volatility falls, zero while it rises.
    RciDamped,
    /// Kelly fraction for a 7% annual drift at the implied daily variance.
    Kelly,
}

impl LeverageFormula {
    pub fn leverage(&self, iv: f64, avg_iv: f64, rci_iv: f64, max_leverage: f64) -> f64 {
        match self {
            LeverageFormula::Fixed => max_leverage,
            LeverageFormula::TargetVolatility => 100.0 / iv,
            LeverageFormula::VolatilityRegime => {
                if iv > avg_iv {
                    10.0 - (iv - 5.0)
                } else {
                    10.0 - (iv - 5.0) / 5.0
                }
            }
            LeverageFormula::MarginRate => {
                if iv > avg_iv {
                    let sigma = (iv / 5.0).log2() + 5.0;
                    100.0 / (10.0 + iv / 16.0 * sigma) / 2.0
                } else {
                    let sigma = (iv / 5.0).log10() * 2.0 + 1.0;
                    100.0 / (10.0 + iv / 16.0 * sigma)
                }
            }
            LeverageFormula::RciDamped => {
                let sigma = (iv / 5.0).log2() + 1.0;
                let base = 100.0 / (10.0 + iv / 16.0 * sigma);
                base * (1.0 - (rci_iv + 100.0) / 200.0)
            }
            LeverageFormula::Kelly => {
                let drift = 1.07_f64.powf(1.0 / 252.0) - 1.0;
                let daily_sigma = iv / 252.0_f64.sqrt() / 100.0;
                drift / daily_sigma.powi(2)
            }
        }
    }
}

/// Clamp a raw leverage into `[0, max_leverage]`; NaN becomes 0.
pub fn clamp_leverage(raw: f64, max_leverage: f64) -> f64 {
    if raw.is_nan() {
        warn!(max_leverage, "leverage is NaN, holding no positions");
        return 0.0;
    }
    let clamped = raw.clamp(0.0, max_leverage);
    if clamped != raw {
        warn!(raw, clamped, "leverage clamped");
    }
    clamped
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageRatioParams {
    pub index_window: usize,
    pub volatility_window: usize,
    pub formula: LeverageFormula,
    pub max_leverage: f64,
    /// Keep losing positions (re-levered) instead of closing everything daily.
    pub carry_losing_positions: bool,
}

impl Default for LeverageRatioParams {
    fn default() -> Self {
        Self {
            index_window: 40,
            volatility_window: 20,
            formula: LeverageFormula::default(),
            max_leverage: 10.0,
            carry_losing_positions: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeverageRatioStrategy {
    params: LeverageRatioParams,
    index: TrailingWindow,
    volatility: TrailingWindow,
}

impl LeverageRatioStrategy {
    pub fn new(params: LeverageRatioParams) -> Self {
        Self {
            index: TrailingWindow::new(params.index_window.max(1)),
            volatility: TrailingWindow::new(params.volatility_window.max(1)),
            params,
        }
    }

    pub fn params(&self) -> &LeverageRatioParams {
        &self.params
    }

    pub fn index_window(&self) -> &TrailingWindow {
        &self.index
    }

    pub fn volatility_window(&self) -> &TrailingWindow {
        &self.volatility
    }

    /// Today's clamped target leverage. Call after pushing today's reading.
    fn target_leverage(&self, iv: f64) -> f64 {
        let raw = self.params.formula.leverage(
            iv,
            self.volatility.average(),
            self.volatility.rci(),
            self.params.max_leverage,
        );
        clamp_leverage(raw, self.params.max_leverage)
    }
}

impl Default for LeverageRatioStrategy {
    fn default() -> Self {
        Self::new(LeverageRatioParams::default())
    }
}

impl Strategy for LeverageRatioStrategy {
    fn name(&self) -> &str {
        "leverage_ratio"
    }

    fn prepare_day(&mut self, account: &mut Account, index: f64, volatility: f64) -> Result<(), AccountError> {
        self.index.push(index);
        self.volatility.push(volatility);

        let leverage = self.target_leverage(volatility);

        if self.params.carry_losing_positions && has_valuation_loss(account, index) {
            account.set_leverage_with_close2(index, leverage)?;
        } else {
            account.close_all(index);
        }
        account.full_open_with_leverage2(index, leverage)?;
        Ok(())
    }
}
