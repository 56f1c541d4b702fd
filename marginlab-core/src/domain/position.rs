//! Position: a single leveraged long unit.
//!
//! A position is opened at an entry price and carries exactly one risk
//! parameter: either an absolute stop-loss price or a leverage ratio. The
//! active parameter determines how much cash is bound as margin:
//!
//! - stop-loss: `bound_margin = entry_price - stop_loss`
//! - leverage:  `bound_margin = entry_price / leverage`
//!
//! `bound_margin > 0` is an invariant. Setters validate the parameter before
//! mutating and return the margin delta so the owning account can adjust its
//! cash; a position never touches cash itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Monotonic identifier assigned by the owning account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos_{}", self.0)
    }
}

/// The risk parameter a position is configured with. Last set wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum RiskParameter {
    /// Absolute price at which the position is force-closed.
    StopLoss(f64),
    /// Ratio of entry notional to bound margin.
    Leverage(f64),
}

impl RiskParameter {
    /// Margin this parameter binds for a unit opened at `entry_price`.
    ///
    /// Returns `None` when the result would not be a finite positive amount.
    pub fn bound_margin(&self, entry_price: f64) -> Option<f64> {
        let margin = match *self {
            RiskParameter::StopLoss(stop) => entry_price - stop,
            RiskParameter::Leverage(leverage) => {
                if leverage <= 0.0 {
                    return None;
                }
                entry_price / leverage
            }
        };
        (margin.is_finite() && margin > 0.0).then_some(margin)
    }
}

impl fmt::Display for RiskParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskParameter::StopLoss(v) => write!(f, "stop_loss={v}"),
            RiskParameter::Leverage(v) => write!(f, "leverage={v}"),
        }
    }
}

/// Errors from position construction and risk-parameter changes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("{param} yields a non-positive margin at entry price {entry_price}")]
    NonPositiveMargin {
        param: RiskParameter,
        entry_price: f64,
    },
}

/// A single margin-backed long unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: PositionId,
    entry_price: f64,
    risk: RiskParameter,
    bound_margin: f64,
}

impl Position {
    pub fn new(id: PositionId, entry_price: f64, risk: RiskParameter) -> Result<Self, PositionError> {
        let bound_margin = validated_margin(entry_price, risk)?;
        Ok(Self {
            id,
            entry_price,
            risk,
            bound_margin,
        })
    }

    pub fn with_losscut_value(
        id: PositionId,
        entry_price: f64,
        losscut_value: f64,
    ) -> Result<Self, PositionError> {
        Self::new(id, entry_price, RiskParameter::StopLoss(losscut_value))
    }

    pub fn with_leverage(id: PositionId, entry_price: f64, leverage: f64) -> Result<Self, PositionError> {
        Self::new(id, entry_price, RiskParameter::Leverage(leverage))
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn risk_parameter(&self) -> RiskParameter {
        self.risk
    }

    pub fn bound_margin(&self) -> f64 {
        self.bound_margin
    }

    /// Mark-to-market value: `bound_margin + (price - entry_price)`.
    pub fn valuation(&self, price: f64) -> f64 {
        self.bound_margin + (price - self.entry_price)
    }

    /// Unrealized loss eating into the bound margin, floored at zero.
    pub fn valuation_loss(&self, price: f64) -> f64 {
        (self.bound_margin - self.valuation(price)).max(0.0)
    }

    /// Price at which the position must be force-closed.
    ///
    /// In leverage mode this is the price where `valuation == 0`.
    pub fn losscut_value(&self) -> f64 {
        match self.risk {
            RiskParameter::StopLoss(stop) => stop,
            RiskParameter::Leverage(_) => self.entry_price - self.bound_margin,
        }
    }

    /// Effective leverage of this unit regardless of mode.
    pub fn leverage(&self) -> f64 {
        self.entry_price / self.bound_margin
    }

    /// Switch to stop-loss mode. Returns `new_margin - old_margin`.
    pub fn set_losscut_value(&mut self, losscut_value: f64) -> Result<f64, PositionError> {
        self.set_risk_parameter(RiskParameter::StopLoss(losscut_value))
    }

    /// Switch to leverage mode. Returns `new_margin - old_margin`.
    pub fn set_leverage(&mut self, leverage: f64) -> Result<f64, PositionError> {
        self.set_risk_parameter(RiskParameter::Leverage(leverage))
    }

    pub fn set_risk_parameter(&mut self, risk: RiskParameter) -> Result<f64, PositionError> {
        let margin = validated_margin(self.entry_price, risk)?;
        let delta = margin - self.bound_margin;
        self.risk = risk;
        self.bound_margin = margin;
        Ok(delta)
    }

    /// Margin delta a switch to `losscut_value` would require. Does not mutate.
    pub fn additional_margin_to_losscut_value(&self, losscut_value: f64) -> Result<f64, PositionError> {
        self.additional_margin_to(RiskParameter::StopLoss(losscut_value))
    }

    /// Margin delta a switch to `leverage` would require. Does not mutate.
    pub fn additional_margin_to_leverage(&self, leverage: f64) -> Result<f64, PositionError> {
        self.additional_margin_to(RiskParameter::Leverage(leverage))
    }

    pub fn additional_margin_to(&self, risk: RiskParameter) -> Result<f64, PositionError> {
        Ok(validated_margin(self.entry_price, risk)? - self.bound_margin)
    }
}

fn validated_margin(entry_price: f64, risk: RiskParameter) -> Result<f64, PositionError> {
    risk.bound_margin(entry_price)
        .ok_or(PositionError::NonPositiveMargin { param: risk, entry_price })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_position(entry: f64, stop: f64) -> Position {
        Position::with_losscut_value(PositionId(1), entry, stop).unwrap()
    }

    #[test]
    fn stop_loss_margin_is_distance_to_stop() {
        let p = stop_position(1000.0, 550.0);
        assert_eq!(p.bound_margin(), 450.0);
        assert_eq!(p.losscut_value(), 550.0);
    }

    #[test]
    fn leverage_margin_is_entry_over_ratio() {
        let p = Position::with_leverage(PositionId(1), 1000.0, 4.0).unwrap();
        assert_eq!(p.bound_margin(), 250.0);
        // valuation hits zero at entry - margin
        assert_eq!(p.losscut_value(), 750.0);
        assert_eq!(p.valuation(p.losscut_value()), 0.0);
    }

    #[test]
    fn valuation_equals_margin_at_entry() {
        let p = stop_position(1000.0, 900.0);
        assert_eq!(p.valuation(1000.0), 100.0);
        assert_eq!(p.valuation(1100.0), 200.0);
        assert_eq!(p.valuation(950.0), 50.0);
    }

    #[test]
    fn valuation_loss_floors_at_zero() {
        let p = stop_position(1000.0, 900.0);
        assert_eq!(p.valuation_loss(1200.0), 0.0);
        assert_eq!(p.valuation_loss(960.0), 40.0);
    }

    #[test]
    fn set_losscut_returns_margin_delta() {
        let mut p = stop_position(1000.0, 900.0);
        let delta = p.set_losscut_value(850.0).unwrap();
        assert_eq!(delta, 50.0);
        assert_eq!(p.bound_margin(), 150.0);

        let delta = p.set_losscut_value(950.0).unwrap();
        assert_eq!(delta, -100.0);
        assert_eq!(p.bound_margin(), 50.0);
    }

    #[test]
    fn switching_modes_is_last_set_wins() {
        let mut p = stop_position(1000.0, 900.0);
        let delta = p.set_leverage(2.0).unwrap();
        assert_eq!(delta, 400.0);
        assert_eq!(p.risk_parameter(), RiskParameter::Leverage(2.0));
        assert_eq!(p.losscut_value(), 500.0);

        p.set_losscut_value(800.0).unwrap();
        assert_eq!(p.risk_parameter(), RiskParameter::StopLoss(800.0));
        assert_eq!(p.bound_margin(), 200.0);
    }

    #[test]
    fn additional_margin_query_does_not_mutate() {
        let p = stop_position(1000.0, 900.0);
        assert_eq!(p.additional_margin_to_losscut_value(850.0).unwrap(), 50.0);
        assert_eq!(p.additional_margin_to_leverage(5.0).unwrap(), 100.0);
        assert_eq!(p.bound_margin(), 100.0);
        assert_eq!(p.risk_parameter(), RiskParameter::StopLoss(900.0));
    }

    #[test]
    fn rejects_non_positive_margin() {
        assert!(Position::with_losscut_value(PositionId(1), 1000.0, 1000.0).is_err());
        assert!(Position::with_losscut_value(PositionId(1), 1000.0, 1200.0).is_err());
        assert!(Position::with_leverage(PositionId(1), 1000.0, 0.0).is_err());
        assert!(Position::with_leverage(PositionId(1), 1000.0, -2.0).is_err());
        assert!(Position::with_leverage(PositionId(1), 1000.0, f64::NAN).is_err());
    }

    #[test]
    fn failed_setter_leaves_position_untouched() {
        let mut p = stop_position(1000.0, 900.0);
        let err = p.set_losscut_value(1500.0).unwrap_err();
        assert!(matches!(err, PositionError::NonPositiveMargin { .. }));
        assert_eq!(p.bound_margin(), 100.0);
        assert_eq!(p.losscut_value(), 900.0);
    }

    #[test]
    fn risk_parameter_serialization_roundtrip() {
        let json = serde_json::to_string(&RiskParameter::Leverage(3.5)).unwrap();
        assert_eq!(json, r#"{"mode":"leverage","value":3.5}"#);
        let back: RiskParameter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RiskParameter::Leverage(3.5));
    }
}
