//! Performance statistics: pure functions over a simulation result.
//!
//! Every statistic is a pure function: daily valuations and/or the trade
//! tape in, numbers out. No dependencies on the runner or the data pipeline.

use chrono::Datelike;
use marginlab_core::domain::CloseReason;
use marginlab_core::engine::{DailyValuation, SimulationResult, TradeRecord};
use serde::{Deserialize, Serialize};

/// Aggregate statistics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub initial_deposit: f64,
    pub total_deposit: f64,
    pub final_valuation: f64,
    /// `final_valuation / total_deposit` (1.0 = break-even).
    pub total_return: f64,
    /// `total_return^(1/years) - 1`, years counted as yearly period ends.
    pub cagr: f64,
    /// Most negative `valuation / running_high - 1`.
    pub max_drawdown: f64,
    pub monthly: PeriodStats,
    pub yearly: PeriodStats,
    pub trade_count: usize,
    pub win_rate: f64,
    pub losscut_count: usize,
    pub margin_call_count: usize,
}

/// Returns over one period granularity (monthly or yearly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub returns: Vec<PeriodReturn>,
    pub mean: f64,
    /// Population standard deviation.
    pub stdev: f64,
    /// `mean / stdev`, 0 when `stdev` is 0.
    pub sharpe: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    /// Last trading day of the period.
    pub date: chrono::NaiveDate,
    pub valuation: f64,
    pub ret: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month,
    Year,
}

impl PerformanceStats {
    pub fn compute(result: &SimulationResult) -> Self {
        let valuations = &result.valuations;
        let monthly = period_stats(valuations, Period::Month, result.initial_deposit);
        let yearly = period_stats(valuations, Period::Year, result.initial_deposit);
        let final_valuation = result.final_valuation();
        let total_return = total_return(final_valuation, result.total_deposit);

        Self {
            initial_deposit: result.initial_deposit,
            total_deposit: result.total_deposit,
            final_valuation,
            total_return,
            cagr: cagr(total_return, yearly.returns.len()),
            max_drawdown: max_drawdown(valuations),
            monthly,
            yearly,
            trade_count: result.trade_count(),
            win_rate: win_rate(&result.trades),
            losscut_count: count_reason(&result.trades, CloseReason::Losscut),
            margin_call_count: result.margin_calls,
        }
    }
}

// ─── Individual statistic functions ─────────────────────────────────

/// Ratio of final valuation to everything deposited. 0 when nothing was deposited.
pub fn total_return(final_valuation: f64, total_deposit: f64) -> f64 {
    if total_deposit <= 0.0 {
        return 0.0;
    }
    final_valuation / total_deposit
}

/// Compound annual growth from a total-return ratio over `years` periods.
///
/// A wiped-out account (ratio ≤ 0) reports -1.
pub fn cagr(total_return: f64, years: usize) -> f64 {
    if years == 0 {
        return 0.0;
    }
    if total_return <= 0.0 {
        return -1.0;
    }
    total_return.powf(1.0 / years as f64) - 1.0
}

/// Daily drawdown series: `valuation / running_high - 1`.
///
/// Days before the running high turns positive report 0.
pub fn drawdown_series(valuations: &[DailyValuation]) -> Vec<f64> {
    let mut high = 0.0_f64;
    valuations
        .iter()
        .map(|v| {
            high = high.max(v.valuation);
            if high > 0.0 {
                v.valuation / high - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Most negative drawdown; 0 for a curve that never falls.
pub fn max_drawdown(valuations: &[DailyValuation]) -> f64 {
    drawdown_series(valuations).into_iter().fold(0.0, f64::min)
}

/// Valuations on the last trading day of each calendar period, plus the final day.
pub fn period_ends(valuations: &[DailyValuation], period: Period) -> Vec<&DailyValuation> {
    let key = |v: &DailyValuation| match period {
        Period::Month => (v.date.year(), v.date.month()),
        Period::Year => (v.date.year(), 0),
    };
    let mut ends: Vec<&DailyValuation> = valuations
        .windows(2)
        .filter(|w| key(&w[0]) != key(&w[1]))
        .map(|w| &w[0])
        .collect();
    if let Some(last) = valuations.last() {
        ends.push(last);
    }
    ends
}

/// Returns between consecutive period ends, the first measured from `initial`.
pub fn period_returns(valuations: &[DailyValuation], period: Period, initial: f64) -> Vec<PeriodReturn> {
    let mut prev = initial;
    period_ends(valuations, period)
        .into_iter()
        .map(|v| {
            let ret = if prev > 0.0 { v.valuation / prev - 1.0 } else { 0.0 };
            prev = v.valuation;
            PeriodReturn {
                date: v.date,
                valuation: v.valuation,
                ret,
            }
        })
        .collect()
}

pub fn period_stats(valuations: &[DailyValuation], period: Period, initial: f64) -> PeriodStats {
    let returns = period_returns(valuations, period, initial);
    let values: Vec<f64> = returns.iter().map(|r| r.ret).collect();
    let mean = mean_f64(&values);
    let stdev = population_std_dev(&values);
    let sharpe = if stdev < 1e-15 { 0.0 } else { mean / stdev };
    PeriodStats {
        returns,
        mean,
        stdev,
        sharpe,
    }
}

/// Fraction of closed positions that realized a profit.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.pnl > 0.0).count() as f64 / trades.len() as f64
}

pub fn count_reason(trades: &[TradeRecord], reason: CloseReason) -> usize {
    trades.iter().filter(|t| t.reason == reason).count()
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
