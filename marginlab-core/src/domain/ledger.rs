//! PositionLedger: positions ordered by entry price.
//!
//! Backed by a sorted `VecDeque`: ordered insert is a binary search plus an
//! O(n) shift, removing either extreme is O(1), and positional access lets
//! the account walk the ledger while it shrinks from the opposite end.
//! Positions sharing an entry price keep insertion order, so the newest unit
//! at a given price is the "larger" one.

use super::position::Position;
use std::collections::VecDeque;

/// Ordered collection of positions, ascending by entry price.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: VecDeque<Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping ascending entry-price order.
    pub fn add(&mut self, position: Position) {
        let price = position.entry_price();
        let idx = self.positions.partition_point(|p| p.entry_price() <= price);
        self.positions.insert(idx, position);
    }

    /// Position with the greatest entry price.
    pub fn max(&self) -> Option<&Position> {
        self.positions.back()
    }

    /// Position with the least entry price.
    pub fn min(&self) -> Option<&Position> {
        self.positions.front()
    }

    pub fn remove_max(&mut self) -> Option<Position> {
        self.positions.pop_back()
    }

    pub fn remove_min(&mut self) -> Option<Position> {
        self.positions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of per-position losses, each floored at zero.
    ///
    /// Profits on one position never offset losses on another.
    pub fn valuation_loss(&self, price: f64) -> f64 {
        self.positions.iter().map(|p| p.valuation_loss(price)).sum()
    }

    /// Total mark-to-market value of all positions.
    pub fn valuation(&self, price: f64) -> f64 {
        self.positions.iter().map(|p| p.valuation(price)).sum()
    }

    /// Total bound margin.
    pub fn required_margin(&self) -> f64 {
        self.positions.iter().map(Position::bound_margin).sum()
    }

    /// Aggregate exposure ratio: `sum(entry) / sum(margin)`. Zero when empty.
    pub fn leverage(&self) -> f64 {
        let margin = self.required_margin();
        if margin <= 0.0 {
            return 0.0;
        }
        let notional: f64 = self.positions.iter().map(Position::entry_price).sum();
        notional / margin
    }

    /// Traverse from the minimum entry price upward.
    pub fn ascending(&self) -> impl DoubleEndedIterator<Item = &Position> + ExactSizeIterator {
        self.positions.iter()
    }

    /// Traverse from the maximum entry price downward.
    pub fn descending(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().rev()
    }

    /// The `n`-th position counting up from the minimum.
    pub(crate) fn nth_from_min_mut(&mut self, n: usize) -> Option<&mut Position> {
        self.positions.get_mut(n)
    }

    /// The `n`-th position counting down from the maximum.
    pub(crate) fn nth_from_max_mut(&mut self, n: usize) -> Option<&mut Position> {
        let idx = self.positions.len().checked_sub(n + 1)?;
        self.positions.get_mut(idx)
    }

    pub(crate) fn nth_from_min(&self, n: usize) -> Option<&Position> {
        self.positions.get(n)
    }

    pub(crate) fn nth_from_max(&self, n: usize) -> Option<&Position> {
        let idx = self.positions.len().checked_sub(n + 1)?;
        self.positions.get(idx)
    }
}
