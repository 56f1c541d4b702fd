//! MarginLab Core: margin ledger, strategies, and the daily simulation driver.
//!
//! This crate contains the heart of the simulator:
//! - Domain types (positions, the ordered ledger, the account, daily bars)
//! - Trailing-window indicators (average, RSI, RCI)
//! - The `Strategy` trait with stop-loss and leverage strategies
//! - Series alignment and the day-by-day driver
//!
//! No file or network I/O happens here; loading and export live in the runner.

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod strategy;
