//! Domain types for the margin ledger.

pub mod account;
pub mod bar;
pub mod ledger;
pub mod position;

pub use account::{Account, AccountError, AccountSnapshot, CloseReason, Settlement, Spread};
pub use bar::DailyBar;
pub use ledger::PositionLedger;
pub use position::{Position, PositionError, PositionId, RiskParameter};
