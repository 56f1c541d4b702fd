//! Daily series preparation for the simulation driver.

pub mod align;

pub use align::{align_series, filter_date_window, AlignError, DayPrices};
