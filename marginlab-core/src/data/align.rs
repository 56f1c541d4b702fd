//! Pairing the index series with its volatility series.
//!
//! Both series must cover exactly the same trading days. Unlike a
//! multi-symbol union there is no gap filling: a missing day on either side
//! is a data error, not a void bar.

use crate::domain::DailyBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One trading day of index and volatility prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPrices {
    pub date: NaiveDate,
    pub index: DailyBar,
    pub volatility: DailyBar,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignError {
    #[error("series length mismatch: index has {index} days, volatility has {volatility}")]
    LengthMismatch { index: usize, volatility: usize },

    #[error("date mismatch at day {position}: index={index}, volatility={volatility}")]
    DateMismatch {
        position: usize,
        index: NaiveDate,
        volatility: NaiveDate,
    },
}

/// Zip two daily series that must share one calendar.
pub fn align_series(index: &[DailyBar], volatility: &[DailyBar]) -> Result<Vec<DayPrices>, AlignError> {
    if index.len() != volatility.len() {
        return Err(AlignError::LengthMismatch {
            index: index.len(),
            volatility: volatility.len(),
        });
    }

    index
        .iter()
        .zip(volatility)
        .enumerate()
        .map(|(position, (i, v))| {
            if i.date != v.date {
                return Err(AlignError::DateMismatch {
                    position,
                    index: i.date,
                    volatility: v.date,
                });
            }
            Ok(DayPrices {
                date: i.date,
                index: i.clone(),
                volatility: v.clone(),
            })
        })
        .collect()
}

/// Keep the days inside an inclusive `[start, end]` window. Open bounds keep everything.
pub fn filter_date_window(days: Vec<DayPrices>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<DayPrices> {
    days.into_iter()
        .filter(|d| start.map_or(true, |s| d.date >= s) && end.map_or(true, |e| d.date <= e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> DailyBar {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        DailyBar::new(date, close - 1.0, close + 1.0, close - 2.0, close)
    }

    #[test]
    fn aligns_matching_calendars() {
        let index = vec![bar("2024-01-02", 100.0), bar("2024-01-03", 101.0)];
        let vol = vec![bar("2024-01-02", 15.0), bar("2024-01-03", 16.0)];
        let days = align_series(&index, &vol).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[1].index.close, 101.0);
        assert_eq!(days[1].volatility.close, 16.0);
    }

    #[test]
    fn rejects_length_mismatch() {
        let index = vec![bar("2024-01-02", 100.0), bar("2024-01-03", 101.0)];
        let vol = vec![bar("2024-01-02", 15.0)];
        assert_eq!(
            align_series(&index, &vol).unwrap_err(),
            AlignError::LengthMismatch { index: 2, volatility: 1 }
        );
    }

    #[test]
    fn rejects_date_mismatch() {
        let index = vec![bar("2024-01-02", 100.0), bar("2024-01-03", 101.0)];
        let vol = vec![bar("2024-01-02", 15.0), bar("2024-01-04", 16.0)];
        let err = align_series(&index, &vol).unwrap_err();
        assert!(matches!(err, AlignError::DateMismatch { position: 1, .. }));
    }

    #[test]
    fn empty_series_align() {
        assert!(align_series(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn date_window_is_inclusive() {
        let index: Vec<_> = ["2024-01-02", "2024-01-03", "2024-01-04"]
            .iter()
            .map(|d| bar(d, 100.0))
            .collect();
        let days = align_series(&index, &index).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 3);
        let kept = filter_date_window(days.clone(), start, None);
        assert_eq!(kept.len(), 2);
        let kept = filter_date_window(days, start, start);
        assert_eq!(kept.len(), 1);
    }
}
