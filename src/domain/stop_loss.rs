//! Trailing drawdown stop evaluated over finer-resolution bars.

use chrono::{NaiveDateTime, NaiveTime};

use crate::domain::calendar::TradingCalendar;
use crate::domain::resolution::Resolution;

/// A fired stop: the row that breached and the drawdown seen there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopHit {
    pub row: usize,
    pub low: f64,
    pub max_high: f64,
    pub ratio: f64,
}

/// First bar the stop scan looks at for an entry at `entry_at`.
///
/// An entry inside trading hours with a later bar left in its session starts
/// at that bar; anything else starts at the open of the next session.
pub fn scan_start(
    calendar: &TradingCalendar,
    entry_at: NaiveDateTime,
    resolution: Resolution,
) -> NaiveDateTime {
    if !resolution.is_daily() && calendar.in_trading_hours(entry_at) {
        let later = calendar
            .session_times(entry_at.date(), resolution)
            .into_iter()
            .find(|t| *t > entry_at);
        if let Some(t) = later {
            return t;
        }
    }
    let next = calendar.shift_sessions(entry_at.date(), 1);
    calendar
        .session_times(next, resolution)
        .first()
        .copied()
        .unwrap_or_else(|| next.and_time(NaiveTime::MIN))
}

/// Walk `(row, high, low)` samples tracking the running maximum high,
/// starting from `entry_price`, and report the first sample whose drawdown
/// `(max_high - low) / max_high` exceeds `threshold`.
pub fn first_breach(
    entry_price: f64,
    samples: impl IntoIterator<Item = (usize, f64, f64)>,
    threshold: f64,
) -> Option<StopHit> {
    let mut max_high = entry_price;
    for (row, high, low) in samples {
        if high.is_nan() || low.is_nan() {
            continue;
        }
        max_high = max_high.max(high);
        if max_high <= 0.0 {
            continue;
        }
        let ratio = (max_high - low) / max_high;
        if ratio > threshold {
            return Some(StopHit {
                row,
                low,
                max_high,
                ratio,
            });
        }
    }
    None
}
