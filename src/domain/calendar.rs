//! Trading session calendar.
//!
//! Sessions are weekdays that are not listed holidays. Every "N trading days
//! from" computation in the crate goes through [`TradingCalendar`] so that the
//! windowing arithmetic and the calendar map agree on what a session is.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::BTreeSet;

use crate::domain::error::ReplayError;
use crate::domain::resolution::{Resolution, TRADING_PERIOD_MINUTES};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
    session_open: NaiveTime,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self {
            holidays: BTreeSet::new(),
            session_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TradingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>, session_open: NaiveTime) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            session_open,
        }
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Read `[calendar] holidays` (comma separated dates) and
    /// `session_open` (HH:MM).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let invalid = |key: &str, reason: String| ReplayError::ConfigInvalid {
            section: "calendar".to_string(),
            key: key.to_string(),
            reason,
        };
        let mut holidays = Vec::new();
        if let Some(raw) = config.get_string("calendar", "holidays") {
            for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                let date = NaiveDate::parse_from_str(token, "%Y-%m-%d")
                    .map_err(|e| invalid("holidays", format!("{token}: {e}")))?;
                holidays.push(date);
            }
        }
        let session_open = match config.get_string("calendar", "session_open") {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|e| invalid("session_open", format!("{raw}: {e}")))?,
            None => Self::default().session_open,
        };
        Ok(Self::new(holidays, session_open))
    }

    pub fn session_open(&self) -> NaiveTime {
        self.session_open
    }

    pub fn session_close(&self) -> NaiveTime {
        self.session_open + Duration::minutes(TRADING_PERIOD_MINUTES)
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First session on or after `date`.
    pub fn next_session(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_session(d) {
            d += Duration::days(1);
        }
        d
    }

    /// Last session on or before `date`.
    pub fn prev_session(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_session(d) {
            d -= Duration::days(1);
        }
        d
    }

    /// Calendar-nearest session; ties go to the later session.
    pub fn nearest_session(&self, date: NaiveDate) -> NaiveDate {
        let next = self.next_session(date);
        let prev = self.prev_session(date);
        if next - date <= date - prev { next } else { prev }
    }

    /// The session `n` trading days away from `date`. Positive `n` counts
    /// sessions strictly after `date`, negative counts strictly before it, and
    /// zero snaps forward to the next session.
    pub fn shift_sessions(&self, date: NaiveDate, n: i64) -> NaiveDate {
        if n == 0 {
            return self.next_session(date);
        }
        let step = if n > 0 { 1 } else { -1 };
        let mut d = date;
        let mut remaining = n.abs();
        while remaining > 0 {
            d += Duration::days(step);
            if self.is_session(d) {
                remaining -= 1;
            }
        }
        d
    }

    /// Number of sessions in `(from, to]`; negative when `to` precedes `from`.
    pub fn session_count(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        if to < from {
            return -self.session_count(to, from);
        }
        let mut count = 0;
        let mut d = from;
        while d < to {
            d += Duration::days(1);
            if self.is_session(d) {
                count += 1;
            }
        }
        count
    }

    /// Session dates in `[begin, end]`.
    pub fn sessions_between(&self, begin: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        begin
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_session(*d))
            .collect()
    }

    /// Bar timestamps of one session at `resolution`. Daily bars are stamped at
    /// midnight; intraday bars at the start of each interval.
    pub fn session_times(&self, date: NaiveDate, resolution: Resolution) -> Vec<NaiveDateTime> {
        if resolution.is_daily() {
            return vec![date.and_time(NaiveTime::MIN)];
        }
        let open = date.and_time(self.session_open);
        (0..resolution.sessions_per_day())
            .map(|k| open + resolution.interval() * k as i32)
            .collect()
    }

    /// True when `t` falls within the trading hours of a session.
    pub fn in_trading_hours(&self, t: NaiveDateTime) -> bool {
        self.is_session(t.date()) && t.time() >= self.session_open && t.time() < self.session_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_and_holidays_are_not_sessions() {
        let cal = TradingCalendar::with_holidays([d(2024, 1, 15)]);
        assert!(cal.is_session(d(2024, 1, 12)));
        assert!(!cal.is_session(d(2024, 1, 13)));
        assert!(!cal.is_session(d(2024, 1, 14)));
        assert!(!cal.is_session(d(2024, 1, 15)));
        assert!(cal.is_session(d(2024, 1, 16)));
    }

    #[test]
    fn next_prev_and_nearest() {
        let cal = TradingCalendar::default();
        // Saturday 2024-01-13
        assert_eq!(cal.next_session(d(2024, 1, 13)), d(2024, 1, 15));
        assert_eq!(cal.prev_session(d(2024, 1, 13)), d(2024, 1, 12));
        assert_eq!(cal.nearest_session(d(2024, 1, 13)), d(2024, 1, 12));
        assert_eq!(cal.nearest_session(d(2024, 1, 14)), d(2024, 1, 15));
        assert_eq!(cal.nearest_session(d(2024, 1, 10)), d(2024, 1, 10));
    }

    #[test]
    fn shift_sessions_skips_non_sessions() {
        let cal = TradingCalendar::with_holidays([d(2024, 1, 15)]);
        // Friday + 1 skips the weekend and the Monday holiday.
        assert_eq!(cal.shift_sessions(d(2024, 1, 12), 1), d(2024, 1, 16));
        assert_eq!(cal.shift_sessions(d(2024, 1, 16), -1), d(2024, 1, 12));
        assert_eq!(cal.shift_sessions(d(2024, 1, 13), 0), d(2024, 1, 16));
        assert_eq!(cal.shift_sessions(d(2024, 1, 2), 5), d(2024, 1, 9));
    }

    #[test]
    fn session_count_matches_shift() {
        let cal = TradingCalendar::with_holidays([d(2024, 1, 15)]);
        let start = d(2024, 1, 2);
        for n in 0..40 {
            let end = cal.shift_sessions(start, n);
            assert_eq!(cal.session_count(start, end), n);
        }
        assert_eq!(cal.session_count(d(2024, 1, 9), d(2024, 1, 2)), -5);
    }

    #[test]
    fn sessions_between_inclusive() {
        let cal = TradingCalendar::default();
        let sessions = cal.sessions_between(d(2024, 1, 5), d(2024, 1, 9));
        assert_eq!(sessions, vec![d(2024, 1, 5), d(2024, 1, 8), d(2024, 1, 9)]);
    }

    #[test]
    fn intraday_session_times() {
        let cal = TradingCalendar::default();
        let times = cal.session_times(d(2024, 1, 2), Resolution::ThirtyMinute);
        assert_eq!(times.len(), 13);
        assert_eq!(times[0].time(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(times[12].time(), NaiveTime::from_hms_opt(15, 30, 0).unwrap());

        let daily = cal.session_times(d(2024, 1, 2), Resolution::Daily);
        assert_eq!(daily, vec![d(2024, 1, 2).and_hms_opt(0, 0, 0).unwrap()]);
    }

    #[test]
    fn calendar_from_config() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;

        let config = FileConfigAdapter::from_string(
            "[calendar]\nholidays = 2024-01-01, 2024-01-15\nsession_open = 08:00\n",
        )
        .unwrap();
        let cal = TradingCalendar::from_config(&config).unwrap();
        assert!(!cal.is_session(d(2024, 1, 15)));
        assert_eq!(cal.session_open(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());

        let empty = FileConfigAdapter::from_string("[log]\nlevel = info\n").unwrap();
        let cal = TradingCalendar::from_config(&empty).unwrap();
        assert_eq!(cal.session_open(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());

        let bad = FileConfigAdapter::from_string("[calendar]\nholidays = 2024-13-01\n").unwrap();
        assert!(matches!(
            TradingCalendar::from_config(&bad),
            Err(ReplayError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn trading_hours() {
        let cal = TradingCalendar::default();
        assert!(cal.in_trading_hours(d(2024, 1, 2).and_hms_opt(10, 0, 0).unwrap()));
        assert!(!cal.in_trading_hours(d(2024, 1, 2).and_hms_opt(16, 0, 0).unwrap()));
        assert!(!cal.in_trading_hours(d(2024, 1, 2).and_hms_opt(0, 0, 0).unwrap()));
        assert!(!cal.in_trading_hours(d(2024, 1, 6).and_hms_opt(10, 0, 0).unwrap()));
    }
}
