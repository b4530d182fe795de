//! The caller-intended window of a timeseries.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRange {
    /// Inclusive session dates.
    Dates(NaiveDate, NaiveDate),
    /// Explicit datetimes; the end is exclusive.
    Times(NaiveDateTime, NaiveDateTime),
    /// A single session.
    Day(NaiveDate),
}

impl LocalRange {
    /// Inclusive timestamp bounds of the window.
    pub fn bounds(&self) -> Result<(NaiveDateTime, NaiveDateTime), ReplayError> {
        let (begin, end) = match *self {
            LocalRange::Dates(a, b) => (start_of(a), end_of(b)),
            LocalRange::Day(d) => (start_of(d), end_of(d)),
            LocalRange::Times(a, b) => (a, b - Duration::seconds(1)),
        };
        if begin > end {
            return Err(ReplayError::configuration(format!(
                "local range {self} is empty"
            )));
        }
        Ok((begin, end))
    }
}

fn start_of(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::MIN)
}

fn end_of(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

impl FromStr for LocalRange {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ReplayError::configuration(format!(
                "cannot parse local range '{s}', expected YYYY-MM-DD[..YYYY-MM-DD] or MM/DD/YYYY[..MM/DD/YYYY]"
            ))
        };
        match s.split_once("..") {
            Some((a, b)) => {
                let begin = parse_date(a).ok_or_else(invalid)?;
                let end = parse_date(b).ok_or_else(invalid)?;
                Ok(LocalRange::Dates(begin, end))
            }
            None => parse_date(s).map(LocalRange::Day).ok_or_else(invalid),
        }
    }
}

impl fmt::Display for LocalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalRange::Dates(a, b) => write!(f, "{a}..{b}"),
            LocalRange::Times(a, b) => write!(f, "{a}...{b}"),
            LocalRange::Day(d) => write!(f, "{d}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_shorthand_forms() {
        assert_eq!(
            "2024-01-02..2024-03-28".parse::<LocalRange>().unwrap(),
            LocalRange::Dates(d(2024, 1, 2), d(2024, 3, 28))
        );
        assert_eq!(
            "01/02/2024".parse::<LocalRange>().unwrap(),
            LocalRange::Day(d(2024, 1, 2))
        );
        assert_eq!(
            "01/02/2024..2024-02-01".parse::<LocalRange>().unwrap(),
            LocalRange::Dates(d(2024, 1, 2), d(2024, 2, 1))
        );
        assert!(matches!(
            "last week".parse::<LocalRange>(),
            Err(ReplayError::Configuration { .. })
        ));
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let (b, e) = LocalRange::Dates(d(2024, 1, 2), d(2024, 1, 3)).bounds().unwrap();
        assert_eq!(b, d(2024, 1, 2).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(e, d(2024, 1, 3).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn times_end_is_exclusive() {
        let a = d(2024, 1, 2).and_hms_opt(9, 30, 0).unwrap();
        let b = d(2024, 1, 2).and_hms_opt(10, 0, 0).unwrap();
        let (_, e) = LocalRange::Times(a, b).bounds().unwrap();
        assert!(e < b);
        assert!(LocalRange::Times(a, a).bounds().is_err());
    }

    #[test]
    fn reversed_dates_fail() {
        assert!(LocalRange::Dates(d(2024, 2, 1), d(2024, 1, 1)).bounds().is_err());
    }
}
