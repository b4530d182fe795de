//! Session ordinal <-> timestamp mapping for one resolution and range.
//!
//! The expected session sequence is derived from the [`TradingCalendar`]
//! alone, independent of any instrument. Daily lookups snap to the nearest
//! session; intraday lookups need an exact match against the timestamps that
//! were actually fetched (see [`CalendarMap::materialize`]).

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::ReplayError;
use crate::domain::resolution::Resolution;

#[derive(Debug, Clone)]
pub struct CalendarMap {
    resolution: Resolution,
    sessions: Vec<NaiveDateTime>,
    materialized: Option<Materialized>,
}

#[derive(Debug, Clone)]
struct Materialized {
    timevec: Vec<NaiveDateTime>,
    index: HashMap<NaiveDateTime, usize>,
}

impl CalendarMap {
    pub fn new(
        calendar: &TradingCalendar,
        resolution: Resolution,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, ReplayError> {
        if begin > end {
            return Err(ReplayError::configuration(format!(
                "calendar range begins after it ends: {begin} > {end}"
            )));
        }

        let dates = calendar.sessions_between(begin.date(), end.date());
        let sessions = if resolution.is_daily() {
            dates
                .iter()
                .flat_map(|d| calendar.session_times(*d, resolution))
                .collect()
        } else {
            dates
                .iter()
                .flat_map(|d| calendar.session_times(*d, resolution))
                .filter(|t| *t >= begin && *t <= end)
                .collect()
        };

        Ok(Self {
            resolution,
            sessions,
            materialized: None,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn expected_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> &[NaiveDateTime] {
        &self.sessions
    }

    pub fn first_session(&self) -> Option<NaiveDateTime> {
        self.sessions.first().copied()
    }

    pub fn last_session(&self) -> Option<NaiveDateTime> {
        self.sessions.last().copied()
    }

    /// Bind the map to the timestamps actually fetched. Intraday lookups then
    /// resolve to row positions in `timevec`.
    pub fn materialize(&mut self, timevec: &[NaiveDateTime]) {
        let index = timevec.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        self.materialized = Some(Materialized {
            timevec: timevec.to_vec(),
            index,
        });
    }

    pub fn time_to_index(&self, time: NaiveDateTime) -> Result<usize, ReplayError> {
        if self.resolution.is_daily() {
            self.nearest_daily_index(time.date())
        } else {
            let found = match &self.materialized {
                Some(m) => m.index.get(&time).copied(),
                None => self.sessions.binary_search(&time).ok(),
            };
            found.ok_or_else(|| {
                ReplayError::out_of_range(format!("cannot find index matching the time {time}"))
            })
        }
    }

    pub fn date_to_index(&self, date: NaiveDate) -> Result<usize, ReplayError> {
        if self.resolution.is_daily() {
            self.nearest_daily_index(date)
        } else {
            let start = self
                .sessions
                .iter()
                .find(|t| t.date() >= date)
                .copied()
                .ok_or_else(|| ReplayError::out_of_range(format!("{date} is past the last session")))?;
            self.time_to_index(start)
        }
    }

    pub fn index_to_time(&self, index: usize) -> Result<NaiveDateTime, ReplayError> {
        let source = match (&self.materialized, self.resolution.is_daily()) {
            (Some(m), false) => &m.timevec,
            _ => &self.sessions,
        };
        source.get(index).copied().ok_or_else(|| {
            ReplayError::out_of_range(format!(
                "index [{index}] is outside of the range of bars, the maximum of which is {}",
                source.len() as i64 - 1
            ))
        })
    }

    fn nearest_daily_index(&self, date: NaiveDate) -> Result<usize, ReplayError> {
        let (first, last) = match (self.sessions.first(), self.sessions.last()) {
            (Some(f), Some(l)) => (f.date(), l.date()),
            _ => {
                return Err(ReplayError::out_of_range(format!(
                    "{date} cannot be mapped, the calendar range holds no sessions"
                )));
            }
        };
        if date < first || date > last {
            return Err(ReplayError::out_of_range(format!(
                "{date} is outside of the session range {first}..{last}"
            )));
        }
        match self.sessions.binary_search_by_key(&date, |t| t.date()) {
            Ok(i) => Ok(i),
            Err(pos) => {
                // `pos` is strictly inside the domain here.
                let before = self.sessions[pos - 1].date();
                let after = self.sessions[pos].date();
                if after - date <= date - before {
                    Ok(pos)
                } else {
                    Ok(pos - 1)
                }
            }
        }
    }

    /// Expected sessions absent from `timevec`.
    pub fn missing_sessions(&self, timevec: &[NaiveDateTime]) -> MissingSessions {
        let present: HashSet<NaiveDateTime> = timevec.iter().copied().collect();
        let missing: Vec<(usize, NaiveDateTime)> = self
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, t)| !present.contains(t))
            .map(|(i, t)| (i, *t))
            .collect();

        let mut ranges: Vec<RangeInclusive<NaiveDateTime>> = Vec::new();
        let mut prev_ordinal: Option<usize> = None;
        for (ordinal, time) in &missing {
            match (prev_ordinal, ranges.last_mut()) {
                (Some(p), Some(last)) if p + 1 == *ordinal => {
                    *last = *last.start()..=*time;
                }
                _ => ranges.push(*time..=*time),
            }
            prev_ordinal = Some(*ordinal);
        }

        MissingSessions {
            sessions: missing.into_iter().map(|(_, t)| t).collect(),
            ranges,
            daily: self.resolution.is_daily(),
        }
    }

    /// Timestamps in `timevec` that are not sessions of this map.
    pub fn unexpected(&self, timevec: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
        let expected: HashSet<&NaiveDateTime> = self.sessions.iter().collect();
        timevec
            .iter()
            .filter(|t| !expected.contains(t))
            .copied()
            .collect()
    }
}

/// Sessions the calendar expected but the store did not return.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingSessions {
    pub sessions: Vec<NaiveDateTime>,
    pub ranges: Vec<RangeInclusive<NaiveDateTime>>,
    daily: bool,
}

impl MissingSessions {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn fmt_time(&self, t: &NaiveDateTime) -> String {
        if self.daily {
            t.format("%Y-%m-%d").to_string()
        } else {
            t.format("%Y-%m-%d %H:%M").to_string()
        }
    }
}

impl fmt::Display for MissingSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = if self.ranges.len() < self.sessions.len() {
            self.ranges
                .iter()
                .map(|r| {
                    if r.start() == r.end() {
                        self.fmt_time(r.start())
                    } else {
                        format!("{}..{}", self.fmt_time(r.start()), self.fmt_time(r.end()))
                    }
                })
                .collect()
        } else {
            self.sessions.iter().map(|t| self.fmt_time(t)).collect()
        };
        write!(f, "{} ({} sessions)", parts.join(", "), self.sessions.len())
    }
}
