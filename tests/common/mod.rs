#![allow(dead_code)]

use barreplay::domain::bar::{log_return, Bar};
use barreplay::domain::calendar::TradingCalendar;
use barreplay::domain::error::ReplayError;
use barreplay::domain::params::Params;
use barreplay::domain::population::Population;
use barreplay::domain::resolution::Resolution;
use barreplay::domain::strategy::{Evaluation, StrategyBinding, StrategyKind};
use barreplay::ports::bar_store::BarStore;
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::Cell;
use std::collections::HashMap;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

/// A fixed "now" well after every generated bar.
pub fn now() -> NaiveDateTime {
    dt(2024, 6, 3, 0, 0)
}

pub struct MockBarStore {
    pub data: HashMap<(String, Resolution), Vec<Bar>>,
    pub fetches: Cell<usize>,
}

impl MockBarStore {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, resolution: Resolution, bars: Vec<Bar>) -> Self {
        if let Some(first) = bars.first() {
            self.data
                .insert((first.instrument.clone(), resolution), bars);
        }
        self
    }
}

impl BarStore for MockBarStore {
    fn fetch_bars(
        &self,
        instrument: &str,
        resolution: Resolution,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, ReplayError> {
        self.fetches.set(self.fetches.get() + 1);
        Ok(self
            .data
            .get(&(instrument.to_string(), resolution))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= begin && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn latest_timestamp(
        &self,
        instrument: &str,
        resolution: Resolution,
    ) -> Result<Option<NaiveDateTime>, ReplayError> {
        Ok(self
            .data
            .get(&(instrument.to_string(), resolution))
            .and_then(|bars| bars.last())
            .map(|b| b.timestamp))
    }

    fn list_instruments(&self) -> Result<Vec<String>, ReplayError> {
        let mut names: Vec<String> = self.data.keys().map(|(i, _)| i.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

pub fn make_bar(instrument: &str, timestamp: NaiveDateTime, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        instrument: instrument.to_string(),
        timestamp,
        open: close,
        high,
        low,
        close,
        volume: 1000,
        logr: 0.0,
    }
}

/// One bar per session from `start` through `end`, closes from `close`.
pub fn daily_bars(
    calendar: &TradingCalendar,
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
    close: impl Fn(usize) -> f64,
) -> Vec<Bar> {
    let mut prev: Option<f64> = None;
    calendar
        .sessions_between(start, end)
        .into_iter()
        .enumerate()
        .map(|(k, d)| {
            let c = close(k);
            let mut bar = make_bar(
                instrument,
                d.and_hms_opt(0, 0, 0).unwrap(),
                c + 1.0,
                c - 1.0,
                c,
            );
            bar.logr = log_return(prev, c);
            prev = Some(c);
            bar
        })
        .collect()
}

/// Daily bars with a slow upward drift.
pub fn trending_daily(calendar: &TradingCalendar, instrument: &str) -> Vec<Bar> {
    daily_bars(calendar, instrument, date(2023, 11, 1), date(2024, 3, 29), |k| {
        100.0 + k as f64 * 0.5
    })
}

/// Every intraday bar of every session from `start` through `end`;
/// `hl` gives `(high, low)` per timestamp and the close sits between them.
pub fn intraday_bars(
    calendar: &TradingCalendar,
    instrument: &str,
    resolution: Resolution,
    start: NaiveDate,
    end: NaiveDate,
    hl: impl Fn(NaiveDateTime) -> (f64, f64),
) -> Vec<Bar> {
    calendar
        .sessions_between(start, end)
        .into_iter()
        .flat_map(|d| calendar.session_times(d, resolution))
        .map(|t| {
            let (high, low) = hl(t);
            make_bar(instrument, t, high, low, (high + low) / 2.0)
        })
        .collect()
}

pub fn without(bars: Vec<Bar>, gaps: &[NaiveDate]) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| !gaps.contains(&b.timestamp.date()))
        .collect()
}

pub fn population(name: &str, instruments: &[&str], start: NaiveDate, end: NaiveDate) -> Population {
    Population {
        name: name.to_string(),
        instruments: instruments.iter().map(|s| s.to_string()).collect(),
        start_date: start,
        end_date: end,
    }
}

/// A trigger firing on fixed session dates; `per_pass[p]` lists the dates
/// for pass `p`.
pub fn trigger_on(name: &str, per_pass: Vec<Vec<NaiveDate>>) -> StrategyBinding {
    let evaluation = Evaluation::trigger(move |ts, _params, pass| {
        let range = ts.index_range()?;
        let mut rows = Vec::new();
        for d in per_pass.get(pass as usize).into_iter().flatten() {
            if let Ok(row) = ts.resolve(*d) {
                if range.contains(&row) {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    });
    StrategyBinding::new(name, "fixed_dates", Params::new(), evaluation)
}

pub fn builtin(name: &str, kind: StrategyKind, rule: &str) -> StrategyBinding {
    StrategyBinding::builtin(name, kind, rule, Params::new()).unwrap()
}
