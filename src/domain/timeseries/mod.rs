//! Buffered, calendar-checked sample windows.
//!
//! A [`Timeseries`] owns one window of bars for one instrument at one
//! resolution. The caller names a local range; `populate` widens it by the
//! pre/post buffers, fetches from the [`BarStore`], checks the rows against
//! the [`TradingCalendar`], applies striding and maps the local range onto
//! buffer rows. Indicator results are memoized in invocation order.
//!
//! Row indexes (`SampleRef::Index`) always refer to buffer rows, so indexes
//! returned by indicator helpers can be handed straight back to the
//! accessors.

pub mod memo;
pub mod price;
pub mod range;

pub use memo::{IndicatorResult, VectorKey};
pub use price::{PriceExpr, PriceDerivation};
pub use range::LocalRange;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::domain::bar::{Attribute, Bar};
use crate::domain::calendar::TradingCalendar;
use crate::domain::calendar_map::CalendarMap;
use crate::domain::error::ReplayError;
use crate::domain::indicator::{crossings, IndicatorFunction};
use crate::domain::params::Params;
use crate::domain::resolution::Resolution;
use crate::ports::bar_store::BarStore;

/// Samples of pre-buffer behind `PreBuffer::Default`.
pub const DEFAULT_PRE_BUFFER: usize = 50;

/// Everything a timeseries needs from the outside world.
#[derive(Clone, Copy)]
pub struct DataContext<'a> {
    pub store: &'a dyn BarStore,
    pub calendar: &'a TradingCalendar,
    /// Buffers never extend past this instant.
    pub now: NaiveDateTime,
}

impl<'a> DataContext<'a> {
    pub fn new(store: &'a dyn BarStore, calendar: &'a TradingCalendar) -> Self {
        Self {
            store,
            calendar,
            now: Local::now().naive_local(),
        }
    }

    pub fn at(self, now: NaiveDateTime) -> Self {
        Self { now, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreBuffer {
    Samples(usize),
    Default,
}

impl PreBuffer {
    pub fn samples(&self) -> usize {
        match self {
            PreBuffer::Samples(n) => *n,
            PreBuffer::Default => DEFAULT_PRE_BUFFER,
        }
    }
}

impl Default for PreBuffer {
    fn default() -> Self {
        PreBuffer::Samples(0)
    }
}

impl FromStr for PreBuffer {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("default") {
            return Ok(PreBuffer::Default);
        }
        s.parse::<usize>().map(PreBuffer::Samples).map_err(|_| {
            ReplayError::configuration(format!(
                "pre_buffer must be a sample count or 'default', got '{s}'"
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesOptions {
    pub price: PriceDerivation,
    pub pre_buffer: PreBuffer,
    /// Samples fetched past the local range.
    pub post_buffer: usize,
    /// Populate during construction.
    pub populate: bool,
    pub stride: usize,
    pub stride_offset: usize,
    /// Accept missing intraday sessions. Daily series are always strict.
    pub tolerate_gaps: bool,
}

impl Default for TimeseriesOptions {
    fn default() -> Self {
        Self {
            price: PriceDerivation::Default,
            pre_buffer: PreBuffer::default(),
            post_buffer: 0,
            populate: false,
            stride: 1,
            stride_offset: 0,
            tolerate_gaps: false,
        }
    }
}

/// Where to read a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRef {
    /// Buffer row.
    Index(usize),
    Time(NaiveDateTime),
    Date(NaiveDate),
}

impl From<usize> for SampleRef {
    fn from(i: usize) -> Self {
        SampleRef::Index(i)
    }
}

impl From<NaiveDateTime> for SampleRef {
    fn from(t: NaiveDateTime) -> Self {
        SampleRef::Time(t)
    }
}

impl From<NaiveDate> for SampleRef {
    fn from(d: NaiveDate) -> Self {
        SampleRef::Date(d)
    }
}

struct Buffer {
    pre_samples: usize,
    map: CalendarMap,
    timevec: Vec<NaiveDateTime>,
    /// Position of each retained row in the unstrided fetch.
    ordinals: Vec<usize>,
    values: BTreeMap<Attribute, Vec<f64>>,
    index_range: RangeInclusive<usize>,
}

impl Buffer {
    fn column(&self, attr: Attribute) -> Result<&[f64], ReplayError> {
        self.values
            .get(&attr)
            .map(Vec::as_slice)
            .ok_or_else(|| ReplayError::UnknownVector {
                name: attr.to_string(),
            })
    }
}

pub struct Timeseries<'a> {
    ctx: DataContext<'a>,
    instrument: String,
    local: LocalRange,
    local_begin: NaiveDateTime,
    local_end: NaiveDateTime,
    resolution: Resolution,
    options: TimeseriesOptions,
    price: PriceExpr,
    buffer: Option<Buffer>,
    results: Vec<Arc<IndicatorResult>>,
}

impl<'a> Timeseries<'a> {
    pub fn new(
        ctx: DataContext<'a>,
        instrument: &str,
        local: LocalRange,
        resolution: Resolution,
        options: TimeseriesOptions,
    ) -> Result<Self, ReplayError> {
        if options.stride == 0 {
            return Err(ReplayError::configuration("stride must be at least 1"));
        }
        if options.stride_offset >= options.stride {
            return Err(ReplayError::configuration(format!(
                "stride_offset ({}) must be less than stride ({})",
                options.stride_offset, options.stride
            )));
        }
        let price = options.price.compile()?;
        let (local_begin, local_end) = local.bounds()?;

        let mut ts = Self {
            ctx,
            instrument: instrument.to_string(),
            local,
            local_begin,
            local_end,
            resolution,
            options,
            price,
            buffer: None,
            results: Vec::new(),
        };
        if ts.options.populate {
            ts.populate(None)?;
        }
        Ok(ts)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn local_range(&self) -> LocalRange {
        self.local
    }

    pub fn is_populated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Fetch (or reuse) the buffered window. `pre_buffer` overrides the
    /// configured pre-buffer sample count.
    pub fn populate(&mut self, pre_buffer: Option<usize>) -> Result<(), ReplayError> {
        let samples = pre_buffer.unwrap_or_else(|| self.options.pre_buffer.samples());
        if let Some(buffer) = self.buffer.as_mut() {
            if samples <= buffer.pre_samples {
                buffer.index_range = local_rows(&buffer.timevec, self.local_begin, self.local_end)
                    .ok_or_else(|| ReplayError::NoData {
                        instrument: self.instrument.clone(),
                        begin: self.local_begin,
                        end: self.local_end,
                    })?;
                return Ok(());
            }
        }
        let buffer = self.fetch(samples)?;
        self.buffer = Some(buffer);
        Ok(())
    }

    fn fetch(&self, samples: usize) -> Result<Buffer, ReplayError> {
        let calendar = self.ctx.calendar;
        let stride = self.options.stride;
        let pre_days = self.resolution.days_for_samples(samples * stride) as i64;
        let post_days = self
            .resolution
            .days_for_samples(self.options.post_buffer * stride) as i64;

        let begin = if pre_days > 0 {
            calendar
                .shift_sessions(self.local_begin.date(), -pre_days)
                .and_time(NaiveTime::MIN)
        } else {
            self.local_begin
        };
        let end = if post_days > 0 {
            let last = calendar.shift_sessions(self.local_end.date(), post_days);
            LocalRange::Day(last).bounds()?.1
        } else {
            self.local_end
        };
        let end = end.min(self.ctx.now);

        let no_data = |begin: NaiveDateTime, end: NaiveDateTime| ReplayError::NoData {
            instrument: self.instrument.clone(),
            begin,
            end,
        };
        if begin > end {
            return Err(no_data(self.local_begin, self.local_end));
        }

        let bars = self
            .ctx
            .store
            .fetch_bars(&self.instrument, self.resolution, begin, end)?;
        if bars.is_empty() {
            return Err(no_data(begin, end));
        }
        if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(ReplayError::DataIntegrity {
                instrument: self.instrument.clone(),
                reason: format!(
                    "bars are not strictly ordered: {} followed by {}",
                    w[0].timestamp, w[1].timestamp
                ),
            });
        }

        let fetched: Vec<NaiveDateTime> = bars.iter().map(|b| b.timestamp).collect();
        let mut map = CalendarMap::new(calendar, self.resolution, begin, end)?;
        if let Some(t) = map.unexpected(&fetched).first() {
            return Err(ReplayError::DataIntegrity {
                instrument: self.instrument.clone(),
                reason: format!("bar at {t} does not fall on a {} session", self.resolution),
            });
        }
        let missing = map.missing_sessions(&fetched);
        if !missing.is_empty() {
            if self.resolution.is_daily() || !self.options.tolerate_gaps {
                return Err(ReplayError::MissingBars {
                    instrument: self.instrument.clone(),
                    missing,
                });
            }
            debug!(instrument = %self.instrument, missing = %missing, "tolerating intraday gap");
        }

        let offset = self.options.stride_offset;
        let retained: Vec<(usize, &Bar)> = bars
            .iter()
            .enumerate()
            .filter(|(i, _)| *i >= offset && (i - offset) % stride == 0)
            .collect();
        if retained.is_empty() {
            return Err(no_data(begin, end));
        }

        let timevec: Vec<NaiveDateTime> = retained.iter().map(|(_, b)| b.timestamp).collect();
        let ordinals: Vec<usize> = retained.iter().map(|(i, _)| *i).collect();
        let mut values: BTreeMap<Attribute, Vec<f64>> = Attribute::RAW
            .iter()
            .map(|attr| {
                let column = retained
                    .iter()
                    .map(|(_, b)| b.value(*attr).unwrap_or(f64::NAN))
                    .collect();
                (*attr, column)
            })
            .collect();
        let price = self.price.evaluate(&values, timevec.len());
        values.insert(Attribute::Price, price);

        map.materialize(&timevec);
        let index_range = local_rows(&timevec, self.local_begin, self.local_end)
            .ok_or_else(|| no_data(self.local_begin, self.local_end))?;

        debug!(
            instrument = %self.instrument,
            resolution = %self.resolution,
            rows = timevec.len(),
            pre_samples = samples,
            "populated timeseries"
        );

        Ok(Buffer {
            pre_samples: samples,
            map,
            timevec,
            ordinals,
            values,
            index_range,
        })
    }

    /// Drop the buffer and all memoized results.
    pub fn depopulate(&mut self) {
        self.buffer = None;
        self.results.clear();
    }

    /// Size the pre-buffer for `function` and verify the local window has
    /// enough history ahead of it.
    pub fn calc_indexes(
        &mut self,
        function: &dyn IndicatorFunction,
        params: &Params,
    ) -> Result<(), ReplayError> {
        let need = function.min_samples(params)?;
        let configured = self.options.pre_buffer.samples();
        self.populate(Some(need.max(configured)))?;

        let have = *self.index_range()?.start();
        if have < need {
            return Err(ReplayError::InsufficientSamples {
                instrument: self.instrument.clone(),
                have,
                need,
            });
        }
        Ok(())
    }

    /// Run `function` over the local window and memoize its result.
    pub fn apply(
        &mut self,
        function: &dyn IndicatorFunction,
        params: &Params,
    ) -> Result<Arc<IndicatorResult>, ReplayError> {
        self.calc_indexes(function, params)?;
        let buffer = self.populated()?;
        let input = buffer.column(function.source())?;
        let output = function.compute(input, params)?;
        let range = buffer.index_range.clone();
        let rows = buffer.timevec.len();

        let crossing_rows = match &output.threshold {
            Some(threshold) => {
                let full = output
                    .vectors
                    .iter()
                    .find(|(name, _)| *name == threshold.vector)
                    .map(|(_, v)| v)
                    .ok_or_else(|| ReplayError::UnknownVector {
                        name: threshold.vector.clone(),
                    })?;
                crossings(full, range.clone(), threshold)
            }
            None => Vec::new(),
        };

        let mut vectors = Vec::with_capacity(output.vectors.len());
        for (name, v) in output.vectors {
            if v.len() != rows {
                return Err(ReplayError::out_of_range(format!(
                    "{} produced {} samples for {rows} rows",
                    function.name(),
                    v.len()
                )));
            }
            vectors.push((name, v[range.clone()].to_vec()));
        }

        let result = Arc::new(IndicatorResult {
            function: function.name().to_string(),
            params: params.clone(),
            vectors,
            crossings: crossing_rows,
            threshold: output.threshold,
            offset: *range.start(),
        });
        self.results.push(Arc::clone(&result));
        Ok(result)
    }

    pub fn results(&self) -> &[Arc<IndicatorResult>] {
        &self.results
    }

    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    /// Most recent result produced by `function`.
    pub fn find_result(&self, function: &str) -> Option<Arc<IndicatorResult>> {
        self.results
            .iter()
            .rev()
            .find(|r| r.function == function)
            .cloned()
    }

    /// A memoized vector (most recent first), else a raw attribute over the
    /// local window.
    pub fn vector_for<'k>(&self, key: impl Into<VectorKey<'k>>) -> Result<&[f64], ReplayError> {
        let key = key.into();
        for memo in self.results.iter().rev() {
            let hit = match key {
                VectorKey::Name(name) => memo.vector(name),
                VectorKey::Of(function, name) if memo.function == function => memo.vector(name),
                VectorKey::Of(..) => None,
            };
            if let Some(v) = hit {
                return Ok(v);
            }
        }
        match key {
            VectorKey::Name(name) => match name.parse::<Attribute>() {
                Ok(attr) => self.local_values(attr),
                Err(_) => Err(ReplayError::UnknownVector {
                    name: name.to_string(),
                }),
            },
            VectorKey::Of(function, name) => Err(ReplayError::UnknownVector {
                name: format!("{function}.{name}"),
            }),
        }
    }

    fn populated(&self) -> Result<&Buffer, ReplayError> {
        self.buffer.as_ref().ok_or_else(|| {
            ReplayError::out_of_range(format!("timeseries for {} is not populated", self.instrument))
        })
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.timevec.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer rows covered by the local range.
    pub fn index_range(&self) -> Result<RangeInclusive<usize>, ReplayError> {
        Ok(self.populated()?.index_range.clone())
    }

    pub fn last_index(&self) -> Result<usize, ReplayError> {
        Ok(self.populated()?.timevec.len() - 1)
    }

    /// Buffer row for a sample reference.
    pub fn resolve(&self, at: impl Into<SampleRef>) -> Result<usize, ReplayError> {
        let buffer = self.populated()?;
        match at.into() {
            SampleRef::Index(i) => {
                if i < buffer.timevec.len() {
                    Ok(i)
                } else {
                    Err(ReplayError::out_of_range(format!(
                        "index [{i}] is outside of the range of bars, the maximum of which is {}",
                        buffer.timevec.len() - 1
                    )))
                }
            }
            SampleRef::Time(t) => self.row_for_time(buffer, t),
            SampleRef::Date(d) => {
                if self.resolution.is_daily() {
                    self.row_for_time(buffer, d.and_time(NaiveTime::MIN))
                } else {
                    let row = buffer.timevec.partition_point(|t| t.date() < d);
                    match buffer.timevec.get(row) {
                        Some(t) if t.date() == d => Ok(row),
                        _ => Err(ReplayError::out_of_range(format!(
                            "no {} bars for {} on {d}",
                            self.resolution, self.instrument
                        ))),
                    }
                }
            }
        }
    }

    fn row_for_time(&self, buffer: &Buffer, t: NaiveDateTime) -> Result<usize, ReplayError> {
        if self.resolution.is_daily() {
            // Daily buffers are gap free, so calendar ordinals are fetch rows.
            let ordinal = buffer.map.time_to_index(t)?;
            buffer.ordinals.binary_search(&ordinal).map_err(|_| {
                ReplayError::out_of_range(format!("session {t} was not retained by the stride"))
            })
        } else {
            buffer.map.time_to_index(t)
        }
    }

    pub fn time_at(&self, at: impl Into<SampleRef>) -> Result<NaiveDateTime, ReplayError> {
        let row = self.resolve(at)?;
        Ok(self.populated()?.timevec[row])
    }

    pub fn times_for(&self, rows: &[usize]) -> Result<Vec<NaiveDateTime>, ReplayError> {
        rows.iter().map(|r| self.time_at(*r)).collect()
    }

    /// Position of a row in the unstrided fetch.
    pub fn ordinal_at(&self, at: impl Into<SampleRef>) -> Result<usize, ReplayError> {
        let row = self.resolve(at)?;
        Ok(self.populated()?.ordinals[row])
    }

    pub fn value_at(&self, at: impl Into<SampleRef>, attr: Attribute) -> Result<f64, ReplayError> {
        let row = self.resolve(at)?;
        Ok(self.populated()?.column(attr)?[row])
    }

    pub fn values_at(
        &self,
        at: impl Into<SampleRef>,
        attrs: &[Attribute],
    ) -> Result<Vec<f64>, ReplayError> {
        let row = self.resolve(at)?;
        let buffer = self.populated()?;
        attrs
            .iter()
            .map(|a| buffer.column(*a).map(|c| c[row]))
            .collect()
    }

    /// Timestamp and closing price of a sample.
    pub fn closing_values_at(
        &self,
        at: impl Into<SampleRef>,
    ) -> Result<(NaiveDateTime, f64), ReplayError> {
        let row = self.resolve(at)?;
        let buffer = self.populated()?;
        Ok((buffer.timevec[row], buffer.column(Attribute::Close)?[row]))
    }

    /// Whole buffered column.
    pub fn vector(&self, attr: Attribute) -> Result<&[f64], ReplayError> {
        self.populated()?.column(attr)
    }

    /// Column restricted to the local range.
    pub fn local_values(&self, attr: Attribute) -> Result<&[f64], ReplayError> {
        let buffer = self.populated()?;
        Ok(&buffer.column(attr)?[buffer.index_range.clone()])
    }

    pub fn timevec(&self) -> Result<&[NaiveDateTime], ReplayError> {
        Ok(&self.populated()?.timevec)
    }
}

/// Rows from the first at/after `begin` to the last at/before `end`.
fn local_rows(
    timevec: &[NaiveDateTime],
    begin: NaiveDateTime,
    end: NaiveDateTime,
) -> Option<RangeInclusive<usize>> {
    let first = timevec.partition_point(|t| *t < begin);
    let past = timevec.partition_point(|t| *t <= end);
    if past == 0 || first >= past {
        return None;
    }
    Some(first..=past - 1)
}

impl fmt::Display for Timeseries<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} {} data values",
            self.instrument,
            self.local_begin,
            self.local_end,
            self.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::log_return;
    use crate::domain::indicator::{Rsi, Sma};
    use approx::assert_relative_eq;
    use std::cell::Cell;

    struct VecStore {
        bars: Vec<Bar>,
        fetches: Cell<usize>,
    }

    impl VecStore {
        fn new(bars: Vec<Bar>) -> Self {
            Self {
                bars,
                fetches: Cell::new(0),
            }
        }
    }

    impl BarStore for VecStore {
        fn fetch_bars(
            &self,
            instrument: &str,
            _resolution: Resolution,
            begin: NaiveDateTime,
            end: NaiveDateTime,
        ) -> Result<Vec<Bar>, ReplayError> {
            self.fetches.set(self.fetches.get() + 1);
            Ok(self
                .bars
                .iter()
                .filter(|b| b.instrument == instrument && b.timestamp >= begin && b.timestamp <= end)
                .cloned()
                .collect())
        }

        fn latest_timestamp(
            &self,
            _instrument: &str,
            _resolution: Resolution,
        ) -> Result<Option<NaiveDateTime>, ReplayError> {
            Ok(self.bars.last().map(|b| b.timestamp))
        }

        fn list_instruments(&self) -> Result<Vec<String>, ReplayError> {
            Ok(vec!["IBM".into()])
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn now() -> NaiveDateTime {
        d(2030, 1, 1).and_hms_opt(0, 0, 0).unwrap()
    }

    fn bars_for(times: &[NaiveDateTime]) -> Vec<Bar> {
        let mut prev = None;
        times
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let close = 100.0 + i as f64;
                let bar = Bar {
                    instrument: "IBM".into(),
                    timestamp: *t,
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000,
                    logr: log_return(prev, close),
                };
                prev = Some(close);
                bar
            })
            .collect()
    }

    fn daily_bars(cal: &TradingCalendar, from: NaiveDate, to: NaiveDate) -> Vec<Bar> {
        let times: Vec<NaiveDateTime> = cal
            .sessions_between(from, to)
            .iter()
            .map(|s| s.and_time(NaiveTime::MIN))
            .collect();
        bars_for(&times)
    }

    fn options() -> TimeseriesOptions {
        TimeseriesOptions::default()
    }

    #[test]
    fn stride_keeps_every_nth_row() {
        let cal = TradingCalendar::default();
        let first = d(2024, 1, 2);
        let last = cal.shift_sessions(first, 49);
        let store = VecStore::new(daily_bars(&cal, first, last));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(first, last),
            Resolution::Daily,
            TimeseriesOptions {
                stride: 5,
                ..options()
            },
        )
        .unwrap();
        ts.populate(None).unwrap();

        assert_eq!(ts.len(), 10);
        let ordinals: Vec<usize> = (0..10usize).map(|r| ts.ordinal_at(r).unwrap()).collect();
        assert_eq!(ordinals, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);
        assert_eq!(ts.index_range().unwrap(), 0..=9);

        // Retained sessions resolve; skipped ones do not.
        let sixth = cal.shift_sessions(first, 5);
        assert_eq!(ts.resolve(sixth).unwrap(), 1);
        assert!(ts.resolve(cal.shift_sessions(first, 1)).is_err());
    }

    #[test]
    fn stride_offset_must_be_below_stride() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(vec![]);
        let ctx = DataContext::new(&store, &cal);
        let result = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Day(d(2024, 1, 2)),
            Resolution::Daily,
            TimeseriesOptions {
                stride: 2,
                stride_offset: 2,
                ..options()
            },
        );
        assert!(matches!(result, Err(ReplayError::Configuration { .. })));
    }

    #[test]
    fn daily_gap_is_missing_bars() {
        let cal = TradingCalendar::default();
        let mut bars = daily_bars(&cal, d(2024, 1, 2), d(2024, 1, 31));
        bars.retain(|b| b.timestamp.date() != d(2024, 1, 10));
        let store = VecStore::new(bars);
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 1, 2), d(2024, 1, 31)),
            Resolution::Daily,
            options(),
        )
        .unwrap();
        match ts.populate(None) {
            Err(ReplayError::MissingBars { missing, .. }) => {
                assert_eq!(
                    missing.sessions,
                    vec![d(2024, 1, 10).and_hms_opt(0, 0, 0).unwrap()]
                );
            }
            other => panic!("expected MissingBars, got {:?}", other.err()),
        }
    }

    #[test]
    fn bar_on_holiday_is_integrity_error() {
        let cal = TradingCalendar::with_holidays([d(2024, 1, 15)]);
        let plain = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&plain, d(2024, 1, 8), d(2024, 1, 19)));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 1, 8), d(2024, 1, 19)),
            Resolution::Daily,
            options(),
        )
        .unwrap();
        assert!(matches!(
            ts.populate(None),
            Err(ReplayError::DataIntegrity { .. })
        ));
    }

    #[test]
    fn empty_fetch_is_no_data() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(vec![]);
        let ctx = DataContext::new(&store, &cal).at(now());
        let result = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Day(d(2024, 1, 2)),
            Resolution::Daily,
            TimeseriesOptions {
                populate: true,
                ..options()
            },
        );
        assert!(matches!(result, Err(ReplayError::NoData { .. })));
    }

    #[test]
    fn pre_buffer_sits_ahead_of_local_range() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&cal, d(2023, 10, 2), d(2024, 3, 29)));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 2, 1), d(2024, 2, 29)),
            Resolution::Daily,
            TimeseriesOptions {
                pre_buffer: PreBuffer::Samples(10),
                post_buffer: 3,
                ..options()
            },
        )
        .unwrap();
        ts.populate(None).unwrap();

        let range = ts.index_range().unwrap();
        assert_eq!(*range.start(), 10);
        assert_eq!(ts.len() - 1 - *range.end(), 3);
        assert!(*range.end() < ts.len());
        assert_eq!(
            ts.time_at(*range.start()).unwrap(),
            d(2024, 2, 1).and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn repopulate_with_smaller_buffer_reuses_fetch() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&cal, d(2023, 10, 2), d(2024, 3, 29)));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 2, 1), d(2024, 2, 29)),
            Resolution::Daily,
            options(),
        )
        .unwrap();
        ts.populate(Some(20)).unwrap();
        ts.populate(Some(5)).unwrap();
        ts.populate(Some(20)).unwrap();
        assert_eq!(store.fetches.get(), 1);
        assert_eq!(*ts.index_range().unwrap().start(), 20);

        ts.populate(Some(30)).unwrap();
        assert_eq!(store.fetches.get(), 2);
        assert_eq!(*ts.index_range().unwrap().start(), 30);
    }

    #[test]
    fn apply_memoizes_and_falls_back_to_attributes() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&cal, d(2023, 10, 2), d(2024, 3, 29)));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 2, 1), d(2024, 2, 29)),
            Resolution::Daily,
            options(),
        )
        .unwrap();
        let local_len = {
            ts.populate(None).unwrap();
            ts.local_values(Attribute::Close).unwrap().len()
        };

        let short = ts
            .apply(&Sma, &Params::new().with("time_period", 5.0))
            .unwrap();
        assert_eq!(short.offset, 4);
        let long = ts
            .apply(&Sma, &Params::new().with("time_period", 10.0))
            .unwrap();
        assert_eq!(long.vector("sma").unwrap().len(), local_len);
        assert!(long.vector("sma").unwrap().iter().all(|v| v.is_finite()));

        // Most recent invocation wins.
        assert_eq!(ts.find_result("sma").unwrap().params.get("time_period"), Some(10.0));
        assert_eq!(ts.vector_for("sma").unwrap(), long.vector("sma").unwrap());
        assert_eq!(
            ts.vector_for(VectorKey::Of("sma", "sma")).unwrap().len(),
            local_len
        );

        // Raw attribute fallback and unknown names.
        assert_eq!(ts.vector_for("close").unwrap().len(), local_len);
        assert!(matches!(
            ts.vector_for("rvi"),
            Err(ReplayError::UnknownVector { .. })
        ));
        assert!(ts.vector_for(VectorKey::Of("rsi", "rsi")).is_err());

        ts.clear_results();
        assert!(ts.find_result("sma").is_none());
    }

    #[test]
    fn intraday_tolerated_gap_can_leave_too_little_history() {
        let cal = TradingCalendar::default();
        let day = d(2024, 1, 2);
        let mut times = cal.session_times(day, Resolution::ThirtyMinute);
        times.remove(5);
        let store = VecStore::new(bars_for(&times));
        let ctx = DataContext::new(&store, &cal).at(now());

        let mut strict = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Day(day),
            Resolution::ThirtyMinute,
            options(),
        )
        .unwrap();
        assert!(matches!(
            strict.populate(None),
            Err(ReplayError::MissingBars { .. })
        ));

        let mut tolerant = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Day(day),
            Resolution::ThirtyMinute,
            TimeseriesOptions {
                tolerate_gaps: true,
                ..options()
            },
        )
        .unwrap();
        tolerant.populate(None).unwrap();
        assert_eq!(tolerant.len(), 12);
        assert_eq!(tolerant.resolve(times[5]).unwrap(), 5);

        let err = tolerant
            .calc_indexes(&Rsi, &Params::new().with("time_period", 3.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::InsufficientSamples { have: 0, need: 3, .. }
        ));
    }

    #[test]
    fn accessors_resolve_index_time_and_date() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&cal, d(2024, 1, 2), d(2024, 1, 31)));
        let ctx = DataContext::new(&store, &cal).at(now());
        let ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 1, 2), d(2024, 1, 31)),
            Resolution::Daily,
            TimeseriesOptions {
                populate: true,
                price: PriceDerivation::Average,
                ..options()
            },
        )
        .unwrap();

        let (t, close) = ts.closing_values_at(d(2024, 1, 3)).unwrap();
        assert_eq!(t, d(2024, 1, 3).and_hms_opt(0, 0, 0).unwrap());
        assert_relative_eq!(close, 101.0);
        assert_relative_eq!(ts.value_at(1usize, Attribute::Price).unwrap(), 101.0);
        assert_eq!(
            ts.values_at(0usize, &[Attribute::High, Attribute::Low]).unwrap(),
            vec![101.0, 99.0]
        );
        // Saturday snaps to the nearest session (Friday).
        assert_eq!(ts.resolve(d(2024, 1, 6)).unwrap(), 3);

        assert!(matches!(
            ts.value_at(ts.len(), Attribute::Close),
            Err(ReplayError::OutOfRange { .. })
        ));
        assert!(matches!(
            ts.value_at(d(2024, 3, 1), Attribute::Close),
            Err(ReplayError::OutOfRange { .. })
        ));
        assert!(ts.to_string().starts_with("IBM 2024-01-02 00:00:00-2024-01-31 23:59:59"));
    }

    #[test]
    fn buffer_end_is_clamped_to_now() {
        let cal = TradingCalendar::default();
        let store = VecStore::new(daily_bars(&cal, d(2024, 1, 2), d(2024, 1, 12)));
        let ctx = DataContext::new(&store, &cal).at(d(2024, 1, 10).and_hms_opt(12, 0, 0).unwrap());
        let ts = Timeseries::new(
            ctx,
            "IBM",
            LocalRange::Dates(d(2024, 1, 2), d(2024, 1, 12)),
            Resolution::Daily,
            TimeseriesOptions {
                populate: true,
                ..options()
            },
        )
        .unwrap();
        assert_eq!(
            ts.time_at(ts.last_index().unwrap()).unwrap().date(),
            d(2024, 1, 10)
        );
    }

    #[test]
    fn pre_buffer_parse() {
        assert_eq!("default".parse::<PreBuffer>().unwrap().samples(), 50);
        assert_eq!("12".parse::<PreBuffer>().unwrap(), PreBuffer::Samples(12));
        assert!("lots".parse::<PreBuffer>().is_err());
    }
}
