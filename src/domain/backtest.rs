//! Multi-phase replay engine.
//!
//! A run takes a trigger, an entry and an exit strategy plus a population and
//! drives positions through four strictly sequential phases:
//!
//! 1. trigger: every instrument over the population range, once per pass
//! 2. open: each triggered position over its open window
//! 3. close: each opened position over its close window
//! 4. stop-loss: each closed position re-scanned at a finer resolution
//!
//! Phase 1 results (and the phase 2 work done with them) are cached per
//! (trigger strategy, population) in the position store.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::domain::bar::Attribute;
use crate::domain::error::ReplayError;
use crate::domain::population::Population;
use crate::domain::position::{Position, PositionState, Trigger};
use crate::domain::resolution::Resolution;
use crate::domain::stop_loss::{first_breach, scan_start, StopHit};
use crate::domain::strategy::{EntryRef, ExitRef, StrategyRegistry, TriggerRef};
use crate::domain::timeseries::{
    DataContext, LocalRange, PreBuffer, PriceDerivation, Timeseries, TimeseriesOptions,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::position_store::{PositionStore, TruncateScope};

pub const DEFAULT_DAYS_TO_OPEN: i64 = 5;
pub const DEFAULT_DAYS_TO_CLOSE: i64 = 30;
pub const DEFAULT_PASSES: RangeInclusive<u32> = 0..=2;
pub const DEFAULT_STOP_LOSS_MAX_DAYS: i64 = 30;
/// A stop-loss threshold of 100% never fires, so the phase is skipped.
pub const STOP_LOSS_DISABLED: f64 = 100.0;

/// What phase 1 does when an instrument's bars fail the calendar check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingBarsPolicy {
    #[default]
    Abort,
    SkipInstrument,
}

impl FromStr for MissingBarsPolicy {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(MissingBarsPolicy::Abort),
            "skip" | "skip_instrument" => Ok(MissingBarsPolicy::SkipInstrument),
            other => Err(ReplayError::configuration(format!(
                "on_missing_bars must be abort or skip, got '{other}'"
            ))),
        }
    }
}

/// Which per-position progress lines are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogDetail {
    pub basic: bool,
    pub entries: bool,
    pub exits: bool,
    pub stops: bool,
}

impl LogDetail {
    pub const NONE: LogDetail = LogDetail {
        basic: false,
        entries: false,
        exits: false,
        stops: false,
    };
    pub const ALL: LogDetail = LogDetail {
        basic: true,
        entries: true,
        exits: true,
        stops: true,
    };
}

impl FromStr for LogDetail {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut detail = LogDetail::NONE;
        for flag in s.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match flag.to_lowercase().as_str() {
                "none" => {}
                "all" => detail = LogDetail::ALL,
                "basic" => detail.basic = true,
                "entries" => detail.entries = true,
                "exits" => detail.exits = true,
                "stops" => detail.stops = true,
                other => {
                    return Err(ReplayError::configuration(format!(
                        "unknown log detail flag '{other}'"
                    )));
                }
            }
        }
        Ok(detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopLossConfig {
    /// Drawdown in percent; `100` disables the phase.
    pub threshold: f64,
    pub resolution: Resolution,
    pub max_days: i64,
    pub tolerate_gaps: bool,
}

impl StopLossConfig {
    pub fn enabled(&self) -> bool {
        self.threshold < STOP_LOSS_DISABLED
    }

    pub fn ratio(&self) -> f64 {
        self.threshold / 100.0
    }
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            threshold: STOP_LOSS_DISABLED,
            resolution: Resolution::ThirtyMinute,
            max_days: DEFAULT_STOP_LOSS_MAX_DAYS,
            tolerate_gaps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub resolution: Resolution,
    pub price: PriceDerivation,
    pub pre_buffer: PreBuffer,
    /// Sessions after the trigger in which an entry may confirm.
    pub days_to_open: i64,
    /// Sessions after the entry before a forced close.
    pub days_to_close: i64,
    pub passes: RangeInclusive<u32>,
    pub on_missing_bars: MissingBarsPolicy,
    /// Override the population's dates.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub stop_loss: StopLossConfig,
    pub log_detail: LogDetail,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Daily,
            price: PriceDerivation::Default,
            pre_buffer: PreBuffer::default(),
            days_to_open: DEFAULT_DAYS_TO_OPEN,
            days_to_close: DEFAULT_DAYS_TO_CLOSE,
            passes: DEFAULT_PASSES,
            on_missing_bars: MissingBarsPolicy::default(),
            start_date: None,
            end_date: None,
            stop_loss: StopLossConfig::default(),
            log_detail: LogDetail {
                basic: true,
                ..LogDetail::NONE
            },
        }
    }
}

fn parsed<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, ReplayError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ReplayError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

fn date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, ReplayError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| ReplayError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("{raw}: {e}"),
            }),
    }
}

/// Parse `a..b`, `a..=b` (both inclusive) or a single pass number.
pub fn parse_passes(s: &str) -> Result<RangeInclusive<u32>, ReplayError> {
    let invalid = || ReplayError::configuration(format!("passes must look like 0..2, got '{s}'"));
    let number = |v: &str| v.trim().parse::<u32>().map_err(|_| invalid());
    let range = match s.split_once("..") {
        Some((a, b)) => number(a)?..=number(b.trim_start_matches('='))?,
        None => {
            let n = number(s)?;
            n..=n
        }
    };
    if range.is_empty() {
        return Err(invalid());
    }
    Ok(range)
}

impl BacktestConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ReplayError> {
        let defaults = Self::default();
        let section = "backtest";
        let positive = |key: &str, default: i64| -> Result<i64, ReplayError> {
            let value = config.get_int(section, key, default);
            if value < 1 {
                return Err(ReplayError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.to_string(),
                    reason: format!("{key} must be at least 1"),
                });
            }
            Ok(value)
        };

        let passes = match config.get_string(section, "passes") {
            Some(raw) => parse_passes(&raw).map_err(|e| ReplayError::ConfigInvalid {
                section: section.to_string(),
                key: "passes".to_string(),
                reason: e.to_string(),
            })?,
            None => defaults.passes.clone(),
        };

        let stop_loss = StopLossConfig {
            threshold: config.get_double("stop_loss", "threshold", STOP_LOSS_DISABLED),
            resolution: parsed(config, "stop_loss", "resolution")?
                .unwrap_or(defaults.stop_loss.resolution),
            max_days: config.get_int("stop_loss", "max_days", DEFAULT_STOP_LOSS_MAX_DAYS),
            tolerate_gaps: config.get_bool("stop_loss", "tolerate_gaps", false),
        };

        Ok(Self {
            resolution: parsed(config, section, "resolution")?.unwrap_or(defaults.resolution),
            price: parsed(config, section, "price")?.unwrap_or_default(),
            pre_buffer: parsed(config, section, "pre_buffer")?.unwrap_or_default(),
            days_to_open: positive("days_to_open", DEFAULT_DAYS_TO_OPEN)?,
            days_to_close: positive("days_to_close", DEFAULT_DAYS_TO_CLOSE)?,
            passes,
            on_missing_bars: parsed(config, section, "on_missing_bars")?.unwrap_or_default(),
            start_date: date(config, section, "start_date")?,
            end_date: date(config, section, "end_date")?,
            stop_loss,
            log_detail: parsed(config, "log", "detail")?.unwrap_or(defaults.log_detail),
        })
    }

    fn series_options(&self) -> TimeseriesOptions {
        TimeseriesOptions {
            price: self.price.clone(),
            pre_buffer: self.pre_buffer,
            ..TimeseriesOptions::default()
        }
    }
}

/// Strategy names for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyNames {
    pub trigger: String,
    pub entry: String,
    pub exit: String,
}

impl StrategyNames {
    pub fn new(trigger: &str, entry: &str, exit: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            entry: entry.to_string(),
            exit: exit.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Trigger,
    Open,
    Close,
    StopLoss,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Trigger => "trigger",
            Phase::Open => "open",
            Phase::Close => "close",
            Phase::StopLoss => "stop-loss",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub triggered: usize,
    pub opened: usize,
    pub closed: usize,
    /// Positions removed because their bars could not be resolved.
    pub deleted: usize,
    pub stopped: usize,
    /// Phase 1 was served from the position store.
    pub cached: bool,
    pub timings: Vec<(Phase, Duration)>,
}

impl RunSummary {
    pub fn elapsed(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} triggered{}, {} opened, {} closed, {} stopped, {} deleted in {}",
            self.triggered,
            if self.cached { " (cached)" } else { "" },
            self.opened,
            self.closed,
            self.stopped,
            self.deleted,
            format_et(self.elapsed())
        )
    }
}

/// Human readable elapsed time.
pub fn format_et(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:2.2} seconds")
    } else if secs < 120.0 {
        format!("1 minute and {} seconds", (secs - 60.0) as u64)
    } else {
        let whole = secs as u64;
        format!("{} minutes and {} seconds", whole / 60, whole % 60)
    }
}

struct Resolved<'r> {
    trigger: TriggerRef<'r>,
    entry: EntryRef<'r>,
    exit: ExitRef<'r>,
}

pub struct Backtester<'a> {
    ctx: DataContext<'a>,
    positions: &'a dyn PositionStore,
    registry: &'a StrategyRegistry,
    config: BacktestConfig,
}

impl<'a> Backtester<'a> {
    pub fn new(
        ctx: DataContext<'a>,
        positions: &'a dyn PositionStore,
        registry: &'a StrategyRegistry,
        config: BacktestConfig,
    ) -> Self {
        Self {
            ctx,
            positions,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Resolve every strategy name before any phase runs.
    fn resolve(&self, names: &StrategyNames) -> Result<Resolved<'a>, ReplayError> {
        Ok(Resolved {
            trigger: self.registry.trigger(&names.trigger)?,
            entry: self.registry.entry(&names.entry)?,
            exit: self.registry.exit(&names.exit)?,
        })
    }

    /// Check that the names resolve without touching any data.
    pub fn validate(&self, names: &StrategyNames) -> Result<(), ReplayError> {
        self.resolve(names).map(|_| ())
    }

    pub fn truncate(&self, scope: &TruncateScope) -> Result<usize, ReplayError> {
        let removed = self.positions.truncate(scope)?;
        info!(%scope, removed, "truncated positions");
        Ok(removed)
    }

    pub fn run(
        &self,
        names: &StrategyNames,
        population: &Population,
    ) -> Result<RunSummary, ReplayError> {
        let strategies = self.resolve(names)?;
        let begin = self.config.start_date.unwrap_or(population.start_date);
        let end = self.config.end_date.unwrap_or(population.end_date);
        if begin > end {
            return Err(ReplayError::configuration(format!(
                "start date {begin} is after end date {end}"
            )));
        }

        let mut summary = RunSummary::default();
        let trigger_name = strategies.trigger.name();
        summary.cached = self
            .positions
            .is_trigger_cached(trigger_name, &population.name)?;

        if summary.cached {
            self.basic(format_args!(
                "trigger {trigger_name} over {} is cached, skipping the trigger and open phases",
                population.name
            ));
        } else {
            let started = Instant::now();
            let triggered = self.trigger_phase(strategies.trigger, population, begin, end)?;
            summary.triggered = triggered;
            self.finish_phase(&mut summary, Phase::Trigger, started, triggered);

            let started = Instant::now();
            let (opened, deleted) = self.open_phase(strategies.entry, trigger_name, population)?;
            summary.opened = opened;
            summary.deleted += deleted;
            self.finish_phase(&mut summary, Phase::Open, started, opened);

            self.positions
                .mark_trigger_cached(trigger_name, &population.name)?;
        }

        let started = Instant::now();
        let (closed, deleted) = self.close_phase(strategies.exit, trigger_name, population)?;
        summary.closed = closed;
        summary.deleted += deleted;
        self.finish_phase(&mut summary, Phase::Close, started, closed);

        if self.config.stop_loss.enabled() {
            let started = Instant::now();
            let stopped = self.stop_loss_phase(trigger_name, population)?;
            summary.stopped = stopped;
            self.finish_phase(&mut summary, Phase::StopLoss, started, stopped);
        }

        self.basic(format_args!("{} over {}: {summary}", trigger_name, population.name));
        Ok(summary)
    }

    fn basic(&self, message: fmt::Arguments<'_>) {
        if self.config.log_detail.basic {
            info!("{message}");
        }
    }

    fn finish_phase(&self, summary: &mut RunSummary, phase: Phase, started: Instant, count: usize) {
        let elapsed = started.elapsed();
        summary.timings.push((phase, elapsed));
        self.basic(format_args!(
            "{phase} phase: {count} positions in {}",
            format_et(elapsed)
        ));
    }

    fn stored(&self, trigger: &str, population: &Population) -> Result<Vec<Position>, ReplayError> {
        self.positions.positions(trigger, &population.name)
    }

    fn trigger_phase(
        &self,
        trigger: TriggerRef<'_>,
        population: &Population,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, ReplayError> {
        // Without a cache marker, anything stored is left over from an
        // interrupted run.
        let stale = self.stored(trigger.name(), population)?;
        if !stale.is_empty() {
            warn!(trigger = trigger.name(), population = %population.name, count = stale.len(),
                "discarding positions of an unfinished run");
            for position in &stale {
                self.positions.delete(position.id)?;
            }
        }

        let mut created = 0;
        for instrument in &population.instruments {
            match self.trigger_instrument(trigger, population, instrument, begin, end) {
                Ok(n) => created += n,
                Err(e)
                    if e.is_data_error()
                        && self.config.on_missing_bars == MissingBarsPolicy::SkipInstrument =>
                {
                    warn!(%instrument, error = %e, "skipping instrument");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Evaluate every pass over one instrument. A session triggered by an
    /// earlier pass is not triggered again.
    fn trigger_instrument(
        &self,
        trigger: TriggerRef<'_>,
        population: &Population,
        instrument: &str,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, ReplayError> {
        let mut ts = Timeseries::new(
            self.ctx,
            instrument,
            LocalRange::Dates(begin, end),
            self.config.resolution,
            self.config.series_options(),
        )?;
        ts.populate(None)?;

        let mut seen: BTreeSet<NaiveDateTime> = BTreeSet::new();
        let mut created = 0;
        for pass in self.config.passes.clone() {
            let rows = trigger.evaluate(&mut ts, pass)?;
            for row in rows {
                let (at, price) = ts.closing_values_at(row)?;
                if !seen.insert(at) {
                    continue;
                }
                let position = Position::triggered(
                    instrument,
                    trigger.name(),
                    &population.name,
                    pass,
                    Trigger { at, price },
                    trigger.binding.short,
                );
                let id = self.positions.insert(&position)?;
                debug!(id, %instrument, %at, pass, "triggered");
                created += 1;
            }
        }
        Ok(created)
    }

    fn open_phase(
        &self,
        entry: EntryRef<'_>,
        trigger: &str,
        population: &Population,
    ) -> Result<(usize, usize), ReplayError> {
        let mut opened = 0;
        let mut deleted = 0;
        for mut position in self.stored(trigger, population)? {
            if !position.is_triggered() {
                continue;
            }
            match self.open_position(entry, &mut position) {
                Ok(true) => {
                    self.positions.update(&position)?;
                    opened += 1;
                }
                Ok(false) => {
                    if self.config.log_detail.entries {
                        info!(id = position.id, instrument = %position.instrument, "not entered");
                    }
                }
                Err(e) if e.is_data_error() => {
                    warn!(id = position.id, instrument = %position.instrument, error = %e,
                        "deleting position: cannot resolve open window");
                    self.positions.delete(position.id)?;
                    deleted += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((opened, deleted))
    }

    fn open_position(&self, entry: EntryRef<'_>, position: &mut Position) -> Result<bool, ReplayError> {
        let trigger_date = position.trigger.at.date();
        let last = self
            .ctx
            .calendar
            .shift_sessions(trigger_date, self.config.days_to_open);
        let mut ts = Timeseries::new(
            self.ctx,
            &position.instrument,
            LocalRange::Dates(trigger_date, last),
            self.config.resolution,
            self.config.series_options(),
        )?;
        ts.populate(None)?;

        for row in entry.evaluate(&mut ts)? {
            let (at, price) = ts.closing_values_at(row)?;
            if at <= position.trigger.at {
                continue;
            }
            position.open(at, price, self.ctx.calendar)?;
            position.entry_strategy = Some(entry.name().to_string());
            if self.config.log_detail.entries {
                info!(id = position.id, instrument = %position.instrument, %at, price, "entered");
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn close_phase(
        &self,
        exit: ExitRef<'_>,
        trigger: &str,
        population: &Population,
    ) -> Result<(usize, usize), ReplayError> {
        let mut closed = 0;
        let mut deleted = 0;
        for mut position in self.stored(trigger, population)? {
            if !position.is_opened() {
                continue;
            }
            match self.close_position(exit, &mut position) {
                Ok(()) => {
                    self.positions.update(&position)?;
                    closed += 1;
                }
                Err(e) if e.is_data_error() => {
                    warn!(id = position.id, instrument = %position.instrument, error = %e,
                        "deleting position: cannot resolve close window");
                    self.positions.delete(position.id)?;
                    deleted += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((closed, deleted))
    }

    fn close_position(&self, exit: ExitRef<'_>, position: &mut Position) -> Result<(), ReplayError> {
        let entry = match &position.state {
            PositionState::Opened { entry } => *entry,
            other => {
                return Err(ReplayError::InvalidTransition {
                    id: position.id,
                    reason: format!("cannot close a {} position", other.name()),
                });
            }
        };
        let entry_date = entry.at.date();
        let mut last = self
            .ctx
            .calendar
            .shift_sessions(entry_date, self.config.days_to_close);
        if last.and_time(NaiveTime::MIN) > self.ctx.now {
            let latest = self
                .ctx
                .store
                .latest_timestamp(&position.instrument, self.config.resolution)?;
            last = latest.map_or(entry_date, |t| t.date().clamp(entry_date, last));
        }

        let mut ts = Timeseries::new(
            self.ctx,
            &position.instrument,
            LocalRange::Dates(entry_date, last),
            self.config.resolution,
            self.config.series_options(),
        )?;
        ts.populate(None)?;

        for signal in exit.evaluate(&mut ts)? {
            let (at, price) = ts.closing_values_at(signal.row)?;
            if at <= entry.at {
                continue;
            }
            position.close(at, price, self.ctx.calendar, true, signal.indicator)?;
            position.exit_strategy = Some(exit.name().to_string());
            if self.config.log_detail.exits {
                info!(id = position.id, instrument = %position.instrument, %at, price, "exited");
            }
            return Ok(());
        }

        let boundary = *ts.index_range()?.end();
        let (at, price) = ts.closing_values_at(boundary)?;
        position.close(at, price, self.ctx.calendar, false, None)?;
        position.exit_strategy = Some(exit.name().to_string());
        if self.config.log_detail.exits {
            info!(id = position.id, instrument = %position.instrument, %at, price, "force closed");
        }
        Ok(())
    }

    fn stop_loss_phase(&self, trigger: &str, population: &Population) -> Result<usize, ReplayError> {
        let mut stopped = 0;
        for mut position in self.stored(trigger, population)? {
            if !matches!(position.state, PositionState::Closed { .. }) {
                continue;
            }
            let hit = match self.scan_stop(&position) {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(e) => {
                    warn!(id = position.id, instrument = %position.instrument, error = %e,
                        "stop-loss scan failed, keeping exit");
                    continue;
                }
            };
            let (at, hit) = hit;
            if let Err(e) = position.stop_out(at, hit.low, hit.ratio, self.ctx.calendar) {
                warn!(id = position.id, error = %e, "stop-loss not applied");
                continue;
            }
            self.positions.update(&position)?;
            stopped += 1;
            if self.config.log_detail.stops {
                info!(id = position.id, instrument = %position.instrument, %at,
                    price = hit.low, ratio = hit.ratio, "stopped out");
            }
        }
        Ok(stopped)
    }

    fn scan_stop(&self, position: &Position) -> Result<Option<(NaiveDateTime, StopHit)>, ReplayError> {
        let (entry, exit) = match &position.state {
            PositionState::Closed { entry, exit } => (*entry, exit),
            _ => return Ok(None),
        };
        let calendar = self.ctx.calendar;
        let resolution = self.config.stop_loss.resolution;
        let start = scan_start(calendar, entry.at, resolution);
        let limit = calendar.shift_sessions(entry.at.date(), self.config.stop_loss.max_days);
        let last = exit.exited_at.date().min(limit);
        if start.date() > last {
            return Ok(None);
        }

        let mut ts = Timeseries::new(
            self.ctx,
            &position.instrument,
            LocalRange::Dates(start.date(), last),
            resolution,
            TimeseriesOptions {
                tolerate_gaps: self.config.stop_loss.tolerate_gaps,
                ..TimeseriesOptions::default()
            },
        )?;
        ts.populate(None)?;

        let times = ts.timevec()?;
        let highs = ts.vector(Attribute::High)?;
        let lows = ts.vector(Attribute::Low)?;
        let samples = ts
            .index_range()?
            .filter(|row| times[*row] >= start)
            .map(|row| (row, highs[row], lows[row]));
        Ok(first_breach(entry.price, samples, self.config.stop_loss.ratio())
            .map(|hit| (times[hit.row], hit)))
    }
}
