//! Simulated trade lifecycle.
//!
//! A position moves Triggered -> Opened -> Closed, and a closed position may
//! be re-closed by the stop-loss pass as StopLossClosed. Transitions check the
//! source state and that time moves forward; anything else is an
//! `InvalidTransition`.

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::ReplayError;

pub type PositionId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub at: NaiveDateTime,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub at: NaiveDateTime,
    pub price: f64,
    /// Trading sessions between trigger and entry.
    pub delay: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    pub exited_at: NaiveDateTime,
    pub exit_price: f64,
    pub days_held: i64,
    /// `roi` per trading day held; raw `roi` for same-day exits.
    pub net_return: f64,
    pub roi: f64,
    /// False when the position was force-closed at the end of its window.
    pub signalled: bool,
    pub indicator: Option<String>,
}

impl Exit {
    fn new(
        entry: &Entry,
        short: bool,
        at: NaiveDateTime,
        price: f64,
        calendar: &TradingCalendar,
        signalled: bool,
        indicator: Option<String>,
    ) -> Self {
        let days_held = calendar.session_count(entry.at.date(), at.date());
        let mut roi = (price - entry.price) / entry.price;
        if short && roi != 0.0 {
            roi = -roi;
        }
        let net_return = if days_held > 0 {
            roi / days_held as f64
        } else {
            roi
        };
        Self {
            exited_at: at,
            exit_price: price,
            days_held,
            net_return,
            roi,
            signalled,
            indicator,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionState {
    Triggered,
    Opened {
        entry: Entry,
    },
    Closed {
        entry: Entry,
        exit: Exit,
    },
    StopLossClosed {
        entry: Entry,
        exit: Exit,
        /// Drawdown ratio that fired the stop.
        trigger_ratio: f64,
    },
}

impl PositionState {
    pub fn name(&self) -> &'static str {
        match self {
            PositionState::Triggered => "triggered",
            PositionState::Opened { .. } => "opened",
            PositionState::Closed { .. } => "closed",
            PositionState::StopLossClosed { .. } => "stop_loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub instrument: String,
    pub pass: u32,
    pub trigger: Trigger,
    pub short: bool,
    pub trigger_strategy: String,
    pub population: String,
    pub entry_strategy: Option<String>,
    pub exit_strategy: Option<String>,
    pub state: PositionState,
}

impl Position {
    /// A freshly triggered position. The store assigns the id on insert.
    pub fn triggered(
        instrument: &str,
        trigger_strategy: &str,
        population: &str,
        pass: u32,
        trigger: Trigger,
        short: bool,
    ) -> Self {
        Self {
            id: 0,
            instrument: instrument.to_string(),
            pass,
            trigger,
            short,
            trigger_strategy: trigger_strategy.to_string(),
            population: population.to_string(),
            entry_strategy: None,
            exit_strategy: None,
            state: PositionState::Triggered,
        }
    }

    fn invalid(&self, reason: String) -> ReplayError {
        ReplayError::InvalidTransition {
            id: self.id,
            reason,
        }
    }

    pub fn open(
        &mut self,
        at: NaiveDateTime,
        price: f64,
        calendar: &TradingCalendar,
    ) -> Result<(), ReplayError> {
        if self.state != PositionState::Triggered {
            return Err(self.invalid(format!("cannot open a {} position", self.state.name())));
        }
        if at <= self.trigger.at {
            return Err(self.invalid(format!(
                "entry at {at} does not follow trigger at {}",
                self.trigger.at
            )));
        }
        let delay = calendar.session_count(self.trigger.at.date(), at.date());
        self.state = PositionState::Opened {
            entry: Entry { at, price, delay },
        };
        Ok(())
    }

    /// Close an opened position. A forced (unsignalled) close may share the
    /// entry timestamp when no later bar exists.
    pub fn close(
        &mut self,
        at: NaiveDateTime,
        price: f64,
        calendar: &TradingCalendar,
        signalled: bool,
        indicator: Option<String>,
    ) -> Result<(), ReplayError> {
        let entry = match &self.state {
            PositionState::Opened { entry } => *entry,
            other => {
                return Err(self.invalid(format!("cannot close a {} position", other.name())));
            }
        };
        if at < entry.at || (at == entry.at && signalled) {
            return Err(self.invalid(format!(
                "exit at {at} does not follow entry at {}",
                entry.at
            )));
        }
        let exit = Exit::new(&entry, self.short, at, price, calendar, signalled, indicator);
        self.state = PositionState::Closed { entry, exit };
        Ok(())
    }

    /// Replace the exit of a closed position with a stop-loss exit.
    pub fn stop_out(
        &mut self,
        at: NaiveDateTime,
        price: f64,
        trigger_ratio: f64,
        calendar: &TradingCalendar,
    ) -> Result<(), ReplayError> {
        let entry = match &self.state {
            PositionState::Closed { entry, .. } => *entry,
            other => {
                return Err(self.invalid(format!("cannot stop out a {} position", other.name())));
            }
        };
        if at <= entry.at {
            return Err(self.invalid(format!(
                "stop at {at} does not follow entry at {}",
                entry.at
            )));
        }
        let exit = Exit::new(
            &entry,
            self.short,
            at,
            price,
            calendar,
            true,
            Some("stop_loss".to_string()),
        );
        self.state = PositionState::StopLossClosed {
            entry,
            exit,
            trigger_ratio,
        };
        Ok(())
    }

    pub fn entry(&self) -> Option<&Entry> {
        match &self.state {
            PositionState::Triggered => None,
            PositionState::Opened { entry }
            | PositionState::Closed { entry, .. }
            | PositionState::StopLossClosed { entry, .. } => Some(entry),
        }
    }

    pub fn exit(&self) -> Option<&Exit> {
        match &self.state {
            PositionState::Closed { exit, .. } | PositionState::StopLossClosed { exit, .. } => {
                Some(exit)
            }
            _ => None,
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.state, PositionState::Triggered)
    }

    pub fn is_opened(&self) -> bool {
        matches!(self.state, PositionState::Opened { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.exit().is_some()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} pass {} {} triggered {} @ {:.2}",
            self.id,
            self.instrument,
            self.pass,
            self.state.name(),
            self.trigger.at.format("%Y-%m-%d"),
            self.trigger.price
        )?;
        if let Some(entry) = self.entry() {
            write!(
                f,
                ", entered {} @ {:.2} (+{})",
                entry.at.format("%Y-%m-%d %H:%M"),
                entry.price,
                entry.delay
            )?;
        }
        if let Some(exit) = self.exit() {
            write!(
                f,
                ", exited {} @ {:.2} after {} days, roi {:.2}%",
                exit.exited_at.format("%Y-%m-%d %H:%M"),
                exit.exit_price,
                exit.days_held,
                exit.roi * 100.0
            )?;
        }
        Ok(())
    }
}
