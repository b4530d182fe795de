//! Supported bar resolutions.

use chrono::Duration;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ReplayError;

/// Length of one trading session in minutes (6h30m).
pub const TRADING_PERIOD_MINUTES: i64 = 390;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Daily,
    ThirtyMinute,
    FiveMinute,
    OneMinute,
}

impl Resolution {
    pub fn is_daily(&self) -> bool {
        matches!(self, Resolution::Daily)
    }

    /// Interval between consecutive bars. Daily bars advance one session.
    pub fn interval(&self) -> Duration {
        match self {
            Resolution::Daily => Duration::days(1),
            Resolution::ThirtyMinute => Duration::minutes(30),
            Resolution::FiveMinute => Duration::minutes(5),
            Resolution::OneMinute => Duration::minutes(1),
        }
    }

    pub fn sessions_per_day(&self) -> usize {
        match self {
            Resolution::Daily => 1,
            other => (TRADING_PERIOD_MINUTES / other.interval().num_minutes()) as usize,
        }
    }

    /// Trading days needed to hold `samples` bars at this resolution.
    pub fn days_for_samples(&self, samples: usize) -> usize {
        samples.div_ceil(self.sessions_per_day())
    }

    /// Stable short name used in stores and file names.
    pub fn code(&self) -> &'static str {
        match self {
            Resolution::Daily => "1d",
            Resolution::ThirtyMinute => "30m",
            Resolution::FiveMinute => "5m",
            Resolution::OneMinute => "1m",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Resolution {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" | "daily" | "day" => Ok(Resolution::Daily),
            "30m" | "30min" | "thirty_minute" => Ok(Resolution::ThirtyMinute),
            "5m" | "5min" | "five_minute" => Ok(Resolution::FiveMinute),
            "1m" | "1min" | "one_minute" => Ok(Resolution::OneMinute),
            other => Err(ReplayError::configuration(format!(
                "a sampling resolution of {other} is not available"
            ))),
        }
    }
}
