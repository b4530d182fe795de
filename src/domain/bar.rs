//! Price bar representation and bar attributes.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::ReplayError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub instrument: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub logr: f64,
}

impl Bar {
    /// (high + low) / 2
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// (open + high + low + close) / 4
    pub fn average_price(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    pub fn value(&self, attr: Attribute) -> Option<f64> {
        match attr {
            Attribute::Open => Some(self.open),
            Attribute::High => Some(self.high),
            Attribute::Low => Some(self.low),
            Attribute::Close => Some(self.close),
            Attribute::Volume => Some(self.volume as f64),
            Attribute::Logr => Some(self.logr),
            Attribute::Price => None,
        }
    }
}

/// ln(close / prev_close); zero for the first bar of a series.
pub fn log_return(prev_close: Option<f64>, close: f64) -> f64 {
    match prev_close {
        Some(prev) if prev > 0.0 && close > 0.0 => (close / prev).ln(),
        _ => 0.0,
    }
}

/// Named per-sample vectors a timeseries carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Open,
    High,
    Low,
    Close,
    Volume,
    Logr,
    /// Derived from the other attributes according to the price setting.
    Price,
}

impl Attribute {
    pub const RAW: [Attribute; 6] = [
        Attribute::Open,
        Attribute::High,
        Attribute::Low,
        Attribute::Close,
        Attribute::Volume,
        Attribute::Logr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Open => "open",
            Attribute::High => "high",
            Attribute::Low => "low",
            Attribute::Close => "close",
            Attribute::Volume => "volume",
            Attribute::Logr => "logr",
            Attribute::Price => "price",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Attribute::Open),
            "high" => Ok(Attribute::High),
            "low" => Ok(Attribute::Low),
            "close" => Ok(Attribute::Close),
            "volume" => Ok(Attribute::Volume),
            "logr" => Ok(Attribute::Logr),
            "price" => Ok(Attribute::Price),
            other => Err(ReplayError::UnknownVector {
                name: other.to_string(),
            }),
        }
    }
}
