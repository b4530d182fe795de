//! Technical indicators over a timeseries' sample vectors.
//!
//! Every indicator implements [`IndicatorFunction`]: a pure function from an
//! input vector plus [`Params`] to named output vectors, optionally carrying a
//! [`Threshold`] whose crossings the timeseries records alongside the result.
//! Warm-up samples are `NaN`; [`IndicatorFunction::min_samples`] tells the
//! timeseries how much pre-buffer it must fetch so the local window is clear
//! of them.

pub mod crossing;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use crossing::{crossings, Direction, Threshold};
pub use ema::{calculate_ema, Ema};
pub use macd::{calculate_macd, Macd};
pub use rsi::{calculate_rsi, Rsi};
pub use sma::{calculate_sma, Sma};

use crate::domain::bar::Attribute;
use crate::domain::error::ReplayError;
use crate::domain::params::Params;

/// Named output vectors of one indicator invocation, aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub vectors: Vec<(String, Vec<f64>)>,
    pub threshold: Option<Threshold>,
}

impl IndicatorOutput {
    pub fn single(name: &str, values: Vec<f64>) -> Self {
        Self {
            vectors: vec![(name.to_string(), values)],
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Option<Threshold>) -> Self {
        self.threshold = threshold;
        self
    }
}

pub trait IndicatorFunction {
    fn name(&self) -> &'static str;

    /// The attribute the indicator reads.
    fn source(&self) -> Attribute {
        Attribute::Price
    }

    /// Samples consumed before the first valid output.
    fn min_samples(&self, params: &Params) -> Result<usize, ReplayError>;

    fn compute(&self, input: &[f64], params: &Params) -> Result<IndicatorOutput, ReplayError>;
}

/// Built-in indicator by name.
pub fn builtin(name: &str) -> Option<&'static dyn IndicatorFunction> {
    match name.to_lowercase().as_str() {
        "sma" => Some(&Sma),
        "ema" => Some(&Ema),
        "rsi" => Some(&Rsi),
        "macd" => Some(&Macd),
        _ => None,
    }
}

pub(crate) fn require_period(name: &str, key: &str, period: usize) -> Result<usize, ReplayError> {
    if period == 0 {
        return Err(ReplayError::configuration(format!(
            "{name}: parameter '{key}' must be at least 1"
        )));
    }
    Ok(period)
}
