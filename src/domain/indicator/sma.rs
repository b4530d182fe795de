//! Simple Moving Average.
//!
//! Sliding window sum; the first (n-1) samples are warm-up.

use crate::domain::error::ReplayError;
use crate::domain::indicator::{require_period, IndicatorFunction, IndicatorOutput};
use crate::domain::params::Params;

pub const DEFAULT_PERIOD: usize = 20;

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let mut window_sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        window_sum += v;
        if i >= period {
            window_sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = window_sum / period as f64;
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Sma;

impl IndicatorFunction for Sma {
    fn name(&self) -> &'static str {
        "sma"
    }

    fn min_samples(&self, params: &Params) -> Result<usize, ReplayError> {
        let period = params.usize_or("time_period", DEFAULT_PERIOD)?;
        Ok(period.saturating_sub(1))
    }

    fn compute(&self, input: &[f64], params: &Params) -> Result<IndicatorOutput, ReplayError> {
        let period = require_period(
            "sma",
            "time_period",
            params.usize_or("time_period", DEFAULT_PERIOD)?,
        )?;
        Ok(IndicatorOutput::single("sma", calculate_sma(input, period)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_and_values() {
        let out = calculate_sma(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_relative_eq!(out[2], 20.0);
        assert_relative_eq!(out[3], 30.0);
        assert_relative_eq!(out[4], 40.0);
    }

    #[test]
    fn sma_period_1_is_identity() {
        let out = calculate_sma(&[3.0, 5.0], 1);
        assert_eq!(out, vec![3.0, 5.0]);
    }

    #[test]
    fn sma_shorter_than_period() {
        let out = calculate_sma(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
