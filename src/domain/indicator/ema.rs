//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n samples, then
//! EMA[i] = P[i]*k + EMA[i-1]*(1-k). The first (n-1) samples are warm-up.

use crate::domain::error::ReplayError;
use crate::domain::indicator::{require_period, IndicatorFunction, IndicatorOutput};
use crate::domain::params::Params;

pub const DEFAULT_PERIOD: usize = 20;

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, v) in values.iter().enumerate() {
        if i < period - 1 {
            sum += v;
        } else if i == period - 1 {
            sum += v;
            ema = sum / period as f64;
            out[i] = ema;
        } else {
            ema = v * k + ema * (1.0 - k);
            out[i] = ema;
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Ema;

impl IndicatorFunction for Ema {
    fn name(&self) -> &'static str {
        "ema"
    }

    fn min_samples(&self, params: &Params) -> Result<usize, ReplayError> {
        let period = params.usize_or("time_period", DEFAULT_PERIOD)?;
        Ok(period.saturating_sub(1))
    }

    fn compute(&self, input: &[f64], params: &Params) -> Result<IndicatorOutput, ReplayError> {
        let period = require_period(
            "ema",
            "time_period",
            params.usize_or("time_period", DEFAULT_PERIOD)?,
        )?;
        Ok(IndicatorOutput::single("ema", calculate_ema(input, period)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ema_warmup() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!(out[2..].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = calculate_ema(&[10.0, 20.0, 30.0], 3);
        assert_relative_eq!(out[2], 20.0);
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = calculate_ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        let k = 2.0 / 4.0;
        let ema_3 = 40.0 * k + 20.0 * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert_relative_eq!(out[3], ema_3);
        assert_relative_eq!(out[4], ema_4);
    }

    #[test]
    fn ema_equal_prices() {
        let out = calculate_ema(&[100.0; 5], 3);
        for v in &out[2..] {
            assert_relative_eq!(*v, 100.0);
        }
    }

    #[test]
    fn ema_empty_and_zero_period() {
        assert!(calculate_ema(&[], 3).is_empty());
        assert!(calculate_ema(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }
}
