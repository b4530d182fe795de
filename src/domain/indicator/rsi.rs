//! Relative Strength Index with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)), 100 when avg_loss == 0.
//! The first n samples are warm-up.
//!
//! A `threshold` parameter attaches crossing metadata to the result; the
//! crossing direction is under unless `cross` is positive.

use crate::domain::error::ReplayError;
use crate::domain::indicator::{require_period, IndicatorFunction, IndicatorOutput, Threshold};
use crate::domain::params::Params;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|c| gain(*c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| loss(*c)).sum::<f64>() / period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for (i, change) in changes.iter().enumerate().skip(period) {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(*change)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(*change)) / period as f64;
        out[i + 1] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rsi;

impl IndicatorFunction for Rsi {
    fn name(&self) -> &'static str {
        "rsi"
    }

    fn min_samples(&self, params: &Params) -> Result<usize, ReplayError> {
        params.usize_or("time_period", DEFAULT_PERIOD)
    }

    fn compute(&self, input: &[f64], params: &Params) -> Result<IndicatorOutput, ReplayError> {
        let period = require_period(
            "rsi",
            "time_period",
            params.usize_or("time_period", DEFAULT_PERIOD)?,
        )?;
        let threshold = params.get("threshold").map(|level| {
            if params.f64_or("cross", -1.0) > 0.0 {
                Threshold::over("rsi", level)
            } else {
                Threshold::under("rsi", level)
            }
        });
        Ok(IndicatorOutput::single("rsi", calculate_rsi(input, period)).with_threshold(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::Direction;
    use approx::assert_relative_eq;

    #[test]
    fn rsi_warmup_period() {
        let values: Vec<f64> = (1..=15).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        let out = calculate_rsi(&values, 14);
        assert_eq!(out.len(), 15);
        assert!(out[..14].iter().all(|v| v.is_nan()));
        assert!(out[14].is_finite());
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let values: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert_relative_eq!(calculate_rsi(&values, 14)[14], 100.0);
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let values: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        assert_relative_eq!(calculate_rsi(&values, 14)[14], 0.0);
    }

    #[test]
    fn rsi_in_range() {
        let values: Vec<f64> = (1..=40)
            .map(|i| 100.0 + ((i % 7) as f64 - 3.0) * 2.0)
            .collect();
        for v in calculate_rsi(&values, 14).iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_known_calculation() {
        let values = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let rsi = calculate_rsi(&values, 14)[14];
        assert!(rsi > 50.0 && rsi < 100.0, "RSI should be in bullish territory");
    }

    #[test]
    fn threshold_metadata_follows_params() {
        let values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let under = Rsi
            .compute(&values, &Params::new().with("threshold", 30.0))
            .unwrap();
        assert_eq!(under.threshold.unwrap().direction, Direction::Under);

        let over = Rsi
            .compute(&values, &Params::new().with("threshold", 70.0).with("cross", 1.0))
            .unwrap();
        assert_eq!(over.threshold.unwrap().direction, Direction::Over);

        let none = Rsi.compute(&values, &Params::new()).unwrap();
        assert!(none.threshold.is_none());
    }
}
