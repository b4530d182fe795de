//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9.
//! Warm-up: max(fast, slow) - 1 + signal - 1 samples.
//!
//! The result always carries an over-crossing threshold on the histogram at
//! `threshold` (0 unless given).

use crate::domain::error::ReplayError;
use crate::domain::indicator::{
    calculate_ema, require_period, IndicatorFunction, IndicatorOutput, Threshold,
};
use crate::domain::params::Params;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdLines {
    let n = values.len();
    let mut lines = MacdLines {
        line: vec![f64::NAN; n],
        signal: vec![f64::NAN; n],
        histogram: vec![f64::NAN; n],
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        return lines;
    }

    let ema_fast = calculate_ema(values, fast);
    let ema_slow = calculate_ema(values, slow);
    for i in 0..n {
        lines.line[i] = ema_fast[i] - ema_slow[i];
    }

    let macd_warmup = fast.max(slow) - 1;
    if n > macd_warmup {
        let signal = calculate_ema(&lines.line[macd_warmup..], signal_period);
        for (k, v) in signal.into_iter().enumerate() {
            lines.signal[macd_warmup + k] = v;
        }
    }
    for i in 0..n {
        lines.histogram[i] = lines.line[i] - lines.signal[i];
    }
    lines
}

#[derive(Debug, Clone, Copy)]
pub struct Macd;

impl Macd {
    fn periods(params: &Params) -> Result<(usize, usize, usize), ReplayError> {
        Ok((
            params.usize_or("fast_period", DEFAULT_FAST)?,
            params.usize_or("slow_period", DEFAULT_SLOW)?,
            params.usize_or("signal_period", DEFAULT_SIGNAL)?,
        ))
    }
}

impl IndicatorFunction for Macd {
    fn name(&self) -> &'static str {
        "macd"
    }

    fn min_samples(&self, params: &Params) -> Result<usize, ReplayError> {
        let (fast, slow, signal) = Self::periods(params)?;
        Ok((fast.max(slow) + signal).saturating_sub(2))
    }

    fn compute(&self, input: &[f64], params: &Params) -> Result<IndicatorOutput, ReplayError> {
        let (fast, slow, signal) = Self::periods(params)?;
        require_period("macd", "fast_period", fast)?;
        require_period("macd", "slow_period", slow)?;
        require_period("macd", "signal_period", signal)?;

        let lines = calculate_macd(input, fast, slow, signal);
        Ok(IndicatorOutput {
            vectors: vec![
                ("macd".to_string(), lines.line),
                ("macd_signal".to_string(), lines.signal),
                ("macd_hist".to_string(), lines.histogram),
            ],
            threshold: Some(Threshold::over("macd_hist", params.f64_or("threshold", 0.0))),
        })
    }
}
