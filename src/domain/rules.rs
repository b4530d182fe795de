//! Built-in strategy rules.
//!
//! Rules run against a timeseries whose local range is the window being
//! evaluated and return buffer rows (see [`Timeseries`]). They never look at
//! rows outside the local range.

use crate::domain::bar::Attribute;
use crate::domain::error::ReplayError;
use crate::domain::indicator::{Macd, Rsi, Sma};
use crate::domain::params::Params;
use crate::domain::strategy::{Evaluation, ExitSignal, StrategyKind};
use crate::domain::timeseries::Timeseries;

pub const DEFAULT_PASS_STEP: f64 = 5.0;
pub const DEFAULT_RSI_PERIOD: f64 = 14.0;
pub const DEFAULT_SMA_PERIOD: f64 = 20.0;
pub const DEFAULT_RSI_EXIT_THRESHOLD: f64 = 70.0;

/// Rule names available for each strategy kind.
pub fn catalogue(kind: StrategyKind) -> &'static [&'static str] {
    match kind {
        StrategyKind::Trigger => &["rsi_under", "close_below_sma"],
        StrategyKind::Entry => &["rsi_cross_up", "close_up", "immediate"],
        StrategyKind::Exit => &["indicator_crossing", "rsi_over", "hold"],
    }
}

pub fn lookup(kind: StrategyKind, rule: &str) -> Option<Evaluation> {
    let evaluation = match (kind, rule) {
        (StrategyKind::Trigger, "rsi_under") => Evaluation::trigger(rsi_under),
        (StrategyKind::Trigger, "close_below_sma") => Evaluation::trigger(close_below_sma),
        (StrategyKind::Entry, "rsi_cross_up") => Evaluation::entry(rsi_cross_up),
        (StrategyKind::Entry, "close_up") => Evaluation::entry(close_up),
        (StrategyKind::Entry, "immediate") => Evaluation::entry(immediate),
        (StrategyKind::Exit, "indicator_crossing") => Evaluation::exit(indicator_crossing),
        (StrategyKind::Exit, "rsi_over") => Evaluation::exit(rsi_over),
        (StrategyKind::Exit, "hold") => Evaluation::exit(hold),
        _ => return None,
    };
    Some(evaluation)
}

fn rsi_params(params: &Params) -> Params {
    Params::new().with(
        "time_period",
        params.f64_or("time_period", DEFAULT_RSI_PERIOD),
    )
}

/// RSI crossing under `threshold + pass * pass_step`.
pub fn rsi_under(
    ts: &mut Timeseries<'_>,
    params: &Params,
    pass: u32,
) -> Result<Vec<usize>, ReplayError> {
    let level =
        params.f64("threshold")? + pass as f64 * params.f64_or("pass_step", DEFAULT_PASS_STEP);
    let result = ts.apply(&Rsi, &rsi_params(params).with("threshold", level))?;
    Ok(result.crossings.clone())
}

/// Close crossing under its SMA.
pub fn close_below_sma(
    ts: &mut Timeseries<'_>,
    params: &Params,
    _pass: u32,
) -> Result<Vec<usize>, ReplayError> {
    let period = params.f64_or("time_period", DEFAULT_SMA_PERIOD);
    let sma = ts.apply(&Sma, &Params::new().with("time_period", period))?;
    let close = ts.vector(Attribute::Close)?;
    let avg = sma.vector("sma").unwrap_or_default();

    let rows = (1..avg.len())
        .filter(|&k| {
            let row = sma.row(k);
            close[row] < avg[k] && close[row - 1] >= avg[k - 1]
        })
        .map(|k| sma.row(k))
        .collect();
    Ok(rows)
}

/// RSI crossing over `threshold`.
pub fn rsi_cross_up(ts: &mut Timeseries<'_>, params: &Params) -> Result<Vec<usize>, ReplayError> {
    let rsi = rsi_params(params)
        .with("threshold", params.f64("threshold")?)
        .with("cross", 1.0);
    Ok(ts.apply(&Rsi, &rsi)?.crossings.clone())
}

/// Close above the previous close.
pub fn close_up(ts: &mut Timeseries<'_>, _params: &Params) -> Result<Vec<usize>, ReplayError> {
    let range = ts.index_range()?;
    let close = ts.vector(Attribute::Close)?;
    Ok(range.filter(|&r| r > 0 && close[r] > close[r - 1]).collect())
}

/// Every row of the window.
pub fn immediate(ts: &mut Timeseries<'_>, _params: &Params) -> Result<Vec<usize>, ReplayError> {
    Ok(ts.index_range()?.collect())
}

/// Earliest of MACD histogram crossing over zero and RSI crossing under
/// `rsi_threshold`.
pub fn indicator_crossing(
    ts: &mut Timeseries<'_>,
    params: &Params,
) -> Result<Vec<ExitSignal>, ReplayError> {
    let mut macd_params = Params::new();
    for key in ["fast_period", "slow_period", "signal_period"] {
        if let Some(v) = params.get(key) {
            macd_params.insert(key, v);
        }
    }
    let macd = ts.apply(&Macd, &macd_params)?;
    let rsi = ts.apply(
        &Rsi,
        &rsi_params(params).with(
            "threshold",
            params.f64_or("rsi_threshold", DEFAULT_RSI_EXIT_THRESHOLD),
        ),
    )?;

    let mut signals: Vec<ExitSignal> = macd
        .crossings
        .iter()
        .map(|row| ExitSignal::new(*row, "macd_hist"))
        .chain(rsi.crossings.iter().map(|row| ExitSignal::new(*row, "rsi")))
        .collect();
    signals.sort_by_key(|s| s.row);
    signals.dedup_by_key(|s| s.row);
    Ok(signals)
}

/// RSI above `threshold`.
pub fn rsi_over(ts: &mut Timeseries<'_>, params: &Params) -> Result<Vec<ExitSignal>, ReplayError> {
    let threshold = params.f64("threshold")?;
    let rsi = ts.apply(&Rsi, &rsi_params(params))?;
    Ok(rsi
        .rows_where("rsi", |v| v > threshold)
        .into_iter()
        .map(|row| ExitSignal::new(row, "rsi"))
        .collect())
}

/// Never signals; positions run to the end of their window.
pub fn hold(_ts: &mut Timeseries<'_>, _params: &Params) -> Result<Vec<ExitSignal>, ReplayError> {
    Ok(Vec::new())
}
