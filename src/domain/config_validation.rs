//! Configuration validation.
//!
//! Checks every section a run reads before any bars are fetched.

use chrono::NaiveDate;

use crate::domain::backtest::{BacktestConfig, STOP_LOSS_DISABLED};
use crate::domain::calendar::TradingCalendar;
use crate::domain::error::ReplayError;
use crate::domain::population::{parse_instruments, population_names, ALL_INSTRUMENTS, POPULATION_SECTION_PREFIX};
use crate::domain::strategy::StrategyRegistry;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    validate_backtest_config(config)?;
    validate_stop_loss(config)?;
    TradingCalendar::from_config(config)?;
    validate_populations(config)?;
    StrategyRegistry::from_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    let backtest = BacktestConfig::from_config(config)?;
    if let (Some(start), Some(end)) = (backtest.start_date, backtest.end_date) {
        if start > end {
            return Err(ReplayError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "start_date".to_string(),
                reason: "start_date must not be after end_date".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    let threshold = config.get_double("stop_loss", "threshold", STOP_LOSS_DISABLED);
    if threshold <= 0.0 || threshold > STOP_LOSS_DISABLED {
        return Err(ReplayError::ConfigInvalid {
            section: "stop_loss".to_string(),
            key: "threshold".to_string(),
            reason: "threshold must be a percentage in (0, 100]".to_string(),
        });
    }
    let max_days = config.get_int("stop_loss", "max_days", 1);
    if max_days < 1 {
        return Err(ReplayError::ConfigInvalid {
            section: "stop_loss".to_string(),
            key: "max_days".to_string(),
            reason: "max_days must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Population sections are checked without a bar store, so `*` lists are
/// accepted as written.
fn validate_populations(config: &dyn ConfigPort) -> Result<(), ReplayError> {
    for name in population_names(config) {
        let section = format!("{POPULATION_SECTION_PREFIX}{name}");
        let invalid = |key: &str, reason: String| ReplayError::ConfigInvalid {
            section: section.clone(),
            key: key.to_string(),
            reason,
        };

        match config.get_string(&section, "instruments") {
            Some(list) if list.trim() == ALL_INSTRUMENTS => {}
            Some(list) => {
                parse_instruments(&list).map_err(|e| invalid("instruments", e.to_string()))?;
            }
            None => {
                return Err(ReplayError::ConfigMissing {
                    section: section.clone(),
                    key: "instruments".to_string(),
                });
            }
        }

        let start = parse_date(config, &section, "start_date")?;
        let end = parse_date(config, &section, "end_date")?;
        if start > end {
            return Err(invalid(
                "start_date",
                "start_date must not be after end_date".to_string(),
            ));
        }
    }
    Ok(())
}

fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, ReplayError> {
    match config.get_string(section, key) {
        None => Err(ReplayError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            ReplayError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("invalid {key} format, expected YYYY-MM-DD"),
            }
        }),
    }
}
