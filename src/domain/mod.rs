//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod calendar;
pub mod calendar_map;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod params;
pub mod population;
pub mod position;
pub mod resolution;
pub mod rules;
pub mod stop_loss;
pub mod strategy;
pub mod timeseries;
