//! barreplay: historical bar replay backtester.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`cli`] wires them together for the
//! `barreplay` binary.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod logging;
pub mod ports;
