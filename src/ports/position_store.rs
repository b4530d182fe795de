//! Position persistence port.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::ReplayError;
use crate::domain::position::{Position, PositionId};

/// Which positions a truncate removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TruncateScope {
    /// Positions produced by a trigger strategy, plus its cache markers.
    Trigger(String),
    Entry(String),
    Exit(String),
    /// Positions of a population, plus its cache markers.
    Population(String),
}

impl TruncateScope {
    pub fn from_parts(kind: &str, name: &str) -> Result<Self, ReplayError> {
        let name = name.to_string();
        match kind.trim().to_lowercase().as_str() {
            "trigger" | "trigger_strategy" => Ok(TruncateScope::Trigger(name)),
            "entry" | "entry_strategy" => Ok(TruncateScope::Entry(name)),
            "exit" | "exit_strategy" => Ok(TruncateScope::Exit(name)),
            "population" | "scan" => Ok(TruncateScope::Population(name)),
            other => Err(ReplayError::configuration(format!(
                "truncate scope must be one of trigger, entry, exit, population; got '{other}'"
            ))),
        }
    }

    pub fn matches(&self, position: &Position) -> bool {
        match self {
            TruncateScope::Trigger(n) => position.trigger_strategy == *n,
            TruncateScope::Entry(n) => position.entry_strategy.as_deref() == Some(n),
            TruncateScope::Exit(n) => position.exit_strategy.as_deref() == Some(n),
            TruncateScope::Population(n) => position.population == *n,
        }
    }
}

/// Parses `kind` or `kind:name`; a bare kind is completed by the caller.
impl FromStr for TruncateScope {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once(':').unwrap_or((s, ""));
        Self::from_parts(kind, name)
    }
}

impl fmt::Display for TruncateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TruncateScope::Trigger(n) => write!(f, "trigger strategy {n}"),
            TruncateScope::Entry(n) => write!(f, "entry strategy {n}"),
            TruncateScope::Exit(n) => write!(f, "exit strategy {n}"),
            TruncateScope::Population(n) => write!(f, "population {n}"),
        }
    }
}

/// Durable record of positions and of completed trigger passes.
///
/// `positions` returns records in insertion order.
pub trait PositionStore {
    /// Store a new position and return its assigned id.
    fn insert(&self, position: &Position) -> Result<PositionId, ReplayError>;

    fn update(&self, position: &Position) -> Result<(), ReplayError>;

    fn delete(&self, id: PositionId) -> Result<(), ReplayError>;

    fn positions(&self, trigger: &str, population: &str) -> Result<Vec<Position>, ReplayError>;

    fn is_trigger_cached(&self, trigger: &str, population: &str) -> Result<bool, ReplayError>;

    fn mark_trigger_cached(&self, trigger: &str, population: &str) -> Result<(), ReplayError>;

    /// Remove matching positions and cache markers; returns positions removed.
    fn truncate(&self, scope: &TruncateScope) -> Result<usize, ReplayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parsing() {
        assert_eq!(
            "trigger:rsi_dip".parse::<TruncateScope>().unwrap(),
            TruncateScope::Trigger("rsi_dip".into())
        );
        assert_eq!(
            TruncateScope::from_parts("scan", "liquid").unwrap(),
            TruncateScope::Population("liquid".into())
        );
        assert!(matches!(
            "everything".parse::<TruncateScope>(),
            Err(ReplayError::Configuration { .. })
        ));
    }
}
