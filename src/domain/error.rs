//! Domain error types.

use crate::domain::calendar_map::MissingSessions;
use chrono::NaiveDateTime;

/// Top-level error type for barreplay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("missing bars for {instrument}: {missing}")]
    MissingBars {
        instrument: String,
        missing: MissingSessions,
    },

    #[error("data integrity error for {instrument}: {reason}")]
    DataIntegrity { instrument: String, reason: String },

    #[error("no bars returned for {instrument} from {begin} through {end}")]
    NoData {
        instrument: String,
        begin: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("out of range: {reason}")]
    OutOfRange { reason: String },

    #[error("only a subset of the range is available for {instrument}: have {have} warm-up samples, need {need}")]
    InsufficientSamples {
        instrument: String,
        have: usize,
        need: usize,
    },

    #[error("invalid transition for position {id}: {reason}")]
    InvalidTransition { id: u64, reason: String },

    #[error("cannot find vector {name}")]
    UnknownVector { name: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReplayError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        ReplayError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn out_of_range(reason: impl Into<String>) -> Self {
        ReplayError::OutOfRange {
            reason: reason.into(),
        }
    }

    /// Errors caused by the bar data itself rather than by the caller.
    /// Phases that work per position recover from these.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ReplayError::MissingBars { .. }
                | ReplayError::DataIntegrity { .. }
                | ReplayError::NoData { .. }
        )
    }
}

impl From<&ReplayError> for std::process::ExitCode {
    fn from(err: &ReplayError) -> Self {
        let code: u8 = match err {
            ReplayError::Io(_) => 1,
            ReplayError::Configuration { .. }
            | ReplayError::ConfigParse { .. }
            | ReplayError::ConfigMissing { .. }
            | ReplayError::ConfigInvalid { .. } => 2,
            ReplayError::Database { .. } | ReplayError::DatabaseQuery { .. } => 3,
            ReplayError::MissingBars { .. }
            | ReplayError::DataIntegrity { .. }
            | ReplayError::NoData { .. }
            | ReplayError::InsufficientSamples { .. } => 5,
            ReplayError::OutOfRange { .. }
            | ReplayError::InvalidTransition { .. }
            | ReplayError::UnknownVector { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
