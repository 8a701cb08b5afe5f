//! Error types for the aggregation engine.
//!
//! Every failure the engine can detect is fatal to the single call and is
//! reported through [`AggregateError`]. Callers that need the coarse
//! classification (missing key, bad value, incomparable types) use
//! [`AggregateError::kind`].

use chrono::{DateTime, Utc};
use thiserror::Error;

// ---

/// Coarse error classification.
///
/// `Key` and `Value` are configuration errors (bad mapping entries, bad
/// interval settings, improperly retired observations). `Type` covers
/// inputs that cannot be safely compared, such as naive timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Key,
    Value,
    Type,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Key => "key",
            ErrorKind::Value => "value",
            ErrorKind::Type => "type",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    // Mapping errors
    #[error("no observation data provided")]
    EmptyData,

    #[error("cannot aggregate data with missing observations: {}", .0.join(", "))]
    MissingObservation(Vec<String>),

    #[error("observation {observation_id} is missing the '{column}' column")]
    MissingColumn {
        observation_id: String,
        column: &'static str,
    },

    #[error("no aggregate observation records for observation {0}")]
    UnknownObservation(String),

    // Interval and dispatch errors
    #[error("invalid interval length '{0}'")]
    UnparsableIntervalLength(String),

    #[error("interval length {0}s must be a divisor of one day")]
    InvalidIntervalLength(i64),

    #[error("invalid interval label '{0}'")]
    InvalidIntervalLabel(String),

    #[error("interval label must be beginning or ending for aggregates")]
    InstantLabel,

    #[error("unknown aggregate function '{0}'")]
    UnknownAggregateFunction(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("unknown missing data policy '{0}'")]
    UnknownMissingDataPolicy(String),

    #[error("invalid aggregate index: {0}")]
    InvalidIndex(String),

    // Lifecycle errors
    #[error("observation {observation_id} was deleted at {deleted_at} without being removed from the aggregate first")]
    NotRetiredBeforeDeletion {
        observation_id: String,
        deleted_at: DateTime<Utc>,
    },

    #[error("deleted observation {0} data cannot be retrieved to include in aggregate")]
    DeletedDataRequested(String),

    // Data errors
    #[error("column '{column}' has {found} entries, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("observation {observation_id} has an invalid quality flag {flag}")]
    InvalidQualityFlag { observation_id: String, flag: f64 },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("timestamps must be localized to a timezone before aggregation")]
    NotLocalized,

    #[error("timestamp out of range")]
    TimestampOutOfRange,
}

impl AggregateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AggregateError::EmptyData
            | AggregateError::MissingObservation(_)
            | AggregateError::MissingColumn { .. }
            | AggregateError::UnknownObservation(_) => ErrorKind::Key,
            AggregateError::NotLocalized => ErrorKind::Type,
            _ => ErrorKind::Value,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregateError>;
