//! Error types for HealthBuddy sleep

use thiserror::Error;

/// Errors raised at the boundaries of the sleep engine.
///
/// The aggregation and analysis functions themselves never fail; these
/// variants cover malformed input at parse/load time and storage failures.
#[derive(Debug, Error)]
pub enum SleepError {
    #[error("Invalid sleep session: end {end} is not after start {start}")]
    InvalidSession { start: String, end: String },

    #[error("Invalid schedule time (expected HH:MM): {0}")]
    InvalidScheduleFormat(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Invalid analysis config: {0}")]
    InvalidConfig(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    StorageError(String),
}
