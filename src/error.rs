// src/error.rs

//! Unified error handling for the backfill pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// No source adapter registered under the given slug
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// Operator supplied an inverted date range
    #[error("invalid date range: {from} is after {to}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },

    /// Safety gate is off while a real (non-dry-run) execution was requested
    #[error(
        "kill switch disabled: set {}=1 to allow non-dry-run writes",
        crate::config::KILL_SWITCH_ENV
    )]
    KillSwitchDisabled,

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Store operation failed
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSS selector parsing failed
    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Page fetch error, after retries where applicable
    #[error("fetch error for {context}: {message}")]
    Fetch { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration errors get distinct codes so operators and wrapper
    /// scripts can tell a typo from a broken source. A run that reaches a
    /// `Failed` terminal state exits 1 via the run report, not through here.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownSource(_) => 3,
            Self::InvalidDateRange { .. } => 4,
            Self::KillSwitchDisabled => 5,
            _ => 1,
        }
    }
}
