//! Unified error hierarchy for runtrend
//!
//! Structured error types for the activity cache, the windowing/regression
//! pipeline, and configuration, with a mapping to tracing levels.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all runtrend operations
#[derive(Debug, Error)]
pub enum RunTrendError {
    /// Activity cache (SQLite) errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Stream retrieval/decoding errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Windowing/regression calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Import errors
    #[error("Import error: {0}")]
    Import(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Activity cache errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection failed
    #[error("Database connection failed: {path}")]
    ConnectionFailed { path: PathBuf },

    /// Record not found
    #[error("Record not found: {table}.{id}")]
    NotFound { table: String, id: String },
}

/// Stream retrieval and decoding errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Stored stream payload is not a JSON array of numbers/nulls
    #[error("Undecodable stream payload for activity {activity_id} ({stream_type})")]
    Undecodable {
        activity_id: i64,
        stream_type: String,
    },

    /// Streams requested as an aligned set have differing lengths
    #[error("Misaligned streams for activity {activity_id}: lengths {lengths:?}")]
    Misaligned {
        activity_id: i64,
        lengths: Vec<usize>,
    },
}

/// Calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Insufficient data for calculation
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },

    /// Spline abscissae must be strictly increasing
    #[error("Duplicate abscissa at x={value} in spline fit input")]
    DuplicateAbscissa { value: f64 },

    /// Mismatched input array lengths
    #[error("Length mismatch in {calculation}: {left} vs {right}")]
    LengthMismatch {
        calculation: String,
        left: usize,
        right: usize,
    },

    /// Linear system could not be solved
    #[error("Singular system in {calculation}")]
    SingularSystem { calculation: String },
}

/// Result type alias for runtrend operations
pub type Result<T> = std::result::Result<T, RunTrendError>;

impl RunTrendError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RunTrendError::Database(DatabaseError::NotFound { .. }) => ErrorSeverity::Warning,
            RunTrendError::Stream(_) => ErrorSeverity::Warning,
            RunTrendError::Database(_) => ErrorSeverity::Error,
            RunTrendError::Calculation(_) => ErrorSeverity::Error,
            RunTrendError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical | ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = RunTrendError::Stream(StreamError::Undecodable {
            activity_id: 42,
            stream_type: "heartrate".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = RunTrendError::Internal("test".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_error_display() {
        let err = RunTrendError::Calculation(CalculationError::DuplicateAbscissa { value: 2.0 });
        assert!(err.to_string().contains("Duplicate abscissa"));
    }
}
