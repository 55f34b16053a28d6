//! Error types for sqlpipe.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for sqlpipe operations.
#[derive(Error, Debug)]
pub enum SqlPipeError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (timeouts, missing relations, rejected statements, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// SQL text that could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// EXPLAIN output that could not be understood.
    #[error("Plan error: {0}")]
    Plan(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (terminal failures, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SqlPipeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates a plan error with the given message.
    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Parse(_) => "Parse Error",
            Self::Plan(_) => "Plan Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using SqlPipeError.
pub type Result<T> = std::result::Result<T, SqlPipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = SqlPipeError::connection("Cannot connect to localhost:5432");
        assert_eq!(
            err.to_string(),
            "Connection error: Cannot connect to localhost:5432"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = SqlPipeError::query("relation \"t\" does not exist");
        assert_eq!(err.to_string(), "Query error: relation \"t\" does not exist");
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_parse() {
        let err = SqlPipeError::parse("Expected an expression, found: EOF");
        assert_eq!(
            err.to_string(),
            "Parse error: Expected an expression, found: EOF"
        );
        assert_eq!(err.category(), "Parse Error");
    }

    #[test]
    fn test_error_display_plan() {
        let err = SqlPipeError::plan("missing \"Plan\" key");
        assert_eq!(err.to_string(), "Plan error: missing \"Plan\" key");
        assert_eq!(err.category(), "Plan Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = SqlPipeError::config("invalid type for execution.retry_attempts");
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid type for execution.retry_attempts"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_display_internal() {
        let err = SqlPipeError::internal("unexpected state");
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.category(), "Internal Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqlPipeError>();
    }
}
