//! Offline database clients.
//!
//! `RecordedPlanClient` answers from EXPLAIN output saved earlier, so plans can
//! be translated without a server.

use super::DatabaseClient;
use crate::error::{Result, SqlPipeError};
use crate::plan::Explain;
use async_trait::async_trait;
use std::path::Path;

/// A client that replays a saved `EXPLAIN (ANALYZE, FORMAT JSON)` document.
#[derive(Debug, Clone)]
pub struct RecordedPlanClient {
    explain: Explain,
}

impl RecordedPlanClient {
    /// Creates a client that always returns `explain`.
    pub fn new(explain: Explain) -> Self {
        Self { explain }
    }

    /// Parses a saved EXPLAIN JSON document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(Explain::from_json_str(text)?))
    }

    /// Reads a saved EXPLAIN JSON document from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlPipeError::config(format!("Failed to read plan file {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }
}

#[async_trait]
impl DatabaseClient for RecordedPlanClient {
    async fn explain(&self, _sql: &str) -> Result<Explain> {
        Ok(self.explain.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A client whose every EXPLAIN fails, for exercising error paths.
#[derive(Debug, Clone)]
pub struct FailingDatabaseClient {
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn explain(&self, _sql: &str) -> Result<Explain> {
        Err(SqlPipeError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
