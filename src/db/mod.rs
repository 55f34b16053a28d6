//! Database abstraction layer for sqlpipe.
//!
//! Provides a trait-based interface for obtaining execution plans, so the
//! pipeline can run against a live PostgreSQL server or recorded plans.

mod postgres;
mod recorded;

pub use postgres::{explain_statement, PostgresClient};
pub use recorded::{FailingDatabaseClient, RecordedPlanClient};

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::error::Result;
use crate::plan::Explain;
use async_trait::async_trait;

/// Creates a PostgreSQL client for the given connection and execution settings.
pub async fn connect(
    config: &ConnectionConfig,
    execution: &ExecutionConfig,
) -> Result<Box<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config, execution).await?;
    Ok(Box::new(client))
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with SqlPipeError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Runs `EXPLAIN (ANALYZE, FORMAT JSON)` for a single statement.
    ///
    /// Implementations must leave the database unchanged, even for
    /// data-modifying statements.
    async fn explain(&self, sql: &str) -> Result<Explain>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
