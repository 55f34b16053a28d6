//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{ConnectionConfig, ExecutionConfig};
use crate::db::DatabaseClient;
use crate::error::{Result, SqlPipeError};
use crate::plan::Explain;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";

/// Wraps a statement in the EXPLAIN form sqlpipe runs.
pub fn explain_statement(sql: &str) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    format!("EXPLAIN (ANALYZE, FORMAT JSON) {sql}")
}

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    execution: ExecutionConfig,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, execution: ExecutionConfig) -> Self {
        Self { pool, execution }
    }

    /// Connects with exponential backoff on transient failures.
    pub async fn connect(config: &ConnectionConfig, execution: &ExecutionConfig) -> Result<Self> {
        let options = connect_options(config, execution);

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to {}", config.display_string());
                    return Ok(Self {
                        pool,
                        execution: execution.clone(),
                    });
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, config)),
            }
        }
    }

    /// Runs EXPLAIN ANALYZE once inside a transaction that is always rolled back.
    async fn explain_once(&self, sql: &str) -> std::result::Result<serde_json::Value, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query_scalar::<_, serde_json::Value>(&explain_statement(sql))
            .fetch_one(&mut *tx)
            .await;

        let rollback = tx.rollback().await;
        let value = result?;
        rollback?;
        Ok(value)
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn explain(&self, sql: &str) -> Result<Explain> {
        let attempts = self.execution.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.explain_once(sql).await {
                Ok(value) => return Explain::from_json(value),
                Err(e) if sqlstate(&e).as_deref() == Some(QUERY_CANCELED) => {
                    if attempt >= attempts {
                        return Err(SqlPipeError::query(format!(
                            "Query exceeded the statement timeout of {} ms ({} attempts)",
                            self.execution.statement_timeout_ms, attempts
                        )));
                    }
                    warn!(
                        "Attempt {} of {} hit the statement timeout, retrying in {:?}",
                        attempt,
                        attempts,
                        self.execution.retry_delay()
                    );
                    tokio::time::sleep(self.execution.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    if matches!(
                        sqlstate(&e).as_deref(),
                        Some(UNDEFINED_TABLE | UNDEFINED_COLUMN)
                    ) {
                        debug!("Statement references an unknown relation or column");
                    }
                    return Err(SqlPipeError::query(format_query_error(e)));
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn connect_options(config: &ConnectionConfig, execution: &ExecutionConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .port(config.port())
        .options([(
            "statement_timeout",
            execution.statement_timeout_ms.to_string(),
        )]);

    if let Some(host) = &config.host {
        options = options.host(host);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    options
}

fn sqlstate(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Connection refused or timeout are often transient
    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    // Authentication, missing databases and TLS problems are not
    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> SqlPipeError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        SqlPipeError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        SqlPipeError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        SqlPipeError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        SqlPipeError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        SqlPipeError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        SqlPipeError::connection(error.to_string())
    }
}

/// Formats a query error with PostgreSQL's DETAIL and HINT when present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());
    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }
        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests need a running PostgreSQL server with the TPC-H tables.
    // They are skipped unless DATABASE_URL is set.

    fn get_test_database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    async fn get_test_client() -> Option<PostgresClient> {
        let url = get_test_database_url()?;
        let config = ConnectionConfig::from_connection_string(&url).ok()?;
        PostgresClient::connect(&config, &ExecutionConfig::default())
            .await
            .ok()
    }

    #[test]
    fn test_explain_statement() {
        assert_eq!(
            explain_statement("  SELECT 1;  "),
            "EXPLAIN (ANALYZE, FORMAT JSON) SELECT 1"
        );
    }

    #[test]
    fn test_non_database_errors_are_passed_through() {
        let message = format_query_error(sqlx::Error::RowNotFound);
        assert!(!message.starts_with("ERROR:"));
        assert!(!is_transient_error(&sqlx::Error::RowNotFound));
        assert_eq!(sqlstate(&sqlx::Error::RowNotFound), None);
    }

    #[tokio::test]
    async fn test_explain_select() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let explain = client.explain("SELECT 1 AS one").await.unwrap();
        assert_eq!(explain.plan.node_type, "Result");
        assert!(explain.execution_time_ms.is_some());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_explain_insert_is_rolled_back() {
        let Some(url) = get_test_database_url() else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };
        // One connection, so the temp table is visible to every statement
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let client = PostgresClient::from_pool(pool, ExecutionConfig::default());

        sqlx::query("CREATE TEMP TABLE sqlpipe_probe (n int)")
            .execute(&client.pool)
            .await
            .unwrap();

        let explain = client
            .explain("INSERT INTO sqlpipe_probe VALUES (1)")
            .await
            .unwrap();
        assert_eq!(explain.plan.node_type, "ModifyTable");

        let rows: i64 = sqlx::query_scalar("SELECT count(*) FROM sqlpipe_probe")
            .fetch_one(&client.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_explain_unknown_table_reports_immediately() {
        let Some(client) = get_test_client().await else {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        };

        let started = std::time::Instant::now();
        let error = client
            .explain("SELECT * FROM nonexistent_table_xyz")
            .await
            .unwrap_err();

        assert!(matches!(error, SqlPipeError::Query(_)));
        assert!(error.to_string().contains("nonexistent_table_xyz"));
        assert!(started.elapsed() < ExecutionConfig::default().retry_delay());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_error_messages() {
        let config = ConnectionConfig {
            host: Some("nonexistent.invalid.host".to_string()),
            port: Some(5432),
            database: Some("testdb".to_string()),
            user: Some("testuser".to_string()),
            password: Some("testpass".to_string()),
        };

        let result = PostgresClient::connect(&config, &ExecutionConfig::default()).await;
        let error = result.unwrap_err();
        assert!(matches!(error, SqlPipeError::Connection(_)));
    }
}
