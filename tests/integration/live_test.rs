//! Tests against a live PostgreSQL server.
//!
//! Skipped unless DATABASE_URL is set.

use sqlpipe::config::{ConnectionConfig, ExecutionConfig};
use sqlpipe::db;
use sqlpipe::error::SqlPipeError;
use sqlpipe::pipeline::Pipeline;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a pipeline on the test database.
async fn get_test_pipeline() -> Option<Pipeline> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let client = db::connect(&config, &ExecutionConfig::default())
        .await
        .ok()?;
    Some(Pipeline::new(client))
}

#[tokio::test]
async fn test_live_function_scan() {
    let Some(pipeline) = get_test_pipeline().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let analysis = pipeline
        .analyze("SELECT g FROM generate_series(1, 10) AS g WHERE g > 5")
        .await
        .unwrap();

    assert_eq!(analysis.explain.plan.node_type, "Function Scan");
    assert!(analysis.explain.execution_time_ms.is_some());
    assert!(analysis.pipe_syntax.starts_with("FROM generate_series"));
    assert!(analysis.pipe_syntax.contains("|> WHERE g > 5"));

    pipeline.close().await.unwrap();
}

#[tokio::test]
async fn test_live_unknown_table() {
    let Some(pipeline) = get_test_pipeline().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = pipeline
        .analyze("SELECT * FROM sqlpipe_missing_table")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPipeError::Query(_)));
    assert!(err.to_string().contains("sqlpipe_missing_table"));

    pipeline.close().await.unwrap();
}

#[tokio::test(flavor = "current_thread")]
async fn test_connect_with_invalid_host() {
    let config = ConnectionConfig {
        host: Some("invalid.host.that.does.not.exist.local".to_string()),
        port: Some(5432),
        database: Some("TPC-H".to_string()),
        user: Some("postgres".to_string()),
        password: None,
    };

    let result = db::connect(&config, &ExecutionConfig::default()).await;
    assert!(matches!(result, Err(SqlPipeError::Connection(_))));
}
