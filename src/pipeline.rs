//! Statement pipeline.
//!
//! Validates a statement, reads its shape, obtains the executed plan and
//! derives the step list, pipe syntax and plan graph from it.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::DatabaseClient;
use crate::error::{Result, SqlPipeError};
use crate::graph::PlanGraph;
use crate::pipe::{translate, PipeQuery};
use crate::plan::{unwrap_steps, Explain, PlanStep};
use crate::safety::{check_explainable, ClassificationResult};
use crate::shape::analyze_sql;

/// Everything derived from one statement.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub sql: String,
    pub classification: ClassificationResult,
    pub explain: Explain,
    pub steps: Vec<PlanStep>,
    pub pipe: PipeQuery,
    pub pipe_syntax: String,
    pub graph: PlanGraph,
}

/// Runs statements through validation, EXPLAIN and translation.
pub struct Pipeline {
    client: Box<dyn DatabaseClient>,
}

impl Pipeline {
    pub fn new(client: Box<dyn DatabaseClient>) -> Self {
        Self { client }
    }

    /// Analyzes one statement.
    pub async fn analyze(&self, sql: &str) -> Result<Analysis> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlPipeError::query("No SQL input provided."));
        }

        let classification = check_explainable(sql)?;
        if let Some(warning) = &classification.warning {
            warn!("{warning}");
        }

        let shape = analyze_sql(sql)?;
        debug!(
            levels = shape.aggregate_levels.len(),
            windows = shape.window_items.len(),
            "Read query shape"
        );

        let explain = self.client.explain(sql).await?;
        let steps = unwrap_steps(&explain.plan, &shape);
        let pipe = translate(&explain.plan, &shape);
        let graph = PlanGraph::from_plan(&explain.plan);

        info!(
            nodes = graph.nodes.len(),
            execution_ms = explain.execution_time_ms.unwrap_or_default(),
            "Analyzed {} statement",
            classification.statement_type
        );

        Ok(Analysis {
            sql: sql.to_string(),
            classification,
            pipe_syntax: pipe.render(),
            explain,
            steps,
            pipe,
            graph,
        })
    }

    /// Analyzes statements in order. A failure does not stop later statements.
    pub async fn analyze_all(&self, statements: &[String]) -> Vec<Result<Analysis>> {
        let mut results = Vec::with_capacity(statements.len());
        for (index, sql) in statements.iter().enumerate() {
            let result = self.analyze(sql).await;
            if let Err(e) = &result {
                warn!("Statement {} failed: {}", index + 1, e);
            }
            results.push(result);
        }
        results
    }

    /// Closes the underlying database client.
    pub async fn close(&self) -> Result<()> {
        self.client.close().await
    }
}
