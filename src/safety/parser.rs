//! Parsing submitted SQL with sqlparser-rs and gating it for `EXPLAIN ANALYZE`.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::error::{Result, SqlPipeError};

use super::{ClassificationResult, DataAccess, StatementType};

const DATA_CHANGE_WARNING: &str =
    "Statement modifies data; it is analyzed inside a transaction that is rolled back.";

/// Parses `sql` and rejects anything PostgreSQL cannot `EXPLAIN ANALYZE`.
///
/// Unparseable SQL is reported as a parse error. Exactly one statement is
/// accepted per call.
pub fn check_explainable(sql: &str) -> Result<ClassificationResult> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
        SqlPipeError::parse(format!(
            "Error in parsing SQL. Please ensure that the query is valid! ({e})"
        ))
    })?;

    let statement = match statements.as_slice() {
        [] => return Err(SqlPipeError::query("No SQL input provided.")),
        [statement] => statement,
        many => {
            return Err(SqlPipeError::query(format!(
                "Exactly one statement can be explained at a time, got {}",
                StatementType::Multiple(many.len())
            )))
        }
    };

    let (access, statement_type) = classify_statement(statement);
    if statement_type.is_explainable() {
        return Ok(ClassificationResult {
            access,
            statement_type,
            warning: access
                .modifies_data()
                .then(|| DATA_CHANGE_WARNING.to_string()),
        });
    }
    Err(match statement_type {
        StatementType::Explain => SqlPipeError::query(
            "Statement is already an EXPLAIN; submit the query it explains instead",
        ),
        other => SqlPipeError::query(format!(
            "{other} statements cannot be explained. Use SELECT, INSERT, UPDATE, DELETE or MERGE."
        )),
    })
}

fn classify_statement(statement: &Statement) -> (DataAccess, StatementType) {
    match statement {
        // A query can still write through a data-modifying CTE
        Statement::Query(query) => (query_access(query), query_type(query)),
        Statement::Insert(_) => (DataAccess::Modifying, StatementType::Insert),
        Statement::Update { .. } => (DataAccess::Modifying, StatementType::Update),
        Statement::Delete(_) => (DataAccess::Modifying, StatementType::Delete),
        Statement::Merge { .. } => (DataAccess::Modifying, StatementType::Merge),
        Statement::Explain { .. } => (DataAccess::ReadOnly, StatementType::Explain),
        other => (DataAccess::Modifying, StatementType::Other(leading_keyword(other))),
    }
}

/// `WITH … UPDATE` and `WITH … INSERT` parse as queries.
fn query_type(query: &Query) -> StatementType {
    match query.body.as_ref() {
        SetExpr::Update(_) => StatementType::Update,
        SetExpr::Insert(_) => StatementType::Insert,
        _ => StatementType::Select,
    }
}

fn leading_keyword(statement: &Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace()
        .next()
        .unwrap_or("Unknown")
        .to_uppercase()
}

fn query_access(query: &Query) -> DataAccess {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| &with.cte_tables)
        .map(|cte| query_access(&cte.query));
    ctes.chain([set_expr_access(&query.body)])
        .max()
        .unwrap_or(DataAccess::ReadOnly)
}

fn set_expr_access(set_expr: &SetExpr) -> DataAccess {
    match set_expr {
        SetExpr::Update(_) | SetExpr::Insert(_) => DataAccess::Modifying,
        SetExpr::Query(query) => query_access(query),
        SetExpr::Select(select) => select_access(select),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_access(left).max(set_expr_access(right))
        }
        _ => DataAccess::ReadOnly,
    }
}

/// Derived tables in FROM may hold their own data-modifying CTEs.
fn select_access(select: &Select) -> DataAccess {
    select
        .from
        .iter()
        .map(joined_access)
        .max()
        .unwrap_or(DataAccess::ReadOnly)
}

fn joined_access(twj: &TableWithJoins) -> DataAccess {
    twj.joins
        .iter()
        .map(|join| factor_access(&join.relation))
        .fold(factor_access(&twj.relation), DataAccess::max)
}

fn factor_access(factor: &TableFactor) -> DataAccess {
    match factor {
        TableFactor::Derived { subquery, .. } => query_access(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => joined_access(table_with_joins),
        _ => DataAccess::ReadOnly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_read_only() {
        let result = check_explainable("SELECT * FROM customer LIMIT 100").unwrap();
        assert_eq!(result.access, DataAccess::ReadOnly);
        assert_eq!(result.statement_type, StatementType::Select);
        assert_eq!(result.warning, None);
    }

    #[test]
    fn test_derived_table_is_read_only() {
        let result = check_explainable(
            "SELECT c_count, count(*) AS custdist FROM (SELECT c_custkey, count(o_orderkey) \
             FROM customer LEFT OUTER JOIN orders ON c_custkey = o_custkey GROUP BY c_custkey) \
             AS c_orders (c_custkey, c_count) GROUP BY c_count",
        )
        .unwrap();
        assert_eq!(result.access, DataAccess::ReadOnly);
    }

    #[test]
    fn test_dml_is_modifying_with_warning() {
        for sql in [
            "UPDATE customer SET c_acctbal = c_acctbal * 1.1",
            "DELETE FROM orders WHERE o_orderkey = 1",
            "INSERT INTO nation VALUES (99, 'X', 0, '')",
        ] {
            let result = check_explainable(sql).unwrap();
            assert_eq!(result.access, DataAccess::Modifying, "{sql}");
            assert!(result.warning.unwrap().contains("rolled back"));
        }
    }

    #[test]
    fn test_modifying_cte_marks_select() {
        let result = check_explainable(
            "WITH touched AS (UPDATE orders SET o_comment = 'x' WHERE o_orderkey = 1 \
             RETURNING *) SELECT count(*) FROM touched",
        )
        .unwrap();
        assert_eq!(result.statement_type, StatementType::Select);
        assert_eq!(result.access, DataAccess::Modifying);

        let result = check_explainable("WITH t AS (SELECT 1) SELECT * FROM t").unwrap();
        assert_eq!(result.access, DataAccess::ReadOnly);

        let result = check_explainable(
            "WITH n AS (SELECT 1 AS k) UPDATE nation SET n_comment = '' \
             WHERE n_nationkey IN (SELECT k FROM n)",
        )
        .unwrap();
        assert_eq!(result.statement_type, StatementType::Update);
        assert_eq!(result.access, DataAccess::Modifying);
    }

    #[test]
    fn test_rejects_ddl_by_keyword() {
        let err = check_explainable("DROP TABLE orders").unwrap_err();
        assert!(matches!(err, SqlPipeError::Query(_)));
        assert!(err.to_string().contains("DROP statements cannot be explained"));

        let err = check_explainable("CREATE TABLE t (a int)").unwrap_err();
        assert!(err.to_string().contains("CREATE statements cannot be explained"));
    }

    #[test]
    fn test_rejects_explain_and_multiple() {
        let err = check_explainable("EXPLAIN SELECT 1").unwrap_err();
        assert!(err.to_string().contains("already an EXPLAIN"));

        let err = check_explainable("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("Exactly one statement"));
        assert!(err.to_string().ends_with("got 2 statements"));
    }

    #[test]
    fn test_reports_parse_errors() {
        let err = check_explainable("SELECT c_count FROM (SELECT").unwrap_err();
        assert!(matches!(err, SqlPipeError::Parse(_)));
        assert!(err.to_string().contains("Please ensure that the query is valid"));
    }
}
