//! Query shape analysis.
//!
//! Extracts what the SQL text itself says about a statement: its projection,
//! output aliases, the aggregates computed at each query level, window
//! expressions, LIMIT/OFFSET and UPDATE assignments. The plan alone does not
//! carry these names, so the pipe translator combines both.

use regex::Regex;
use sqlparser::ast::{
    Expr, GroupByExpr, OrderByExpr, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::OnceLock;

use crate::error::{Result, SqlPipeError};
use crate::plan::clean::{strip_qualifiers, AliasMap};

fn aggregate_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:count|sum|avg|min|max|first|last|median|mode|string_agg|array_agg|bool_and|bool_or|every|stddev|stddev_pop|stddev_samp|variance|var_pop|var_samp)\s*\(",
        )
        .expect("valid regex")
    })
}

fn over_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bover\b").expect("valid regex"))
}

/// Returns true for an aggregate call that is not a window function.
pub fn is_aggregate(expr: &str) -> bool {
    aggregate_call_re().is_match(expr) && !is_window(expr)
}

/// Returns true for a window function call.
pub fn is_window(expr: &str) -> bool {
    over_re().is_match(expr)
}

/// Kind of statement being analyzed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatementKind {
    #[default]
    Query,
    Insert,
    Update,
    Delete,
    Merge,
}

impl StatementKind {
    /// Returns true for statements that write rows.
    pub fn modifies_data(&self) -> bool {
        !matches!(self, Self::Query)
    }
}

/// One item of a SELECT list, with table qualifiers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedItem {
    pub expr: String,
    pub alias: Option<String>,
}

impl ProjectedItem {
    fn new(expr: impl Into<String>, alias: Option<String>) -> Self {
        let expr = expr.into();
        // `SELECT c_name AS c_name` names nothing new
        let alias = alias.filter(|a| !a.eq_ignore_ascii_case(&expr));
        Self { expr, alias }
    }

    /// `expr AS alias`, or the bare expression.
    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {alias}", self.expr),
            None => self.expr.clone(),
        }
    }

    /// The column name this item produces.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.expr)
    }
}

/// Aggregation performed by one SELECT level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateLevel {
    /// Aggregate calls in the projection.
    pub items: Vec<ProjectedItem>,
    /// GROUP BY expressions; positional references are resolved.
    pub group_by: Vec<String>,
    pub distinct: bool,
}

impl AggregateLevel {
    /// A level that only deduplicates rows (`SELECT DISTINCT` without aggregates).
    pub fn is_distinct_only(&self) -> bool {
        self.distinct && self.items.is_empty() && self.group_by.is_empty()
    }
}

/// What the SQL text says about a statement.
#[derive(Debug, Clone, Default)]
pub struct QueryShape {
    pub kind: StatementKind,
    /// Projection of the outermost SELECT, wildcards excluded.
    pub output_columns: Vec<ProjectedItem>,
    /// True when the outermost SELECT contains `*`.
    pub wildcard: bool,
    /// True for an outermost `SELECT DISTINCT`.
    pub distinct: bool,
    /// Every output alias in the statement.
    pub aliases: AliasMap,
    /// Aggregating query levels, innermost first.
    pub aggregate_levels: Vec<AggregateLevel>,
    /// Window expressions of the outermost SELECT.
    pub window_items: Vec<ProjectedItem>,
    /// ORDER BY keys of the outermost query, direction included.
    pub order_by: Vec<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    /// `column = value` assignments of an UPDATE.
    pub assignments: Vec<String>,
}

/// Parses `sql` and extracts its shape.
pub fn analyze_sql(sql: &str) -> Result<QueryShape> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|e| {
        SqlPipeError::parse(format!(
            "Error in parsing SQL. Please ensure that the query is valid! ({e})"
        ))
    })?;

    let [statement] = statements.as_slice() else {
        return Err(SqlPipeError::query(
            "Exactly one statement can be explained at a time",
        ));
    };

    let mut builder = ShapeBuilder::default();
    match statement {
        Statement::Query(query) => builder.outer_query(query),
        Statement::Insert(insert) => {
            builder.shape.kind = StatementKind::Insert;
            if let Some(source) = &insert.source {
                builder.collect_query(source, &[]);
            }
        }
        Statement::Update { assignments, .. } => {
            builder.shape.kind = StatementKind::Update;
            builder.shape.assignments = assignments
                .iter()
                .map(|a| strip_qualifiers(&a.to_string()))
                .collect();
        }
        Statement::Delete(_) => builder.shape.kind = StatementKind::Delete,
        Statement::Merge { .. } => builder.shape.kind = StatementKind::Merge,
        _ => {
            return Err(SqlPipeError::query(
                "Only SELECT, INSERT, UPDATE, DELETE and MERGE statements can be analyzed",
            ))
        }
    }

    Ok(builder.shape)
}

/// Projection of one SELECT.
struct Level {
    items: Vec<ProjectedItem>,
    wildcard: bool,
    distinct: bool,
}

#[derive(Default)]
struct ShapeBuilder {
    shape: QueryShape,
}

impl ShapeBuilder {
    fn outer_query(&mut self, query: &Query) {
        self.shape.limit = query.limit.as_ref().map(|e| e.to_string());
        self.shape.offset = query.offset.as_ref().map(|o| o.value.to_string());

        if let Some(level) = self.collect_query(query, &[]) {
            self.shape.window_items = level
                .items
                .iter()
                .filter(|item| is_window(&item.expr))
                .cloned()
                .collect();
            self.shape.wildcard = level.wildcard;
            self.shape.distinct = level.distinct;
            self.shape.output_columns = level.items;
        }

        if let Some(order_by) = &query.order_by {
            self.shape.order_by = order_by
                .exprs
                .iter()
                .map(|key| order_key(key, &self.shape.output_columns))
                .collect();
        }
    }

    /// Walks a query, CTEs first. Returns the leftmost SELECT's projection.
    fn collect_query(&mut self, query: &Query, columns: &[String]) -> Option<Level> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let cte_columns: Vec<String> =
                    cte.alias.columns.iter().map(|c| c.to_string()).collect();
                self.collect_query(&cte.query, &cte_columns);
            }
        }
        self.collect_set_expr(&query.body, columns)
    }

    fn collect_set_expr(&mut self, body: &SetExpr, columns: &[String]) -> Option<Level> {
        match body {
            SetExpr::Select(select) => Some(self.collect_select(select, columns)),
            SetExpr::Query(query) => self.collect_query(query, columns),
            SetExpr::SetOperation { left, right, .. } => {
                let level = self.collect_set_expr(left, columns);
                self.collect_set_expr(right, columns);
                level
            }
            _ => None,
        }
    }

    fn collect_select(&mut self, select: &Select, columns: &[String]) -> Level {
        // Derived tables run before the SELECT that reads them
        self.collect_from(&select.from);

        let mut items = Vec::new();
        let mut wildcard = false;
        for item in &select.projection {
            let renamed = columns.get(items.len()).cloned();
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    items.push(ProjectedItem::new(clean_expr(expr), renamed));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let alias = renamed.unwrap_or_else(|| alias.value.clone());
                    items.push(ProjectedItem::new(clean_expr(expr), Some(alias)));
                }
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => wildcard = true,
            }
        }

        for item in &items {
            if let Some(alias) = &item.alias {
                self.shape.aliases.insert(alias.clone(), item.expr.clone());
            }
        }

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, ..) => exprs
                .iter()
                .map(|expr| resolve_position(expr, &items))
                .collect(),
            _ => Vec::new(),
        };

        let level = AggregateLevel {
            items: items
                .iter()
                .filter(|item| is_aggregate(&item.expr))
                .cloned()
                .collect(),
            group_by,
            distinct: select.distinct.is_some(),
        };
        if !level.items.is_empty() || !level.group_by.is_empty() || level.distinct {
            self.shape.aggregate_levels.push(level);
        }

        Level {
            items,
            wildcard,
            distinct: select.distinct.is_some(),
        }
    }

    fn collect_from(&mut self, from: &[TableWithJoins]) {
        for table in from {
            self.collect_factor(&table.relation);
            for join in &table.joins {
                self.collect_factor(&join.relation);
            }
        }
    }

    fn collect_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let columns: Vec<String> = alias
                    .as_ref()
                    .map(|a| a.columns.iter().map(|c| c.to_string()).collect())
                    .unwrap_or_default();
                self.collect_query(subquery, &columns);
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.collect_from(std::slice::from_ref(table_with_joins.as_ref())),
            _ => {}
        }
    }
}

fn clean_expr(expr: &Expr) -> String {
    strip_qualifiers(&expr.to_string())
}

/// `GROUP BY 2` and `ORDER BY 2` refer to the second projection item.
fn resolve_position(expr: &Expr, items: &[ProjectedItem]) -> String {
    if let Expr::Value(Value::Number(n, _)) = expr {
        if let Some(item) = n
            .parse::<usize>()
            .ok()
            .and_then(|pos| pos.checked_sub(1))
            .and_then(|idx| items.get(idx))
        {
            return item.expr.clone();
        }
    }
    clean_expr(expr)
}

fn order_key(key: &OrderByExpr, items: &[ProjectedItem]) -> String {
    let mut out = resolve_position(&key.expr, items);
    match key.asc {
        Some(true) => out.push_str(" ASC"),
        Some(false) => out.push_str(" DESC"),
        None => {}
    }
    match key.nulls_first {
        Some(true) => out.push_str(" NULLS FIRST"),
        Some(false) => out.push_str(" NULLS LAST"),
        None => {}
    }
    out
}
