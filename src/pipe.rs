//! Pipe syntax translation.
//!
//! Rebuilds a query as a chain of pipe operators (`FROM t |> WHERE … |> …`)
//! by walking the executed plan bottom-up. Names that the plan does not
//! carry (output aliases, UPDATE assignments, LIMIT/OFFSET) come from the
//! query's [`QueryShape`].

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::plan::clean::{clean_condition, split_sort_key, strip_outer_parens, AliasMap};
use crate::plan::{clean_key, join_conditions, NodeClass, PlanNode};
use crate::shape::{AggregateLevel, ProjectedItem, QueryShape};

/// One pipe operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PipeOp {
    From {
        source: String,
    },
    Where {
        condition: String,
    },
    Join {
        kind: String,
        target: String,
        condition: Option<String>,
    },
    Aggregate {
        items: Vec<String>,
        group_by: Vec<String>,
    },
    Extend {
        items: Vec<String>,
    },
    OrderBy {
        keys: Vec<String>,
    },
    Limit {
        count: String,
        offset: Option<String>,
    },
    /// Projection; an empty column list selects `*`.
    Select {
        distinct: bool,
        columns: Vec<String>,
    },
    As {
        alias: String,
    },
    Set {
        assignments: Vec<String>,
    },
    Update {
        table: String,
    },
    Delete {
        table: String,
    },
    Insert {
        table: String,
    },
    Merge {
        table: String,
    },
    Union {
        all: bool,
        query: String,
    },
}

impl fmt::Display for PipeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From { source } => write!(f, "FROM {source}"),
            Self::Where { condition } => write!(f, "WHERE {condition}"),
            Self::Join {
                kind,
                target,
                condition,
            } => {
                write!(f, "{kind} {target}")?;
                if let Some(condition) = condition {
                    write!(f, " ON {condition}")?;
                }
                Ok(())
            }
            Self::Aggregate { items, group_by } => {
                f.write_str("AGGREGATE")?;
                if !items.is_empty() {
                    write!(f, " {}", items.join(", "))?;
                }
                if !group_by.is_empty() {
                    write!(f, " GROUP BY {}", group_by.join(", "))?;
                }
                Ok(())
            }
            Self::Extend { items } => write!(f, "EXTEND {}", items.join(", ")),
            Self::OrderBy { keys } => write!(f, "ORDER BY {}", keys.join(", ")),
            Self::Limit { count, offset } => {
                write!(f, "LIMIT {count}")?;
                if let Some(offset) = offset {
                    write!(f, " OFFSET {offset}")?;
                }
                Ok(())
            }
            Self::Select { distinct, columns } => {
                f.write_str("SELECT ")?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                if columns.is_empty() {
                    f.write_str("*")
                } else {
                    f.write_str(&columns.join(", "))
                }
            }
            Self::As { alias } => write!(f, "AS {alias}"),
            Self::Set { assignments } => write!(f, "SET {}", assignments.join(", ")),
            Self::Update { table } => write!(f, "UPDATE {table}"),
            Self::Delete { table } => write!(f, "DELETE FROM {table}"),
            Self::Insert { table } => write!(f, "INSERT INTO {table}"),
            Self::Merge { table } => write!(f, "MERGE INTO {table}"),
            Self::Union { all, query } => {
                let keyword = if *all { "UNION ALL" } else { "UNION" };
                write!(f, "{keyword} ({query})")
            }
        }
    }
}

/// A query in pipe syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipeQuery {
    pub ops: Vec<PipeOp>,
}

impl PipeQuery {
    /// Multi-line rendering, one operator per line.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Single-line rendering used for nested queries.
    pub fn render_inline(&self) -> String {
        self.ops
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<_>>()
            .join(" |> ")
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for PipeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str("\n|> ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

/// Translates an executed plan into pipe syntax.
pub fn translate(root: &PlanNode, shape: &QueryShape) -> PipeQuery {
    let mut translator = Translator::new(shape);
    let mut ops = translator.node(root, Ctx::ROOT);
    translator.finish(&mut ops);
    PipeQuery { ops }
}

/// Where a node sits relative to the statement's outermost query.
#[derive(Debug, Clone, Copy)]
struct Ctx {
    /// The node belongs to the outermost query level.
    outer: bool,
    /// The parent needs sorted input (GroupAggregate, WindowAgg, Unique, Merge Join),
    /// so a Sort here is an implementation detail rather than an ORDER BY.
    order_consumed: bool,
}

impl Ctx {
    const ROOT: Ctx = Ctx {
        outer: true,
        order_consumed: false,
    };
    const NESTED: Ctx = Ctx {
        outer: false,
        order_consumed: false,
    };
    const CONSUMED: Ctx = Ctx {
        outer: false,
        order_consumed: true,
    };

    fn unordered(self) -> Ctx {
        Ctx {
            order_consumed: false,
            ..self
        }
    }
}

struct Translator<'a> {
    shape: &'a QueryShape,
    /// Aliases introduced by operators emitted so far.
    scope: AliasMap,
    claimed_levels: Vec<bool>,
    limit_claimed: bool,
    /// An outer-level Sort has produced the statement's ORDER BY.
    ordered: bool,
    distinct: bool,
    modifies: bool,
    windows_emitted: bool,
}

impl<'a> Translator<'a> {
    fn new(shape: &'a QueryShape) -> Self {
        Self {
            shape,
            scope: AliasMap::new(),
            claimed_levels: vec![false; shape.aggregate_levels.len()],
            limit_claimed: false,
            ordered: false,
            distinct: false,
            modifies: false,
            windows_emitted: false,
        }
    }

    fn node(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        match NodeClass::of(node) {
            NodeClass::Scan => self.scan(node, false),
            NodeClass::SubqueryScan => self.subquery_scan(node),
            NodeClass::Join => self.join(node),
            NodeClass::Aggregate => self.aggregate(node, ctx),
            NodeClass::Window => self.window(node),
            NodeClass::Sort => self.sort(node, ctx),
            NodeClass::Limit => self.limit(node, ctx),
            NodeClass::Unique => self.unique(node, ctx),
            NodeClass::Append => self.append(node),
            NodeClass::Modify => self.modify(node),
            NodeClass::PassThrough => self.inputs(node, ctx),
        }
    }

    fn inputs(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        let mut ops = Vec::new();
        for child in node.inputs() {
            ops.extend(self.node(child, ctx));
        }
        ops
    }

    fn scan(&mut self, node: &PlanNode, skip_index_cond: bool) -> Vec<PipeOp> {
        let mut ops = vec![PipeOp::From {
            source: scan_source(node),
        }];

        let mut conditions = Vec::new();
        if !skip_index_cond {
            if let Some(cond) = node.index_condition() {
                conditions.push(clean_condition(cond));
            }
        }
        if let Some(filter) = &node.filter {
            conditions.push(clean_condition(filter));
        }
        if !conditions.is_empty() {
            ops.push(PipeOp::Where {
                condition: join_conditions(&conditions),
            });
        }
        ops
    }

    fn subquery_scan(&mut self, node: &PlanNode) -> Vec<PipeOp> {
        let mut ops = self.inputs(node, Ctx::NESTED);
        if let Some(alias) = &node.alias {
            ops.push(PipeOp::As {
                alias: alias.clone(),
            });
        }
        if let Some(filter) = &node.filter {
            ops.push(PipeOp::Where {
                condition: self.scope.substitute(&clean_condition(filter)),
            });
        }
        ops
    }

    fn join(&mut self, node: &PlanNode) -> Vec<PipeOp> {
        let mut children = node.inputs();
        let (Some(outer), Some(inner)) = (children.next(), children.next()) else {
            return self.inputs(node, Ctx::NESTED);
        };

        let merge = node.node_type == "Merge Join";
        let side = Ctx {
            outer: false,
            order_consumed: merge,
        };
        let mut ops = self.node(outer, side);

        let inner = join_input(inner, merge);
        let mut conditions: Vec<String> = [&node.hash_cond, &node.merge_cond, &node.join_filter]
            .into_iter()
            .flatten()
            .map(|cond| clean_condition(cond))
            .collect();

        // A parameterized nested loop keeps its join condition on the inner index scan
        let inner_is_scan = NodeClass::of(inner) == NodeClass::Scan;
        let pulled = (conditions.is_empty() && inner_is_scan)
            .then(|| inner.index_condition())
            .flatten();
        if let Some(cond) = pulled {
            conditions.push(clean_condition(cond));
        }

        let inner_ops = if inner_is_scan {
            self.scan(inner, pulled.is_some())
        } else {
            self.node(inner, side)
        };
        let target = match inner_ops.as_slice() {
            [PipeOp::From { source }] => source.clone(),
            _ => format!("({})", PipeQuery { ops: inner_ops }.render_inline()),
        };

        let condition = (!conditions.is_empty()).then(|| join_conditions(&conditions));
        ops.push(PipeOp::Join {
            kind: join_keyword(node.join_type.as_deref(), condition.is_none()),
            target,
            condition,
        });
        ops
    }

    fn aggregate(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        let mut ops = self.inputs(node, Ctx::CONSUMED);
        if node.is_partial_aggregate() {
            return ops;
        }

        let plan_keys: Vec<String> = node.group_key.iter().map(|k| clean_condition(k)).collect();
        let level = self.claim_level(&plan_keys);

        if level.is_some_and(|l| l.is_distinct_only()) {
            self.push_distinct(&mut ops, ctx);
            return ops;
        }

        let items: Vec<String> = level
            .map(|l| l.items.iter().map(|item| self.introduce(item)).collect())
            .unwrap_or_default();
        let keys = match level {
            Some(l) if !l.group_by.is_empty() => l.group_by.clone(),
            _ => plan_keys,
        };
        let group_by: Vec<String> = keys.iter().map(|k| self.group_key(k)).collect();

        if !items.is_empty() || !group_by.is_empty() {
            ops.push(PipeOp::Aggregate { items, group_by });
        }
        if let Some(filter) = &node.filter {
            ops.push(PipeOp::Where {
                condition: self.scope.substitute(&clean_condition(filter)),
            });
        }
        ops
    }

    fn window(&mut self, node: &PlanNode) -> Vec<PipeOp> {
        let mut ops = self.inputs(node, Ctx::CONSUMED);
        let shape = self.shape;
        if !self.windows_emitted && !shape.window_items.is_empty() {
            self.windows_emitted = true;
            let items = shape
                .window_items
                .iter()
                .map(|item| self.introduce(item))
                .collect();
            ops.push(PipeOp::Extend { items });
        }
        ops
    }

    fn sort(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        let mut ops = self.inputs(node, ctx.unordered());
        if !ctx.order_consumed && !node.sort_key.is_empty() {
            let keys = node
                .sort_key
                .iter()
                .map(|key| clean_key(key, &self.scope))
                .collect();
            ops.push(PipeOp::OrderBy { keys });
            self.ordered |= ctx.outer;
        }
        ops
    }

    fn limit(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        // Decided before recursing: the first Limit met from the root owns the SQL's LIMIT
        let from_sql = ctx.outer && !self.limit_claimed && self.shape.limit.is_some();
        if ctx.outer {
            self.limit_claimed = true;
        }

        let mut ops = self.inputs(node, ctx.unordered());
        if from_sql {
            self.push_sql_order(&mut ops);
        }
        let op = if from_sql {
            self.shape.limit.clone().map(|count| PipeOp::Limit {
                count,
                offset: self.shape.offset.clone(),
            })
        } else {
            node.plan_rows.map(|rows| PipeOp::Limit {
                count: format!("{}", rows as u64),
                offset: None,
            })
        };
        ops.extend(op);
        ops
    }

    fn unique(&mut self, node: &PlanNode, ctx: Ctx) -> Vec<PipeOp> {
        let mut ops = self.inputs(
            node,
            Ctx {
                outer: ctx.outer,
                order_consumed: true,
            },
        );
        self.push_distinct(&mut ops, ctx);
        ops
    }

    fn append(&mut self, node: &PlanNode) -> Vec<PipeOp> {
        let mut children = node.inputs();
        let Some(first) = children.next() else {
            return Vec::new();
        };
        let mut ops = self.node(first, Ctx::NESTED);
        for child in children {
            let branch = PipeQuery {
                ops: self.node(child, Ctx::NESTED),
            };
            ops.push(PipeOp::Union {
                all: true,
                query: branch.render_inline(),
            });
        }
        ops
    }

    fn modify(&mut self, node: &PlanNode) -> Vec<PipeOp> {
        let mut ops = self.inputs(node, Ctx::NESTED);
        self.modifies = true;

        let table = node
            .relation_name
            .clone()
            .unwrap_or_else(|| node.node_type.clone());
        match node.operation.as_deref() {
            Some("Update") => {
                if !self.shape.assignments.is_empty() {
                    ops.push(PipeOp::Set {
                        assignments: self.shape.assignments.clone(),
                    });
                }
                ops.push(PipeOp::Update { table });
            }
            Some("Delete") => ops.push(PipeOp::Delete { table }),
            Some("Insert") => ops.push(PipeOp::Insert { table }),
            Some("Merge") => ops.push(PipeOp::Merge { table }),
            _ => {}
        }
        ops
    }

    fn push_distinct(&mut self, ops: &mut Vec<PipeOp>, ctx: Ctx) {
        if ctx.outer {
            self.distinct = true;
        } else {
            ops.push(PipeOp::Select {
                distinct: true,
                columns: Vec::new(),
            });
        }
    }

    /// Emits the statement's ORDER BY when no outer Sort did.
    ///
    /// PostgreSQL often satisfies ORDER BY with the Sort that feeds a sorted
    /// aggregate, a window or a Unique, or with an index scan, so the plan
    /// may have no Sort of its own at the outer level.
    fn push_sql_order(&mut self, ops: &mut Vec<PipeOp>) {
        if self.ordered || self.shape.order_by.is_empty() {
            return;
        }
        self.ordered = true;
        let keys = self
            .shape
            .order_by
            .iter()
            .map(|key| {
                let (expr, suffix) = split_sort_key(key);
                format!("{}{suffix}", self.scope.substitute(expr))
            })
            .collect();
        ops.push(PipeOp::OrderBy { keys });
    }

    /// Matches an aggregate node to the query level it computes.
    ///
    /// Levels whose GROUP BY equals the node's group keys win; otherwise the
    /// innermost unclaimed level is used.
    fn claim_level(&mut self, plan_keys: &[String]) -> Option<&'a AggregateLevel> {
        let shape = self.shape;
        let raw: BTreeSet<String> = plan_keys.iter().map(|k| normalize(k)).collect();
        let aliased: BTreeSet<String> = plan_keys
            .iter()
            .map(|k| normalize(&shape.aliases.substitute(k)))
            .collect();
        let matches = |level: &AggregateLevel| {
            let keys: BTreeSet<String> = level.group_by.iter().map(|k| normalize(k)).collect();
            keys == raw || keys == aliased
        };

        let unclaimed = |i: &usize| !self.claimed_levels[*i];
        let index = (0..shape.aggregate_levels.len())
            .filter(unclaimed)
            .find(|&i| matches(&shape.aggregate_levels[i]))
            .or_else(|| (0..shape.aggregate_levels.len()).find(unclaimed))?;

        self.claimed_levels[index] = true;
        shape.aggregate_levels.get(index)
    }

    /// Renders an item that names a new column and brings its alias into scope.
    fn introduce(&mut self, item: &ProjectedItem) -> String {
        let expr = self.scope.substitute(&item.expr);
        match &item.alias {
            Some(alias) => {
                self.scope.insert(alias.clone(), item.expr.clone());
                format!("{expr} AS {alias}")
            }
            None => expr,
        }
    }

    fn group_key(&mut self, key: &str) -> String {
        let substituted = self.scope.substitute(key);
        if substituted != key {
            return substituted;
        }
        if let Some(expr) = self.shape.aliases.expression(key) {
            // GROUP BY on an output alias that no operator has produced yet
            if !self.scope.contains_alias(key) {
                self.scope.insert(key, expr);
                return format!("{expr} AS {key}");
            }
            return key.to_string();
        }
        match self.shape.aliases.lookup(key) {
            Some(alias) if !self.scope.contains_alias(alias) => {
                self.scope.insert(alias, key);
                format!("{key} AS {alias}")
            }
            _ => key.to_string(),
        }
    }

    fn output_column(&self, item: &ProjectedItem) -> String {
        match &item.alias {
            Some(alias) if self.scope.contains_alias(alias) => alias.clone(),
            Some(alias) => format!("{} AS {alias}", self.scope.substitute(&item.expr)),
            None => self.scope.substitute(&item.expr),
        }
    }

    /// Appends the projection. Data-modifying statements end with their write.
    fn finish(&mut self, ops: &mut Vec<PipeOp>) {
        if self.modifies || self.shape.kind.modifies_data() {
            return;
        }
        self.push_sql_order(ops);
        let distinct = self.distinct || self.shape.distinct;

        let mut columns: Vec<String> = Vec::new();
        if self.shape.wildcard && !self.shape.output_columns.is_empty() {
            columns.push("*".to_string());
        }
        columns.extend(
            self.shape
                .output_columns
                .iter()
                .map(|item| self.output_column(item)),
        );

        if columns.is_empty() && !distinct {
            return;
        }
        ops.push(PipeOp::Select { distinct, columns });
    }
}

fn normalize(expr: &str) -> String {
    strip_outer_parens(expr)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Skips the nodes that only prepare a join's inner input.
fn join_input(node: &PlanNode, merge: bool) -> &PlanNode {
    let mut current = node;
    loop {
        let wrapper = match current.node_type.as_str() {
            "Hash" | "Materialize" | "Memoize" => true,
            "Sort" | "Incremental Sort" => merge,
            _ => false,
        };
        match current.inputs().next() {
            Some(child) if wrapper => current = child,
            _ => return current,
        }
    }
}

fn join_keyword(join_type: Option<&str>, no_condition: bool) -> String {
    match join_type {
        None | Some("Inner") if no_condition => "CROSS JOIN".to_string(),
        None | Some("Inner") => "JOIN".to_string(),
        Some(other) => format!("{} JOIN", other.to_ascii_uppercase()),
    }
}

fn scan_source(node: &PlanNode) -> String {
    let name = node
        .relation_name
        .as_ref()
        .or(node.cte_name.as_ref())
        .or(node.function_name.as_ref())
        .or(node.alias.as_ref())
        .cloned()
        .unwrap_or_else(|| node.node_type.clone());

    match &node.alias {
        Some(alias) if *alias != name => format!("{name} AS {alias}"),
        _ => name,
    }
}
