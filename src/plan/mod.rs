//! Query execution plans.
//!
//! Typed view of PostgreSQL's `EXPLAIN (ANALYZE, FORMAT JSON)` output, plus the
//! flattened step list used by reports.

pub mod clean;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::error::{Result, SqlPipeError};
use crate::shape::{QueryShape, StatementKind};
use clean::{clean_condition, split_sort_key, AliasMap};

/// One EXPLAIN ANALYZE result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explain {
    /// Root of the plan tree.
    pub plan: PlanNode,
    /// Planning time in milliseconds, when reported.
    pub planning_time_ms: Option<f64>,
    /// Execution time in milliseconds, when reported.
    pub execution_time_ms: Option<f64>,
}

#[derive(Deserialize)]
struct ExplainDocument {
    #[serde(rename = "Plan")]
    plan: PlanNode,
    #[serde(rename = "Planning Time", default)]
    planning_time: Option<f64>,
    #[serde(rename = "Execution Time", default)]
    execution_time: Option<f64>,
}

impl Explain {
    /// Builds an Explain from the JSON PostgreSQL returns.
    ///
    /// Accepts the bare `{"Plan": …}` object, the usual one-element array, and
    /// the extra array nesting some drivers add around result rows.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let mut value = value;
        loop {
            match value {
                serde_json::Value::Array(mut items) => {
                    if items.is_empty() {
                        return Err(SqlPipeError::plan("EXPLAIN returned no plan"));
                    }
                    value = items.swap_remove(0);
                }
                serde_json::Value::Object(_) => break,
                other => {
                    return Err(SqlPipeError::plan(format!(
                        "Expected a JSON object or array, got: {other}"
                    )))
                }
            }
        }

        let doc: ExplainDocument = serde_json::from_value(value)
            .map_err(|e| SqlPipeError::plan(format!("Unrecognized EXPLAIN output: {e}")))?;

        Ok(Self {
            plan: doc.plan,
            planning_time_ms: doc.planning_time,
            execution_time_ms: doc.execution_time,
        })
    }

    /// Parses EXPLAIN JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value = serde_json::from_str(text)
            .map_err(|e| SqlPipeError::plan(format!("Invalid EXPLAIN JSON: {e}")))?;
        Self::from_json(value)
    }
}

/// A node of the plan tree, named after PostgreSQL's JSON keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(rename = "Node Type")]
    pub node_type: String,
    #[serde(rename = "Operation", default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(rename = "Strategy", default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(rename = "Partial Mode", default, skip_serializing_if = "Option::is_none")]
    pub partial_mode: Option<String>,
    #[serde(
        rename = "Parent Relationship",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_relationship: Option<String>,
    #[serde(rename = "Subplan Name", default, skip_serializing_if = "Option::is_none")]
    pub subplan_name: Option<String>,
    #[serde(rename = "Relation Name", default, skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,
    #[serde(rename = "Alias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "CTE Name", default, skip_serializing_if = "Option::is_none")]
    pub cte_name: Option<String>,
    #[serde(rename = "Function Name", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(rename = "Index Name", default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(rename = "Scan Direction", default, skip_serializing_if = "Option::is_none")]
    pub scan_direction: Option<String>,
    #[serde(rename = "Join Type", default, skip_serializing_if = "Option::is_none")]
    pub join_type: Option<String>,
    #[serde(rename = "Hash Cond", default, skip_serializing_if = "Option::is_none")]
    pub hash_cond: Option<String>,
    #[serde(rename = "Merge Cond", default, skip_serializing_if = "Option::is_none")]
    pub merge_cond: Option<String>,
    #[serde(rename = "Join Filter", default, skip_serializing_if = "Option::is_none")]
    pub join_filter: Option<String>,
    #[serde(rename = "Filter", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(rename = "Index Cond", default, skip_serializing_if = "Option::is_none")]
    pub index_cond: Option<String>,
    #[serde(rename = "Recheck Cond", default, skip_serializing_if = "Option::is_none")]
    pub recheck_cond: Option<String>,
    #[serde(rename = "Sort Key", default, skip_serializing_if = "Vec::is_empty")]
    pub sort_key: Vec<String>,
    #[serde(rename = "Group Key", default, skip_serializing_if = "Vec::is_empty")]
    pub group_key: Vec<String>,
    #[serde(rename = "Presorted Key", default, skip_serializing_if = "Vec::is_empty")]
    pub presorted_key: Vec<String>,
    #[serde(rename = "Plan Rows", default, skip_serializing_if = "Option::is_none")]
    pub plan_rows: Option<f64>,
    #[serde(rename = "Actual Rows", default, skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<f64>,
    #[serde(rename = "Actual Loops", default, skip_serializing_if = "Option::is_none")]
    pub actual_loops: Option<f64>,
    #[serde(
        rename = "Actual Total Time",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub actual_total_time: Option<f64>,
    #[serde(rename = "Plans", default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<PlanNode>,
}

impl PlanNode {
    /// Creates a node of the given type with no details.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Default::default()
        }
    }

    /// Children that feed this node's rows (InitPlans and SubPlans excluded).
    pub fn inputs(&self) -> impl Iterator<Item = &PlanNode> {
        self.plans.iter().filter(|child| !child.is_subplan())
    }

    /// Returns true for InitPlan/SubPlan children.
    pub fn is_subplan(&self) -> bool {
        matches!(
            self.parent_relationship.as_deref(),
            Some("InitPlan") | Some("SubPlan")
        )
    }

    /// Returns true for the lower half of a parallel two-phase aggregate.
    pub fn is_partial_aggregate(&self) -> bool {
        self.partial_mode.as_deref() == Some("Partial")
    }

    /// Index-side condition of a scan: `Index Cond`, or `Recheck Cond` for bitmap scans.
    pub fn index_condition(&self) -> Option<&str> {
        self.index_cond.as_deref().or(self.recheck_cond.as_deref())
    }

    /// The node type as PostgreSQL's text EXPLAIN would print it.
    pub fn display_name(&self) -> String {
        let base = match (self.node_type.as_str(), self.strategy.as_deref()) {
            ("Aggregate", Some("Hashed")) => "HashAggregate".to_string(),
            ("Aggregate", Some("Sorted")) => "GroupAggregate".to_string(),
            ("Aggregate", Some("Mixed")) => "MixedAggregate".to_string(),
            ("ModifyTable", _) => self
                .operation
                .clone()
                .unwrap_or_else(|| self.node_type.clone()),
            (other, _) => other.to_string(),
        };
        match self.partial_mode.as_deref() {
            Some(mode @ ("Partial" | "Finalize")) => format!("{mode} {base}"),
            _ => base,
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.plans.iter().map(PlanNode::node_count).sum::<usize>()
    }
}

/// Broad role of a plan node, used when walking the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Scan,
    SubqueryScan,
    Join,
    Aggregate,
    Window,
    Sort,
    Limit,
    Unique,
    Append,
    Modify,
    /// Nodes that do not change the logical query (Hash, Gather, Materialize, …).
    PassThrough,
}

impl NodeClass {
    /// Classifies a node by its type.
    pub fn of(node: &PlanNode) -> Self {
        match node.node_type.as_str() {
            "Subquery Scan" => Self::SubqueryScan,
            "Bitmap Index Scan" => Self::PassThrough,
            t if t.ends_with("Scan") => Self::Scan,
            "Hash Join" | "Merge Join" | "Nested Loop" => Self::Join,
            "Aggregate" | "Group" => Self::Aggregate,
            "WindowAgg" => Self::Window,
            "Sort" | "Incremental Sort" => Self::Sort,
            "Limit" => Self::Limit,
            "Unique" => Self::Unique,
            "Append" | "Merge Append" => Self::Append,
            "ModifyTable" => Self::Modify,
            _ => Self::PassThrough,
        }
    }
}

/// Kind of a flattened plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepKind {
    Select,
    From,
    Join,
    Where,
    Order,
    Group,
    Limit,
    Aggregate,
    Window,
    Update,
    Set,
}

impl StepKind {
    /// Maps a plan node onto a step kind; nodes without a logical role map to None.
    pub fn from_node(node: &PlanNode) -> Option<Self> {
        let node_type = node.node_type.to_ascii_lowercase();
        if node_type == "bitmap index scan" {
            return None;
        }
        if node_type == "modifytable" {
            return (node.operation.as_deref() == Some("Update")).then_some(Self::Update);
        }
        if node_type.contains("scan") {
            Some(Self::From)
        } else if node_type.contains("join") || node_type == "nested loop" {
            Some(Self::Join)
        } else if node_type.contains("sort") {
            Some(Self::Order)
        } else if node_type == "windowagg" {
            Some(Self::Window)
        } else if node_type.contains("aggregate") {
            Some(Self::Aggregate)
        } else if node_type == "group" {
            Some(Self::Group)
        } else if node_type == "limit" {
            Some(Self::Limit)
        } else {
            None
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "SELECT",
            Self::From => "FROM",
            Self::Join => "JOIN",
            Self::Where => "WHERE",
            Self::Order => "ORDER",
            Self::Group => "GROUP",
            Self::Limit => "LIMIT",
            Self::Aggregate => "AGGREGATE",
            Self::Window => "WINDOW",
            Self::Update => "UPDATE",
            Self::Set => "SET",
        };
        f.write_str(name)
    }
}

/// One entry of the flattened plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub kind: StepKind,
    /// PostgreSQL node type; None for steps derived from another node.
    pub node_type: Option<String>,
    pub details: BTreeMap<String, String>,
}

/// Condition-like keys copied into step details.
const CONDITION_KEYS: [&str; 6] = [
    "Hash Cond",
    "Merge Cond",
    "Join Filter",
    "Filter",
    "Index Cond",
    "Recheck Cond",
];

/// Flattens the plan breadth-first, root first.
///
/// Partial aggregates are dropped. Every scan carrying a filter or index
/// condition is preceded by a WHERE step holding that condition. Names from
/// the SQL are woven in: aggregate steps get their `expr AS alias` items, a
/// SELECT step with the output columns leads the list, and an UPDATE is
/// preceded by its SET step instead.
pub fn unwrap_steps(root: &PlanNode, shape: &QueryShape) -> Vec<PlanStep> {
    let aliases = &shape.aliases;
    let mut steps = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        queue.extend(node.plans.iter());

        let Some(kind) = StepKind::from_node(node) else {
            continue;
        };
        if kind == StepKind::Aggregate && node.is_partial_aggregate() {
            continue;
        }
        steps.push(PlanStep {
            kind,
            node_type: Some(node.node_type.clone()),
            details: step_details(node, aliases),
        });
    }

    label_aggregate_steps(&mut steps, shape);
    inject_statement_step(&mut steps, shape);
    inject_where_steps(&mut steps);
    steps
}

fn derived_step(kind: StepKind, key: &str, value: String) -> PlanStep {
    PlanStep {
        kind,
        node_type: None,
        details: BTreeMap::from([(key.to_string(), value)]),
    }
}

/// Pairs aggregate steps with query levels: the deepest step computes the
/// innermost level.
fn label_aggregate_steps(steps: &mut [PlanStep], shape: &QueryShape) {
    let aggregates = steps
        .iter_mut()
        .rev()
        .filter(|step| step.kind == StepKind::Aggregate);
    for (step, level) in aggregates.zip(&shape.aggregate_levels) {
        if !level.items.is_empty() {
            let items: Vec<String> = level.items.iter().map(|item| item.render()).collect();
            step.details.insert("Items".to_string(), items.join(", "));
        }
    }
}

/// Adds the SET of an UPDATE, or the final SELECT of a query.
fn inject_statement_step(steps: &mut Vec<PlanStep>, shape: &QueryShape) {
    if shape.kind == StatementKind::Update {
        let update = steps.iter().position(|step| step.kind == StepKind::Update);
        if let (Some(index), false) = (update, shape.assignments.is_empty()) {
            let set = derived_step(StepKind::Set, "Assignments", shape.assignments.join(", "));
            steps.insert(index, set);
        }
        return;
    }
    if shape.kind.modifies_data() {
        return;
    }

    let mut columns: Vec<&str> = Vec::new();
    if shape.wildcard && !shape.output_columns.is_empty() {
        columns.push("*");
    }
    columns.extend(shape.output_columns.iter().map(|item| item.output_name()));
    if columns.is_empty() {
        return;
    }

    let mut select = derived_step(StepKind::Select, "Columns", columns.join(", "));
    if shape.distinct {
        select
            .details
            .insert("Distinct".to_string(), "true".to_string());
    }
    steps.insert(0, select);
}

fn step_details(node: &PlanNode, aliases: &AliasMap) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();

    let keys = [
        ("Sort Key", &node.sort_key),
        ("Group Key", &node.group_key),
        ("Presorted Key", &node.presorted_key),
    ];
    for (name, values) in keys {
        if !values.is_empty() {
            let cleaned: Vec<String> = values.iter().map(|k| clean_key(k, aliases)).collect();
            details.insert(name.to_string(), cleaned.join(","));
        }
    }

    let conditions = [
        &node.hash_cond,
        &node.merge_cond,
        &node.join_filter,
        &node.filter,
        &node.index_cond,
        &node.recheck_cond,
    ];
    for (name, value) in CONDITION_KEYS.iter().zip(conditions) {
        if let Some(value) = value {
            details.insert(name.to_string(), clean_condition(value));
        }
    }

    let plain = [
        ("Relation Name", &node.relation_name),
        ("Alias", &node.alias),
        ("Index Name", &node.index_name),
        ("Scan Direction", &node.scan_direction),
        ("Join Type", &node.join_type),
        ("Partial Mode", &node.partial_mode),
    ];
    for (name, value) in plain {
        if let Some(value) = value {
            details.insert(name.to_string(), value.clone());
        }
    }

    if let Some(time) = node.actual_total_time {
        details.insert("Actual Total Time".to_string(), format!("{time:.3}"));
    }
    if node.node_type == "Limit" {
        if let Some(rows) = node.plan_rows {
            details.insert("Plan Rows".to_string(), format!("{}", rows as u64));
        }
    }

    details
}

fn inject_where_steps(steps: &mut Vec<PlanStep>) {
    let mut index = 0;
    while index < steps.len() {
        let step = &steps[index];
        let condition = if step.kind == StepKind::From {
            ["Index Cond", "Recheck Cond", "Filter"]
                .iter()
                .filter_map(|key| step.details.get(*key))
                .cloned()
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        if condition.is_empty() {
            index += 1;
            continue;
        }
        let where_step = PlanStep {
            kind: StepKind::Where,
            node_type: None,
            details: BTreeMap::from([("Condition".to_string(), join_conditions(&condition))]),
        };
        steps.insert(index, where_step);
        index += 2;
    }
}

/// Cleans a sort or group key and maps it onto a known alias.
pub fn clean_key(key: &str, aliases: &AliasMap) -> String {
    let (expr, suffix) = split_sort_key(key);
    let expr = aliases.substitute(&clean_condition(expr));
    format!("{expr}{suffix}")
}

/// Joins cleaned conditions with AND, parenthesizing any that contain OR.
pub fn join_conditions(conditions: &[String]) -> String {
    if conditions.len() == 1 {
        return conditions[0].clone();
    }
    conditions
        .iter()
        .map(|c| {
            if c.to_ascii_uppercase().contains(" OR ") {
                format!("({c})")
            } else {
                c.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}
