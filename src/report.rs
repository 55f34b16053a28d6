//! Rendering analyses as text, JSON, Graphviz DOT or graph elements.

use std::fmt::Write as _;
use std::str::FromStr;

use serde_json::json;

use crate::error::{Result, SqlPipeError};
use crate::pipeline::Analysis;
use crate::plan::clean::{clean_condition, strip_qualifiers};
use crate::plan::{Explain, PlanNode};

/// Output format for headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plan tree and pipe syntax as plain text.
    #[default]
    Text,
    /// Every analysis serialized as JSON.
    Json,
    /// Graphviz DOT, one digraph per statement.
    Dot,
    /// Plan graph as a Cytoscape element list.
    Elements,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "dot" => Ok(Self::Dot),
            "elements" => Ok(Self::Elements),
            _ => Err(format!(
                "Invalid output format: '{}'. Valid options: text, json, dot, elements",
                s
            )),
        }
    }
}

/// Renders a batch of analyses in the requested format.
pub fn render(analyses: &[Analysis], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(analyses)),
        OutputFormat::Json => render_json(analyses),
        OutputFormat::Dot => Ok(render_dot(analyses)),
        OutputFormat::Elements => render_elements(analyses),
    }
}

fn render_text(analyses: &[Analysis]) -> String {
    let numbered = analyses.len() > 1;
    analyses
        .iter()
        .enumerate()
        .map(|(i, analysis)| {
            let mut out = String::new();
            if numbered {
                let _ = writeln!(out, "-- Statement {}", i + 1);
            }
            out.push_str(&plan_section(&analysis.explain));
            out.push('\n');
            out.push_str(&pipe_section(analysis));
            out
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_json(analyses: &[Analysis]) -> Result<String> {
    let result = match analyses {
        [single] => serde_json::to_string_pretty(single),
        many => serde_json::to_string_pretty(many),
    };
    result.map_err(|e| SqlPipeError::internal(format!("Failed to serialize analysis: {e}")))
}

fn render_dot(analyses: &[Analysis]) -> String {
    analyses
        .iter()
        .enumerate()
        .map(|(i, analysis)| analysis.graph.to_dot(&format!("statement_{}", i + 1)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A single statement yields its bare element list; several are numbered.
fn render_elements(analyses: &[Analysis]) -> Result<String> {
    let value = match analyses {
        [single] => serde_json::Value::from(single.graph.to_elements()),
        many => many
            .iter()
            .enumerate()
            .map(|(i, analysis)| {
                json!({ "statement": i + 1, "elements": analysis.graph.to_elements() })
            })
            .collect(),
    };
    serde_json::to_string_pretty(&value)
        .map_err(|e| SqlPipeError::internal(format!("Failed to serialize plan graph: {e}")))
}

/// The "Query Execution Plan" section: timings followed by the plan tree.
pub fn plan_section(explain: &Explain) -> String {
    let mut out = String::from("-- Query Execution Plan\n");
    if let Some(ms) = explain.execution_time_ms {
        let _ = write!(out, "-- Execution Time: {ms:.3} ms");
        if let Some(planning) = explain.planning_time_ms {
            let _ = write!(out, " (planning {planning:.3} ms)");
        }
        out.push('\n');
    }
    out.push_str(&plan_tree(&explain.plan));
    out
}

/// The "Pipe Syntax" section.
pub fn pipe_section(analysis: &Analysis) -> String {
    format!("-- Pipe Syntax\n{}\n", analysis.pipe_syntax)
}

/// Indented plan tree, one node per line with its details beneath it.
pub fn plan_tree(root: &PlanNode) -> String {
    let mut out = String::new();
    write_node(&mut out, root, "", None);
    out
}

fn write_node(out: &mut String, node: &PlanNode, prefix: &str, last: Option<bool>) {
    let (connector, child_prefix) = match last {
        None => ("", String::new()),
        Some(true) => ("└─ ", format!("{prefix}   ")),
        Some(false) => ("├─ ", format!("{prefix}│  ")),
    };
    let _ = writeln!(out, "{prefix}{connector}{}", node_heading(node));

    for (label, value) in node_details(node) {
        let _ = writeln!(out, "{child_prefix}   {label}: {value}");
    }

    let count = node.plans.len();
    for (i, child) in node.plans.iter().enumerate() {
        write_node(out, child, &child_prefix, Some(i + 1 == count));
    }
}

fn node_heading(node: &PlanNode) -> String {
    let mut heading = node.display_name();
    if let Some(name) = &node.subplan_name {
        heading = format!("{heading} [{name}]");
    }
    if let Some(relation) = node.relation_name.as_ref().or(node.cte_name.as_ref()) {
        let _ = write!(heading, " on {relation}");
        if let Some(alias) = node.alias.as_ref().filter(|a| *a != relation) {
            let _ = write!(heading, " {alias}");
        }
    }
    if let Some(index) = &node.index_name {
        let _ = write!(heading, " using {index}");
    }

    match (node.actual_total_time, node.actual_rows) {
        (Some(time), Some(rows)) => {
            let _ = write!(heading, "  (actual time {time:.3} ms, rows {rows})");
        }
        (Some(time), None) => {
            let _ = write!(heading, "  (actual time {time:.3} ms)");
        }
        _ => {}
    }
    heading
}

fn node_details(node: &PlanNode) -> Vec<(&'static str, String)> {
    let conditions = [
        ("Hash Cond", &node.hash_cond),
        ("Merge Cond", &node.merge_cond),
        ("Join Filter", &node.join_filter),
        ("Index Cond", &node.index_cond),
        ("Recheck Cond", &node.recheck_cond),
        ("Filter", &node.filter),
    ];
    let mut details: Vec<(&'static str, String)> = conditions
        .into_iter()
        .filter_map(|(label, cond)| cond.as_deref().map(|c| (label, clean_condition(c))))
        .collect();

    let keys = [
        ("Sort Key", &node.sort_key),
        ("Group Key", &node.group_key),
    ];
    for (label, values) in keys {
        if !values.is_empty() {
            let joined = values
                .iter()
                .map(|k| strip_qualifiers(k))
                .collect::<Vec<_>>()
                .join(", ");
            details.push((label, joined));
        }
    }
    details
}
