//! Plan graph.
//!
//! Nodes and edges of the plan tree, for flowchart rendering.

use serde::Serialize;
use serde_json::json;

use crate::plan::PlanNode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

/// The plan tree as a directed graph, edges pointing from parent to child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl PlanGraph {
    /// Builds the graph; node ids are `n0`, `n1`, … in pre-order.
    pub fn from_plan(root: &PlanNode) -> Self {
        let mut graph = Self::default();
        graph.visit(root, None);
        graph
    }

    fn visit(&mut self, node: &PlanNode, parent: Option<&str>) {
        let id = format!("n{}", self.nodes.len());
        self.nodes.push(GraphNode {
            id: id.clone(),
            label: node_label(node),
        });
        if let Some(parent) = parent {
            self.edges.push(GraphEdge {
                source: parent.to_string(),
                target: id.clone(),
            });
        }
        for child in &node.plans {
            self.visit(child, Some(&id));
        }
    }

    /// Graphviz DOT rendering.
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = format!("digraph {} {{\n", dot_id(name));
        out.push_str("    rankdir=BT;\n    node [shape=box];\n");
        for node in &self.nodes {
            out.push_str(&format!(
                "    {} [label={}];\n",
                node.id,
                dot_id(&node.label)
            ));
        }
        // Rows flow upward, from child to parent
        for edge in &self.edges {
            out.push_str(&format!("    {} -> {};\n", edge.target, edge.source));
        }
        out.push('}');
        out
    }

    /// Cytoscape element list: one `{"data": …}` object per node and edge.
    pub fn to_elements(&self) -> Vec<serde_json::Value> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| json!({ "data": { "id": n.id, "label": n.label } }));
        let edges = self
            .edges
            .iter()
            .map(|e| json!({ "data": { "source": e.source, "target": e.target } }));
        nodes.chain(edges).collect()
    }
}

fn node_label(node: &PlanNode) -> String {
    let name = node.display_name();
    match node.relation_name.as_ref().or(node.cte_name.as_ref()) {
        Some(relation) => format!("{name} on {relation}"),
        None => name,
    }
}

fn dot_id(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}
