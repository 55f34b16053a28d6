//! Statement gate.
//!
//! Decides which statements may be handed to `EXPLAIN ANALYZE` and flags the
//! ones whose execution writes data.

mod parser;

pub use parser::check_explainable;

use serde::Serialize;
use std::fmt;

/// Whether running a statement writes data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DataAccess {
    ReadOnly,
    /// INSERT, UPDATE, DELETE, MERGE, or a query with a data-modifying CTE.
    Modifying,
}

impl DataAccess {
    pub fn modifies_data(&self) -> bool {
        *self == Self::Modifying
    }
}

/// The kind of statement submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Explain,
    /// More than one statement in a single submission.
    Multiple(usize),
    /// Anything else, named by its leading keyword.
    Other(String),
}

impl StatementType {
    /// Returns true if PostgreSQL can run `EXPLAIN ANALYZE` on this statement.
    pub fn is_explainable(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::Insert | Self::Update | Self::Delete | Self::Merge
        )
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Merge => write!(f, "MERGE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Multiple(count) => write!(f, "{count} statements"),
            Self::Other(keyword) => write!(f, "{keyword}"),
        }
    }
}

/// Outcome of the statement gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub access: DataAccess,
    pub statement_type: StatementType,
    /// Set when analyzing the statement will execute writes.
    pub warning: Option<String>,
}
