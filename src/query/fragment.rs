//! Accumulated clause state of one query
//!
//! Every string in here is already rendered for the target dialect
//! (identifiers quoted, placeholders named). Dialects only decide how the
//! pieces are stitched together.

use super::placeholder::Bindings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    /// Operation name handed to the query logger
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }
}

/// Statement wrapper emitted ahead of the main statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    Explain,
    /// Quoted view name
    CreateView(String),
    /// Quoted table name
    CreateTempTable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionKind {
    Distinct,
    All,
}

/// Insert-time conflict handling requested through the builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertClause {
    /// Unquoted column names, in insert order
    pub columns: Vec<String>,
    pub primary_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFragment {
    pub kind: StatementKind,
    pub prefix: Option<Prefix>,
    pub distinct: bool,
    pub select: Vec<String>,
    pub from: Vec<String>,
    pub joins: Vec<String>,
    pub where_clause: Option<String>,
    pub exists: Vec<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Target table of INSERT/UPDATE/DELETE
    pub target: Option<String>,
    pub set: Vec<String>,
    pub insert_columns: Vec<String>,
    pub insert_values: Vec<String>,
    pub insert_select: Option<String>,
    pub upsert: Option<UpsertClause>,
    pub unions: Vec<String>,
    pub union_kind: Option<UnionKind>,
    pub bindings: Bindings,
}

impl QueryFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_select(&self) -> bool {
        !self.select.is_empty()
    }

    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    /// WHERE body including the EXISTS predicates, if any
    pub fn predicate(&self) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(where_clause) = &self.where_clause {
            parts.push(where_clause);
        }
        parts.extend(self.exists.iter().map(String::as_str));
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}
