//! Logical to physical table names
//!
//! Code refers to tables by logical name. The physical name is the optional
//! mapping from configuration, with the configured prefix joined by `_`,
//! and finally qualified by the configured schema.

use super::dialects::SqlDialect;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableNames {
    prefix: Option<String>,
    schema: Option<String>,
    mapping: HashMap<String, String>,
}

impl TableNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        self.schema = if schema.is_empty() { None } else { Some(schema) };
        self
    }

    pub fn with_mapping(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.mapping.insert(logical.into(), physical.into());
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Physical, unquoted name of a logical table
    pub fn physical(&self, logical: &str) -> String {
        let name = self
            .mapping
            .get(logical)
            .map(String::as_str)
            .unwrap_or(logical);
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Quoted, schema-qualified name ready to embed in SQL
    ///
    /// A logical name that already carries a schema (`audit.events`) keeps it.
    pub fn qualified(&self, dialect: &dyn SqlDialect, logical: &str) -> String {
        let logical = logical.trim();
        let (schema, table) = match logical.rsplit_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (self.schema.as_deref(), logical),
        };
        let table = dialect.quote_identifier(&self.physical(table));
        match schema {
            Some(schema) => format!("{}.{}", dialect.quote_identifier(schema), table),
            None => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialects::{MsSqlDialect, MySQLDialect, PostgresDialect};

    #[test]
    fn test_prefix_and_mapping() {
        let names = TableNames::new()
            .with_prefix("app")
            .with_mapping("user", "members");

        assert_eq!(names.physical("user"), "app_members");
        assert_eq!(names.physical("post"), "app_post");
        assert_eq!(
            names.qualified(&MySQLDialect::new(), "user"),
            "`app_members`"
        );
    }

    #[test]
    fn test_schema_qualification() {
        let names = TableNames::new().with_schema("dbo");
        assert_eq!(names.qualified(&MsSqlDialect::new(), "users"), "[dbo].[users]");

        let names = TableNames::new();
        assert_eq!(
            names.qualified(&PostgresDialect::new(), "audit.events"),
            "\"audit\".\"events\""
        );
    }
}
