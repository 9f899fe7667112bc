//! MySQL/MariaDB dialect implementation
//!
//! Backtick quoting, `LIMIT start,n`, `ON DUPLICATE KEY UPDATE` upserts and
//! `information_schema` lookups scoped to `DATABASE()`.

use super::{DatePart, SqlDialect};
use crate::error::Result;
use crate::query::placeholder::Statement;
use crate::query::Value;

/// Largest row count MySQL accepts, used for offset-only queries
const MAX_ROWS: &str = "18446744073709551615";

/// MySQL/MariaDB dialect
#[derive(Debug, Clone, Copy)]
pub struct MySQLDialect;

impl MySQLDialect {
    /// Create a new MySQL dialect
    pub fn new() -> Self {
        Self
    }
}

impl Default for MySQLDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MySQLDialect {
    fn backend(&self) -> super::DatabaseBackend {
        super::DatabaseBackend::MySQL
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn limit_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset.filter(|o| *o > 0)) {
            (Some(limit), Some(offset)) => format!(" LIMIT {},{}", offset, limit),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (None, Some(offset)) => format!(" LIMIT {},{}", offset, MAX_ROWS),
            (None, None) => String::new(),
        }
    }

    fn write_limit_syntax(&self, limit: u64) -> Option<String> {
        Some(format!(" LIMIT {}", limit))
    }

    fn supports_full_join(&self) -> bool {
        false
    }

    fn supports_ordered_writes(&self) -> bool {
        true
    }

    fn random_function(&self) -> &'static str {
        "RAND()"
    }

    fn current_timestamp(&self) -> &'static str {
        "NOW()"
    }

    fn group_concat_syntax(
        &self,
        expr: &str,
        separator: &str,
        order: Option<&str>,
        distinct: bool,
    ) -> Result<String> {
        let mut sql = String::from("GROUP_CONCAT(");
        if distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(expr);
        if let Some(order) = order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql.push_str(" SEPARATOR ");
        sql.push_str(separator);
        sql.push(')');
        Ok(sql)
    }

    fn if_null_syntax(&self, expr: &str, fallback: &str) -> String {
        format!("IFNULL({}, {})", expr, fallback)
    }

    fn date_part_syntax(&self, part: DatePart, expr: &str) -> String {
        format!("{}({})", part.keyword(), expr)
    }

    fn date_diff_syntax(&self, first: &str, second: &str) -> String {
        format!("DATEDIFF({}, {})", first, second)
    }

    fn date_format_syntax(&self, expr: &str, format: &str) -> String {
        format!("DATE_FORMAT({}, {})", expr, format)
    }

    fn position_syntax(&self, needle: &str, haystack: &str) -> String {
        format!("LOCATE({}, {})", needle, haystack)
    }

    fn upsert_clause(&self, columns: &[String], _primary_key: &str) -> Result<String> {
        let updates: Vec<String> = columns
            .iter()
            .map(|column| {
                let quoted = self.quote_identifier(column);
                format!("{}=VALUES({})", quoted, quoted)
            })
            .collect();
        Ok(format!(" ON DUPLICATE KEY UPDATE {}", updates.join(", ")))
    }

    fn optimize_sql(&self, table: &str) -> Option<String> {
        Some(format!("OPTIMIZE TABLE {}", table))
    }

    fn repair_sql(&self, table: &str) -> Option<String> {
        Some(format!("REPAIR TABLE {}", table))
    }

    fn columns_statement(&self, table: &str, _schema: Option<&str>) -> Statement {
        Statement::raw(format!("SHOW FULL COLUMNS FROM {}", self.quote_table_name(table)))
    }

    fn database_exists_statement(&self, database: &str) -> Statement {
        Statement::with_values(
            "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = :p0",
            vec![Value::from(database)],
        )
    }

    fn table_exists_statement(&self, table: &str, _schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = :p0",
            vec![Value::from(table)],
        )
    }

    fn field_exists_statement(&self, table: &str, column: &str, _schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = :p0 AND COLUMN_NAME = :p1",
            vec![Value::from(table), Value::from(column)],
        )
    }

    fn index_exists_statement(
        &self,
        database: &str,
        table: &str,
        index: &str,
        _schema: Option<&str>,
    ) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM information_schema.STATISTICS WHERE TABLE_SCHEMA = :p0 AND TABLE_NAME = :p1 AND INDEX_NAME = :p2",
            vec![Value::from(database), Value::from(table), Value::from(index)],
        )
    }

    fn column_type_statement(
        &self,
        database: &str,
        table: &str,
        column: &str,
        _schema: Option<&str>,
    ) -> Statement {
        Statement::with_values(
            "SELECT DATA_TYPE FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = :p0 AND TABLE_NAME = :p1 AND COLUMN_NAME = :p2",
            vec![Value::from(database), Value::from(table), Value::from(column)],
        )
    }
}
