//! Database dialect implementations
//!
//! Each engine family gets one `SqlDialect` implementation. The builder and
//! the connection only talk to the trait; nothing downcasts to a concrete
//! dialect.

use super::fragment::{Prefix, QueryFragment, StatementKind, UnionKind};
use super::placeholder::Statement;
use crate::database::schema::ColumnInfo;
use crate::database::Record;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod mssql;
pub mod mysql;
pub mod postgres;

pub use mssql::MsSqlDialect;
pub use mysql::MySQLDialect;
pub use postgres::PostgresDialect;

/// Database backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    MySQL,
    MariaDB,
    MsSql,
    Postgres,
}

impl DatabaseBackend {
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseBackend::MySQL => "mysql",
            DatabaseBackend::MariaDB => "mariadb",
            DatabaseBackend::MsSql => "mssql",
            DatabaseBackend::Postgres => "postgresql",
        }
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "pdo_mysql" => Ok(DatabaseBackend::MySQL),
            "mariadb" => Ok(DatabaseBackend::MariaDB),
            "mssql" | "sqlsrv" | "sqlserver" | "pdo_sqlsrv" => Ok(DatabaseBackend::MsSql),
            "pgsql" | "postgres" | "postgresql" | "pdo_pgsql" => Ok(DatabaseBackend::Postgres),
            other => Err(Error::configuration(format!(
                "Unsupported database driver '{}'",
                other
            ))),
        }
    }
}

/// Component extracted by the date part helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn keyword(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

/// How a dialect reports the key generated by an INSERT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertId {
    /// The transport's last-insert-id
    LastInsertId,
    /// Append this clause and read the key from the returned row
    Returning(String),
}

/// How `insert_or_update` is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStrategy {
    /// A single statement with a conflict clause
    Native,
    /// Look the key up, then UPDATE or INSERT. Not atomic.
    LookupThenWrite,
}

/// Trait for database-specific SQL generation
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn backend(&self) -> DatabaseBackend;

    /// Dialect name reported in errors and logs
    fn name(&self) -> &'static str {
        self.backend().name()
    }

    /// Quote a single identifier (table name, column name)
    fn quote_identifier(&self, identifier: &str) -> String;

    /// Quote a possibly schema-qualified table name
    ///
    /// Existing quotes of any flavour are stripped first.
    fn quote_table_name(&self, name: &str) -> String {
        let cleaned: String = name
            .chars()
            .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
            .collect();
        match cleaned.split_once('.') {
            Some((schema, table)) => format!(
                "{}.{}",
                self.quote_identifier(schema.trim()),
                self.quote_identifier(table.trim())
            ),
            None => self.quote_identifier(cleaned.trim()),
        }
    }

    /// Generate a parameter placeholder for the given 1-based position
    fn placeholder(&self, position: usize) -> String;

    /// Trailing LIMIT/OFFSET clause of a SELECT, with a leading space
    fn limit_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> String;

    /// `TOP n` placed after SELECT, for dialects that use it
    fn top_syntax(&self, _limit: Option<u64>, _offset: Option<u64>) -> Option<String> {
        None
    }

    /// Whether an OFFSET clause needs an ORDER BY to be valid
    fn offset_requires_order(&self) -> bool {
        false
    }

    /// Row cap placed after UPDATE/DELETE (`TOP (n)`)
    fn write_top_syntax(&self, _limit: u64) -> Option<String> {
        None
    }

    /// Trailing row cap of UPDATE/DELETE (`LIMIT n`)
    fn write_limit_syntax(&self, _limit: u64) -> Option<String> {
        None
    }

    fn supports_full_join(&self) -> bool {
        true
    }

    /// Whether UPDATE/DELETE accept a trailing ORDER BY
    fn supports_ordered_writes(&self) -> bool {
        false
    }

    /// Inline form of a boolean literal
    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Statement wrapper for EXPLAIN, views and temporary tables
    fn prefix_syntax(&self, prefix: &Prefix) -> Result<String> {
        Ok(match prefix {
            Prefix::Explain => "EXPLAIN ".to_string(),
            Prefix::CreateView(view) => format!("CREATE OR REPLACE VIEW {} AS ", view),
            Prefix::CreateTempTable(table) => format!("CREATE TEMPORARY TABLE {} AS ", table),
        })
    }

    /// Expression producing a random value, used for random ordering
    fn random_function(&self) -> &'static str;

    fn current_timestamp(&self) -> &'static str;

    /// Concatenate already-rendered expressions; `separator` is a literal
    fn concat_syntax(&self, parts: &[String], separator: Option<&str>) -> String {
        match separator {
            Some(separator) => format!("CONCAT_WS({}, {})", separator, parts.join(", ")),
            None => format!("CONCAT({})", parts.join(", ")),
        }
    }

    fn group_concat_syntax(
        &self,
        expr: &str,
        separator: &str,
        order: Option<&str>,
        distinct: bool,
    ) -> Result<String>;

    fn if_null_syntax(&self, expr: &str, fallback: &str) -> String {
        format!("COALESCE({}, {})", expr, fallback)
    }

    fn date_part_syntax(&self, part: DatePart, expr: &str) -> String {
        format!("{}({})", part.keyword(), expr)
    }

    fn date_syntax(&self, expr: &str) -> String {
        format!("DATE({})", expr)
    }

    /// Days between two dates, `first - second`
    fn date_diff_syntax(&self, first: &str, second: &str) -> String;

    /// Format a date using the engine's own format language
    fn date_format_syntax(&self, expr: &str, format: &str) -> String;

    /// 1-based position of `needle` in `haystack`, 0 when absent
    fn position_syntax(&self, needle: &str, haystack: &str) -> String;

    /// Conflict clause appended to an INSERT for an upsert
    fn upsert_clause(&self, columns: &[String], primary_key: &str) -> Result<String>;

    fn upsert_strategy(&self) -> UpsertStrategy {
        UpsertStrategy::Native
    }

    /// Clause appended to an upsert so the outcome can be told apart
    fn upsert_returning(&self, _primary_key: &str) -> Option<String> {
        None
    }

    fn insert_id(&self, _primary_key: &str) -> InsertId {
        InsertId::LastInsertId
    }

    /// Statements creating `target` with the structure and rows of `source`
    fn copy_table_sql(&self, source: &str, target: &str) -> Vec<String> {
        vec![
            format!("CREATE TABLE {} LIKE {}", target, source),
            format!("INSERT INTO {} SELECT * FROM {}", target, source),
        ]
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", table)
    }

    /// Native table maintenance statements; `None` when the engine has none
    fn optimize_sql(&self, _table: &str) -> Option<String> {
        None
    }

    fn repair_sql(&self, _table: &str) -> Option<String> {
        None
    }

    /// Statement switching the current database; `None` when it cannot
    fn select_db_sql(&self, database: &str) -> Option<String> {
        Some(format!("USE {}", self.quote_identifier(database)))
    }

    /// Catalog query listing the columns of a table
    ///
    /// Rows carry `Field`, `Type`, `Null`, `Key`, `Default` and `Extra`.
    fn columns_statement(&self, table: &str, schema: Option<&str>) -> Statement;

    /// Normalize one row of `columns_statement`
    fn normalize_column(&self, row: &Record) -> Option<ColumnInfo> {
        ColumnInfo::from_catalog_row(row)
    }

    fn database_exists_statement(&self, database: &str) -> Statement;

    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement;

    fn field_exists_statement(&self, table: &str, column: &str, schema: Option<&str>) -> Statement;

    fn index_exists_statement(
        &self,
        database: &str,
        table: &str,
        index: &str,
        schema: Option<&str>,
    ) -> Statement;

    fn column_type_statement(
        &self,
        database: &str,
        table: &str,
        column: &str,
        schema: Option<&str>,
    ) -> Statement;

    /// Render a fragment into final SQL text with named placeholders
    fn assemble(&self, fragment: &QueryFragment) -> Result<String> {
        assemble(self, fragment)
    }
}

/// Factory function to create the appropriate dialect for a database backend
pub fn create_dialect(backend: DatabaseBackend) -> Arc<dyn SqlDialect> {
    match backend {
        DatabaseBackend::MySQL | DatabaseBackend::MariaDB => Arc::new(MySQLDialect::new()),
        DatabaseBackend::MsSql => Arc::new(MsSqlDialect::new()),
        DatabaseBackend::Postgres => Arc::new(PostgresDialect::new()),
    }
}

/// Clause ordering shared by all dialects
///
/// SELECT…FROM…JOIN…WHERE…GROUP BY…HAVING…ORDER BY…LIMIT, with the
/// dialect hooks deciding TOP, OFFSET and write caps.
pub fn assemble<D: SqlDialect + ?Sized>(dialect: &D, fragment: &QueryFragment) -> Result<String> {
    let mut sql = String::new();
    if let Some(prefix) = &fragment.prefix {
        sql.push_str(&dialect.prefix_syntax(prefix)?);
    }

    match fragment.kind {
        StatementKind::Insert => {
            let target = fragment
                .target
                .as_deref()
                .ok_or_else(|| Error::missing_clause("insert"))?;
            sql.push_str("INSERT INTO ");
            sql.push_str(target);
            if !fragment.insert_columns.is_empty() {
                sql.push_str(&format!(" ({})", fragment.insert_columns.join(", ")));
            }
            match &fragment.insert_select {
                Some(select) => {
                    sql.push(' ');
                    sql.push_str(select);
                }
                None => {
                    if fragment.insert_values.is_empty() {
                        return Err(Error::missing_clause("values"));
                    }
                    sql.push_str(&format!(" VALUES ({})", fragment.insert_values.join(", ")));
                }
            }
            if let Some(upsert) = &fragment.upsert {
                sql.push_str(&dialect.upsert_clause(&upsert.columns, &upsert.primary_key)?);
            }
            return Ok(sql);
        }
        StatementKind::Select => {
            if !fragment.unions.is_empty() {
                let glue = match fragment.union_kind {
                    Some(UnionKind::All) => ") UNION ALL (",
                    _ => ") UNION (",
                };
                let unions = format!("({})", fragment.unions.join(glue));
                if fragment.has_select() {
                    sql.push_str("SELECT ");
                    if let Some(top) = dialect.top_syntax(fragment.limit, fragment.offset) {
                        sql.push_str(&top);
                        sql.push(' ');
                    }
                    sql.push_str(&fragment.select.join(", "));
                    sql.push_str(&format!(" FROM ({}) AS U9", unions));
                } else {
                    if fragment.predicate().is_some()
                        || !fragment.joins.is_empty()
                        || !fragment.group_by.is_empty()
                        || fragment.having.is_some()
                    {
                        return Err(Error::unsupported(
                            dialect.name(),
                            "WHERE, JOIN, GROUP BY or HAVING on a bare UNION; select from the union instead",
                        ));
                    }
                    if dialect
                        .top_syntax(fragment.limit, fragment.offset)
                        .is_some()
                    {
                        return Err(Error::unsupported(
                            dialect.name(),
                            "LIMIT on a bare UNION; select from the union instead",
                        ));
                    }
                    sql.push_str(&unions);
                }
            } else {
                sql.push_str("SELECT ");
                if fragment.distinct {
                    sql.push_str("DISTINCT ");
                }
                if let Some(top) = dialect.top_syntax(fragment.limit, fragment.offset) {
                    sql.push_str(&top);
                    sql.push(' ');
                }
                if fragment.has_select() {
                    sql.push_str(&fragment.select.join(", "));
                } else {
                    sql.push('*');
                }
                if !fragment.from.is_empty() {
                    sql.push_str(" FROM ");
                    sql.push_str(&fragment.from.join(", "));
                }
            }
            push_joins(&mut sql, fragment);
        }
        StatementKind::Update => {
            let target = fragment
                .target
                .as_deref()
                .ok_or_else(|| Error::missing_clause("update"))?;
            if fragment.set.is_empty() {
                return Err(Error::missing_clause("set"));
            }
            sql.push_str("UPDATE ");
            if let Some(top) = fragment.limit.and_then(|n| dialect.write_top_syntax(n)) {
                sql.push_str(&top);
                sql.push(' ');
            }
            sql.push_str(target);
            push_joins(&mut sql, fragment);
            sql.push_str(" SET ");
            sql.push_str(&fragment.set.join(", "));
        }
        StatementKind::Delete => {
            let target = fragment
                .target
                .as_deref()
                .ok_or_else(|| Error::missing_clause("delete"))?;
            sql.push_str("DELETE ");
            if let Some(top) = fragment.limit.and_then(|n| dialect.write_top_syntax(n)) {
                sql.push_str(&top);
                sql.push(' ');
            }
            sql.push_str("FROM ");
            sql.push_str(target);
            push_joins(&mut sql, fragment);
        }
    }

    if let Some(predicate) = fragment.predicate() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }
    if !fragment.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&fragment.group_by.join(", "));
    }
    if let Some(having) = &fragment.having {
        sql.push_str(" HAVING ");
        sql.push_str(having);
    }

    match fragment.kind {
        StatementKind::Select => {
            let limit = dialect.limit_syntax(fragment.limit, fragment.offset);
            if fragment.has_order() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&fragment.order_by.join(", "));
            } else if !limit.is_empty() && dialect.offset_requires_order() {
                sql.push_str(" ORDER BY (SELECT NULL)");
            }
            sql.push_str(&limit);
        }
        _ => {
            if fragment.has_order() {
                if !dialect.supports_ordered_writes() {
                    return Err(Error::unsupported(
                        dialect.name(),
                        format!("ORDER BY on {} statements", fragment.kind.name()),
                    ));
                }
                sql.push_str(" ORDER BY ");
                sql.push_str(&fragment.order_by.join(", "));
            }
            if let Some(limit) = fragment.limit {
                match dialect.write_limit_syntax(limit) {
                    Some(clause) => sql.push_str(&clause),
                    None if dialect.write_top_syntax(limit).is_none() => {
                        log::debug!(
                            "{} ignores the row cap on {:?} statements",
                            dialect.name(),
                            fragment.kind
                        );
                    }
                    None => {}
                }
            }
        }
    }

    Ok(sql)
}

fn push_joins(sql: &mut String, fragment: &QueryFragment) {
    for join in &fragment.joins {
        sql.push(' ');
        sql.push_str(join);
    }
}
