//! SQL Server dialect implementation
//!
//! Bracket quoting, `TOP n` for plain limits, `OFFSET … FETCH NEXT` for
//! paged queries and `@Pn` placeholders. There is no single-statement
//! upsert here; `insert_or_update` looks the key up first.

use super::{DatePart, SqlDialect, UpsertStrategy};
use crate::error::{Error, Result};
use crate::query::fragment::Prefix;
use crate::query::placeholder::Statement;
use crate::query::Value;

/// SQL Server dialect
#[derive(Debug, Clone, Copy)]
pub struct MsSqlDialect;

impl MsSqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MsSqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MsSqlDialect {
    fn backend(&self) -> super::DatabaseBackend {
        super::DatabaseBackend::MsSql
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("@P{}", position)
    }

    fn limit_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset.filter(|o| *o > 0)) {
            (Some(limit), Some(offset)) => {
                format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
            }
            (None, Some(offset)) => format!(" OFFSET {} ROWS", offset),
            // plain limits are rendered as TOP
            _ => String::new(),
        }
    }

    fn top_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset.filter(|o| *o > 0)) {
            (Some(limit), None) => Some(format!("TOP {}", limit)),
            _ => None,
        }
    }

    fn offset_requires_order(&self) -> bool {
        true
    }

    fn write_top_syntax(&self, limit: u64) -> Option<String> {
        Some(format!("TOP ({})", limit))
    }

    fn prefix_syntax(&self, prefix: &Prefix) -> Result<String> {
        match prefix {
            Prefix::Explain => Err(Error::unsupported(
                self.name(),
                "EXPLAIN; use SET SHOWPLAN_ALL on the session",
            )),
            Prefix::CreateView(view) => Ok(format!("CREATE OR ALTER VIEW {} AS ", view)),
            Prefix::CreateTempTable(_) => Err(Error::unsupported(
                self.name(),
                "CREATE TEMPORARY TABLE; use SELECT … INTO #table",
            )),
        }
    }

    fn random_function(&self) -> &'static str {
        "NEWID()"
    }

    // SELECT INTO copies columns and rows, not keys or indexes
    fn copy_table_sql(&self, source: &str, target: &str) -> Vec<String> {
        vec![format!("SELECT * INTO {} FROM {}", target, source)]
    }

    fn current_timestamp(&self) -> &'static str {
        "GETDATE()"
    }

    fn concat_syntax(&self, parts: &[String], separator: Option<&str>) -> String {
        match separator {
            Some(separator) => parts.join(&format!(" + {} + ", separator)),
            None => parts.join(" + "),
        }
    }

    fn group_concat_syntax(
        &self,
        expr: &str,
        separator: &str,
        order: Option<&str>,
        distinct: bool,
    ) -> Result<String> {
        if distinct {
            return Err(Error::unsupported(self.name(), "STRING_AGG(DISTINCT …)"));
        }
        let mut sql = format!("STRING_AGG({}, {})", expr, separator);
        if let Some(order) = order {
            sql.push_str(&format!(" WITHIN GROUP (ORDER BY {})", order));
        }
        Ok(sql)
    }

    fn if_null_syntax(&self, expr: &str, fallback: &str) -> String {
        format!("ISNULL({}, {})", expr, fallback)
    }

    fn date_part_syntax(&self, part: DatePart, expr: &str) -> String {
        format!("DATEPART({}, {})", part.keyword().to_lowercase(), expr)
    }

    fn date_syntax(&self, expr: &str) -> String {
        format!("CAST({} AS DATE)", expr)
    }

    fn date_diff_syntax(&self, first: &str, second: &str) -> String {
        format!("DATEDIFF(day, {}, {})", second, first)
    }

    fn date_format_syntax(&self, expr: &str, format: &str) -> String {
        format!("FORMAT({}, {})", expr, format)
    }

    fn position_syntax(&self, needle: &str, haystack: &str) -> String {
        format!("CHARINDEX({}, {})", needle, haystack)
    }

    fn upsert_clause(&self, _columns: &[String], _primary_key: &str) -> Result<String> {
        Err(Error::unsupported(
            self.name(),
            "INSERT … ON CONFLICT; use Connection::insert_or_update",
        ))
    }

    fn upsert_strategy(&self) -> UpsertStrategy {
        UpsertStrategy::LookupThenWrite
    }

    fn columns_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT c.COLUMN_NAME AS [Field], c.DATA_TYPE AS [Type], c.IS_NULLABLE AS [Null], \
             c.COLUMN_DEFAULT AS [Default], \
             CASE WHEN COLUMNPROPERTY(OBJECT_ID(c.TABLE_SCHEMA + '.' + c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity') = 1 \
             THEN 'auto_increment' ELSE '' END AS [Extra], \
             ISNULL((SELECT TOP 1 CASE WHEN tc.CONSTRAINT_TYPE = 'PRIMARY KEY' THEN 'PRI' ELSE 'UNI' END \
             FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
             JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc ON tc.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
             AND tc.TABLE_SCHEMA = k.TABLE_SCHEMA \
             WHERE k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME \
             AND k.COLUMN_NAME = c.COLUMN_NAME AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE') \
             ORDER BY tc.CONSTRAINT_TYPE), '') AS [Key] \
             FROM INFORMATION_SCHEMA.COLUMNS c WHERE c.TABLE_NAME = :p0",
        );
        let mut values = vec![Value::from(table)];
        match schema {
            Some(schema) => {
                sql.push_str(" AND c.TABLE_SCHEMA = :p1");
                values.push(Value::from(schema));
            }
            None => sql.push_str(" AND c.TABLE_SCHEMA = SCHEMA_NAME()"),
        }
        sql.push_str(" ORDER BY c.ORDINAL_POSITION");
        Statement::with_values(sql, values)
    }

    fn database_exists_statement(&self, database: &str) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM sys.databases WHERE name = :p0",
            vec![Value::from(database)],
        )
    }

    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = COALESCE(:p0, SCHEMA_NAME()) AND TABLE_NAME = :p1",
            vec![Value::from(schema), Value::from(table)],
        )
    }

    fn field_exists_statement(&self, table: &str, column: &str, schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = COALESCE(:p0, SCHEMA_NAME()) AND TABLE_NAME = :p1 AND COLUMN_NAME = :p2",
            vec![Value::from(schema), Value::from(table), Value::from(column)],
        )
    }

    fn index_exists_statement(
        &self,
        _database: &str,
        table: &str,
        index: &str,
        schema: Option<&str>,
    ) -> Statement {
        let object = match schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        };
        Statement::with_values(
            "SELECT 1 FROM sys.indexes WHERE object_id = OBJECT_ID(:p0) AND name = :p1",
            vec![Value::from(object), Value::from(index)],
        )
    }

    fn column_type_statement(
        &self,
        _database: &str,
        table: &str,
        column: &str,
        schema: Option<&str>,
    ) -> Statement {
        Statement::with_values(
            "SELECT DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = COALESCE(:p0, SCHEMA_NAME()) AND TABLE_NAME = :p1 AND COLUMN_NAME = :p2",
            vec![Value::from(schema), Value::from(table), Value::from(column)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fragment::{QueryFragment, StatementKind};

    fn users_fragment() -> QueryFragment {
        let mut fragment = QueryFragment::new();
        fragment.select = vec!["*".into()];
        fragment.from = vec!["[users]".into()];
        fragment
    }

    #[test]
    fn test_mssql_top_without_offset() {
        let mut fragment = users_fragment();
        fragment.limit = Some(10);
        let sql = MsSqlDialect::new().assemble(&fragment).unwrap();
        assert_eq!(sql, "SELECT TOP 10 * FROM [users]");

        fragment.distinct = true;
        let sql = MsSqlDialect::new().assemble(&fragment).unwrap();
        assert_eq!(sql, "SELECT DISTINCT TOP 10 * FROM [users]");
    }

    #[test]
    fn test_mssql_offset_synthesizes_order() {
        let mut fragment = users_fragment();
        fragment.limit = Some(10);
        fragment.offset = Some(20);
        let sql = MsSqlDialect::new().assemble(&fragment).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );

        fragment.order_by = vec!["[id] DESC".into()];
        let sql = MsSqlDialect::new().assemble(&fragment).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM [users] ORDER BY [id] DESC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_mssql_delete_top() {
        let mut fragment = QueryFragment::new();
        fragment.kind = StatementKind::Delete;
        fragment.target = Some("[users]".into());
        fragment.where_clause = Some("[id] = :id0".into());
        fragment.limit = Some(1);
        let sql = MsSqlDialect::new().assemble(&fragment).unwrap();
        assert_eq!(sql, "DELETE TOP (1) FROM [users] WHERE [id] = :id0");
    }

    #[test]
    fn test_mssql_unsupported_features() {
        let d = MsSqlDialect::new();
        assert!(d.upsert_clause(&["id".to_string()], "id").is_err());
        assert!(d.prefix_syntax(&Prefix::Explain).is_err());
        assert_eq!(d.upsert_strategy(), UpsertStrategy::LookupThenWrite);
        assert_eq!(d.concat_syntax(&["a".into(), "b".into()], Some("' '")), "a + ' ' + b");
    }

    #[test]
    fn test_mssql_copy_table_is_one_statement() {
        assert_eq!(
            MsSqlDialect::new().copy_table_sql("[users]", "[users_copy]"),
            vec!["SELECT * INTO [users_copy] FROM [users]"]
        );
    }
}
