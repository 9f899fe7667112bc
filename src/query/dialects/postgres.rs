//! PostgreSQL dialect implementation
//!
//! Double-quote identifiers, `$n` placeholders, `LIMIT n OFFSET m` and
//! `ON CONFLICT … DO UPDATE` upserts that report whether a row was inserted.

use super::{DatePart, InsertId, SqlDialect};
use crate::error::Result;
use crate::query::placeholder::Statement;
use crate::query::Value;

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgresDialect {
    fn backend(&self) -> super::DatabaseBackend {
        super::DatabaseBackend::Postgres
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn limit_syntax(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    fn random_function(&self) -> &'static str {
        "RANDOM()"
    }

    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn group_concat_syntax(
        &self,
        expr: &str,
        separator: &str,
        order: Option<&str>,
        distinct: bool,
    ) -> Result<String> {
        let mut sql = String::from("STRING_AGG(");
        if distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&format!("CAST({} AS TEXT), {}", expr, separator));
        if let Some(order) = order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql.push(')');
        Ok(sql)
    }

    fn date_part_syntax(&self, part: DatePart, expr: &str) -> String {
        format!("EXTRACT({} FROM {})", part.keyword(), expr)
    }

    fn date_syntax(&self, expr: &str) -> String {
        format!("CAST({} AS DATE)", expr)
    }

    fn date_diff_syntax(&self, first: &str, second: &str) -> String {
        format!("(CAST({} AS DATE) - CAST({} AS DATE))", first, second)
    }

    fn date_format_syntax(&self, expr: &str, format: &str) -> String {
        format!("TO_CHAR({}, {})", expr, format)
    }

    fn position_syntax(&self, needle: &str, haystack: &str) -> String {
        format!("POSITION({} IN {})", needle, haystack)
    }

    fn upsert_clause(&self, columns: &[String], primary_key: &str) -> Result<String> {
        let key = self.quote_identifier(primary_key);
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| column.as_str() != primary_key)
            .map(|column| {
                let quoted = self.quote_identifier(column);
                format!("{} = EXCLUDED.{}", quoted, quoted)
            })
            .collect();

        if updates.is_empty() {
            Ok(format!(" ON CONFLICT ({}) DO NOTHING", key))
        } else {
            Ok(format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                key,
                updates.join(", ")
            ))
        }
    }

    fn upsert_returning(&self, primary_key: &str) -> Option<String> {
        Some(format!(
            " RETURNING {}, (xmax = 0) AS \"inserted\"",
            self.quote_identifier(primary_key)
        ))
    }

    fn insert_id(&self, _primary_key: &str) -> InsertId {
        InsertId::Returning(" RETURNING *".to_string())
    }

    fn copy_table_sql(&self, source: &str, target: &str) -> Vec<String> {
        vec![
            format!("CREATE TABLE {} (LIKE {} INCLUDING ALL)", target, source),
            format!("INSERT INTO {} SELECT * FROM {}", target, source),
        ]
    }

    fn truncate_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {} RESTART IDENTITY", table)
    }

    fn select_db_sql(&self, _database: &str) -> Option<String> {
        None
    }

    fn columns_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        let mut sql = String::from(
            "SELECT c.column_name AS \"Field\", c.data_type AS \"Type\", c.is_nullable AS \"Null\", \
             c.column_default AS \"Default\", \
             CASE WHEN c.column_default LIKE 'nextval%' OR c.is_identity = 'YES' \
             THEN 'auto_increment' ELSE '' END AS \"Extra\", \
             COALESCE((SELECT CASE WHEN tc.constraint_type = 'PRIMARY KEY' THEN 'PRI' ELSE 'UNI' END \
             FROM information_schema.key_column_usage k \
             JOIN information_schema.table_constraints tc ON tc.constraint_name = k.constraint_name \
             AND tc.table_schema = k.table_schema \
             WHERE k.table_schema = c.table_schema AND k.table_name = c.table_name \
             AND k.column_name = c.column_name AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
             ORDER BY tc.constraint_type LIMIT 1), '') AS \"Key\" \
             FROM information_schema.columns c WHERE c.table_name = :p0",
        );
        let mut values = vec![Value::from(table)];
        match schema {
            Some(schema) => {
                sql.push_str(" AND c.table_schema = :p1");
                values.push(Value::from(schema));
            }
            None => sql.push_str(" AND c.table_schema = current_schema()"),
        }
        sql.push_str(" ORDER BY c.ordinal_position");
        Statement::with_values(sql, values)
    }

    fn database_exists_statement(&self, database: &str) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM pg_database WHERE datname = :p0",
            vec![Value::from(database)],
        )
    }

    fn table_exists_statement(&self, table: &str, schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM information_schema.tables WHERE table_schema = COALESCE(:p0, current_schema()) AND table_name = :p1",
            vec![Value::from(schema), Value::from(table)],
        )
    }

    fn field_exists_statement(&self, table: &str, column: &str, schema: Option<&str>) -> Statement {
        Statement::with_values(
            "SELECT 1 FROM information_schema.columns WHERE table_schema = COALESCE(:p0, current_schema()) AND table_name = :p1 AND column_name = :p2",
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
        Statement::with_values(
            "SELECT 1 FROM pg_indexes WHERE schemaname = COALESCE(:p0, current_schema()) AND tablename = :p1 AND indexname = :p2",
            vec![Value::from(schema), Value::from(table), Value::from(index)],
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
            "SELECT data_type FROM information_schema.columns WHERE table_schema = COALESCE(:p0, current_schema()) AND table_name = :p1 AND column_name = :p2",
            vec![Value::from(schema), Value::from(table), Value::from(column)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fragment::{QueryFragment, StatementKind, UpsertClause};

    #[test]
    fn test_postgres_limit_offset() {
        let d = PostgresDialect::new();
        assert_eq!(d.limit_syntax(Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(d.limit_syntax(None, Some(20)), " OFFSET 20");
        assert_eq!(d.limit_syntax(Some(1), None), " LIMIT 1");
    }

    #[test]
    fn test_postgres_upsert_excludes_primary_key() {
        let d = PostgresDialect::new();
        let clause = d
            .upsert_clause(&["id".to_string(), "name".to_string()], "id")
            .unwrap();
        assert_eq!(
            clause,
            " ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );

        let clause = d.upsert_clause(&["id".to_string()], "id").unwrap();
        assert_eq!(clause, " ON CONFLICT (\"id\") DO NOTHING");
    }

    #[test]
    fn test_postgres_copy_table() {
        assert_eq!(
            PostgresDialect::new().copy_table_sql("\"users\"", "\"users_copy\""),
            vec![
                "CREATE TABLE \"users_copy\" (LIKE \"users\" INCLUDING ALL)",
                "INSERT INTO \"users_copy\" SELECT * FROM \"users\"",
            ]
        );
    }

    #[test]
    fn test_postgres_delete_ignores_limit() {
        let mut fragment = QueryFragment::new();
        fragment.kind = StatementKind::Delete;
        fragment.target = Some("\"users\"".into());
        fragment.where_clause = Some("\"id\" = :id0".into());
        fragment.limit = Some(1);
        let sql = PostgresDialect::new().assemble(&fragment).unwrap();
        assert_eq!(sql, "DELETE FROM \"users\" WHERE \"id\" = :id0");
    }

    #[test]
    fn test_postgres_insert_with_upsert() {
        let mut fragment = QueryFragment::new();
        fragment.kind = StatementKind::Insert;
        fragment.target = Some("\"users\"".into());
        fragment.insert_columns = vec!["\"id\"".into(), "\"name\"".into()];
        fragment.insert_values = vec![":id0".into(), ":name1".into()];
        fragment.upsert = Some(UpsertClause {
            columns: vec!["id".into(), "name".into()],
            primary_key: "id".into(),
        });
        let sql = PostgresDialect::new().assemble(&fragment).unwrap();
        assert!(sql.starts_with("INSERT INTO \"users\" (\"id\", \"name\") VALUES (:id0, :name1)"));
        assert!(sql.ends_with("DO UPDATE SET \"name\" = EXCLUDED.\"name\""));
    }
}
