//! Column metadata
//!
//! Every dialect's catalog query returns rows shaped like MySQL's
//! `SHOW COLUMNS` (`Field`, `Type`, `Null`, `Key`, `Default`, `Extra`);
//! `ColumnInfo::from_catalog_row` folds them into one struct. `Schema`
//! memoises the result per table.

use super::connection::Connection;
use super::rows::Record;
use crate::error::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Normalized description of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Build from a catalog row; keys are matched case-insensitively
    ///
    /// Returns `None` when the row has no column name.
    pub fn from_catalog_row(row: &Record) -> Option<Self> {
        let name = text(row, "field").filter(|name| !name.is_empty())?;
        let key = text(row, "key").unwrap_or_default().to_ascii_uppercase();
        let nullable = text(row, "null")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "yes" | "true" | "1"))
            .unwrap_or(false);
        let auto_increment = text(row, "extra")
            .map(|v| v.to_ascii_lowercase().contains("auto_increment"))
            .unwrap_or(false);

        Some(Self {
            name,
            data_type: text(row, "type").unwrap_or_default(),
            nullable,
            primary_key: key == "PRI",
            unique: key == "PRI" || key == "UNI",
            auto_increment,
            default: text(row, "default"),
        })
    }
}

fn text(row: &Record, key: &str) -> Option<String> {
    let value = row
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)?;
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(if *b { "YES" } else { "NO" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Per-table column cache
#[derive(Debug, Default)]
pub struct Schema {
    tables: HashMap<String, Vec<ColumnInfo>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names of `table`, in catalog order
    pub async fn fields(&mut self, conn: &mut Connection, table: &str) -> Result<Vec<String>> {
        Ok(self
            .columns(conn, table)
            .await?
            .iter()
            .map(|column| column.name.clone())
            .collect())
    }

    /// Column metadata of `table`, loaded once per table
    pub async fn columns(&mut self, conn: &mut Connection, table: &str) -> Result<&[ColumnInfo]> {
        if table.trim().is_empty() {
            return Err(Error::invalid_condition("Table name is empty"));
        }
        if !self.tables.contains_key(table) {
            let columns = load_columns(conn, table).await?;
            self.tables.insert(table.to_string(), columns);
        }
        Ok(self.tables.get(table).map(Vec::as_slice).unwrap_or_default())
    }

    pub async fn column(
        &mut self,
        conn: &mut Connection,
        table: &str,
        column: &str,
    ) -> Result<Option<ColumnInfo>> {
        Ok(self
            .columns(conn, table)
            .await?
            .iter()
            .find(|info| info.name == column)
            .cloned())
    }

    /// False when the column is missing or the table cannot be read
    pub async fn has_column(&mut self, conn: &mut Connection, table: &str, column: &str) -> bool {
        matches!(self.column(conn, table, column).await, Ok(Some(_)))
    }

    pub async fn primary_keys(&mut self, conn: &mut Connection, table: &str) -> Result<Vec<String>> {
        Ok(self
            .columns(conn, table)
            .await?
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.clone())
            .collect())
    }

    /// Forget one table, or every table with `None`
    pub fn clear_cache(&mut self, table: Option<&str>) {
        match table {
            Some(table) => {
                self.tables.remove(table);
            }
            None => self.tables.clear(),
        }
    }

    pub fn cached_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.tables.keys().cloned().collect();
        tables.sort();
        tables
    }
}

async fn load_columns(conn: &mut Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let physical = conn.tables().physical(table);
    let statement = conn
        .dialect()
        .columns_statement(&physical, conn.tables().schema());
    let rows = conn
        .fetch_live(&statement, "schema")
        .await
        .with_context(|| format!("Reading columns of '{}'", table))?;

    let columns: Vec<ColumnInfo> = rows
        .iter()
        .filter_map(|row| conn.dialect().normalize_column(row))
        .collect();
    if columns.is_empty() {
        return Err(Error::query_execution(
            format!("Table '{}' not found or has no columns", table),
            statement.sql,
            &statement.bindings.values(),
            conn.dialect().name(),
        ));
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::config::ConnectionConfig;
    use crate::database::transports::ScriptedTransport;
    use crate::error::ErrorChain;
    use crate::query::DatabaseBackend;
    use serde_json::json;

    fn catalog_row(field: &str, key: &str, extra: &str) -> Record {
        let mut row = Record::new();
        row.insert("Field".into(), json!(field));
        row.insert("Type".into(), json!("int(11)"));
        row.insert("Null".into(), json!("NO"));
        row.insert("Key".into(), json!(key));
        row.insert("Default".into(), JsonValue::Null);
        row.insert("Extra".into(), json!(extra));
        row
    }

    #[test]
    fn test_from_catalog_row_is_case_insensitive() {
        let mut row = Record::new();
        row.insert("field".into(), json!("email"));
        row.insert("TYPE".into(), json!("varchar"));
        row.insert("null".into(), json!("YES"));
        row.insert("key".into(), json!("UNI"));
        row.insert("default".into(), json!("n/a"));

        let info = ColumnInfo::from_catalog_row(&row).unwrap();
        assert_eq!(info.name, "email");
        assert!(info.nullable);
        assert!(info.unique);
        assert!(!info.primary_key);
        assert_eq!(info.default.as_deref(), Some("n/a"));

        assert!(ColumnInfo::from_catalog_row(&Record::new()).is_none());
    }

    #[tokio::test]
    async fn test_columns_are_memoised() {
        let transport = ScriptedTransport::new(DatabaseBackend::MySQL).with_rows(vec![
            catalog_row("id", "PRI", "auto_increment"),
            catalog_row("name", "", ""),
        ]);
        let log = transport.log();
        let config = ConnectionConfig::builder()
            .dbname("shop")
            .prefix("app")
            .build()
            .unwrap();
        let mut conn = Connection::with_transport(config, Box::new(transport)).unwrap();
        let mut schema = Schema::new();

        assert_eq!(schema.fields(&mut conn, "user").await.unwrap(), ["id", "name"]);
        assert_eq!(schema.primary_keys(&mut conn, "user").await.unwrap(), ["id"]);
        assert!(schema.has_column(&mut conn, "user", "name").await);
        let id = schema.column(&mut conn, "user", "id").await.unwrap().unwrap();
        assert!(id.auto_increment);

        assert_eq!(log.statements(), vec!["SHOW FULL COLUMNS FROM `app_user`"]);
        assert_eq!(schema.cached_tables(), vec!["user"]);
        schema.clear_cache(Some("user"));
        assert!(schema.cached_tables().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let transport = ScriptedTransport::new(DatabaseBackend::Postgres);
        let config = ConnectionConfig::builder()
            .driver("postgresql")
            .dbname("shop")
            .build()
            .unwrap();
        let mut conn = Connection::with_transport(config, Box::new(transport)).unwrap();
        let mut schema = Schema::new();

        let err = schema.columns(&mut conn, "ghost").await.unwrap_err();
        assert_eq!(err.error_code(), "E_DB_QUERY");
        assert!(!schema.has_column(&mut conn, "ghost", "id").await);
        assert!(schema.cached_tables().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_names_the_table() {
        let transport = ScriptedTransport::new(DatabaseBackend::MySQL)
            .with_error(Error::connection("server has gone away"));
        let config = ConnectionConfig::builder().dbname("shop").build().unwrap();
        let mut conn = Connection::with_transport(config, Box::new(transport)).unwrap();

        let err = Schema::new().columns(&mut conn, "user").await.unwrap_err();
        assert_eq!(err.error_code(), "E_DB_CONNECTION");
        assert_eq!(
            ErrorChain::new(&err).to_string(),
            "Reading columns of 'user': Database connection error: server has gone away"
        );
        assert_eq!(
            conn.last_error(),
            Some("Database connection error: server has gone away")
        );
    }
}
