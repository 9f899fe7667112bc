//! MySQL / MariaDB transport over a single sqlx connection

use super::binary_to_json;
use crate::database::rows::Record;
use crate::database::transport::{map_sqlx_error, QueryResult, Transport};
use crate::error::{Error, Result};
use crate::query::{DatabaseBackend, Value};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlColumn, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection as _, MySql, Row, TypeInfo, ValueRef};

pub struct MySqlTransport {
    conn: MySqlConnection,
    backend: DatabaseBackend,
}

impl MySqlTransport {
    /// Open a connection from a `mysql://` URL
    pub async fn connect(url: &str, backend: DatabaseBackend) -> Result<Self> {
        let options: sqlx::mysql::MySqlConnectOptions = url
            .parse()
            .map_err(|e| Error::configuration(format!("Invalid MySQL URL: {}", e)))?;
        let conn = options
            .connect()
            .await
            .map_err(|e| Error::connection(format!("Failed to connect to MySQL: {}", e)))?;
        Ok(Self { conn, backend })
    }

    fn bind_param<'q>(
        query: Query<'q, MySql, MySqlArguments>,
        value: &Value,
    ) -> Query<'q, MySql, MySqlArguments> {
        match value {
            Value::Null => query.bind(None::<Vec<u8>>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Str(s) => query.bind(s.clone()),
            other => query.bind(other.to_sql_literal()),
        }
    }

    fn row_to_record(row: &MySqlRow) -> Record {
        let mut record = Record::with_capacity(row.columns().len());
        for (index, column) in row.columns().iter().enumerate() {
            record.insert(column.name().to_string(), extract_value(row, index, column));
        }
        record
    }
}

/// Decode one cell by the column's declared type
fn extract_value(row: &MySqlRow, index: usize, column: &MySqlColumn) -> JsonValue {
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return JsonValue::Null;
    }

    let type_name = column.type_info().name().to_uppercase();
    let value = match type_name.as_str() {
        "BOOLEAN" | "BOOL" => row
            .try_get::<bool, _>(index)
            .map(JsonValue::Bool)
            .or_else(|_| row.try_get::<i8, _>(index).map(|v| JsonValue::Bool(v != 0)))
            .ok(),
        "TINYINT" => row
            .try_get::<i8, _>(index)
            .map(JsonValue::from)
            .or_else(|_| row.try_get::<bool, _>(index).map(|v| JsonValue::from(i8::from(v))))
            .ok(),
        "SMALLINT" => row.try_get::<i16, _>(index).map(JsonValue::from).ok(),
        "MEDIUMINT" | "INT" | "INTEGER" => row.try_get::<i32, _>(index).map(JsonValue::from).ok(),
        "BIGINT" => row.try_get::<i64, _>(index).map(JsonValue::from).ok(),
        "TINYINT UNSIGNED" => row.try_get::<u8, _>(index).map(JsonValue::from).ok(),
        "SMALLINT UNSIGNED" => row.try_get::<u16, _>(index).map(JsonValue::from).ok(),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            row.try_get::<u32, _>(index).map(JsonValue::from).ok()
        }
        "BIGINT UNSIGNED" => row.try_get::<u64, _>(index).map(JsonValue::from).ok(),
        "YEAR" => row
            .try_get::<u16, _>(index)
            .map(JsonValue::from)
            .or_else(|_| row.try_get::<i16, _>(index).map(JsonValue::from))
            .ok(),
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .map(|f| JsonValue::from(f64::from(f)))
            .ok(),
        "DOUBLE" | "REAL" => row.try_get::<f64, _>(index).map(JsonValue::from).ok(),
        "DECIMAL" | "NUMERIC" => extract_decimal(row, index),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
            .ok(),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|t| JsonValue::String(t.format("%H:%M:%S").to_string()))
            .ok(),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|dt| JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .ok(),
        "JSON" => row.try_get::<JsonValue, _>(index).ok(),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| binary_to_json(&bytes))
            .ok(),
        _ => None,
    };

    value
        .or_else(|| row.try_get::<String, _>(index).map(JsonValue::String).ok())
        .unwrap_or_else(|| {
            log::warn!(
                "Could not decode column '{}' (MySQL type '{}'), using NULL",
                column.name(),
                type_name
            );
            JsonValue::Null
        })
}

#[cfg(feature = "decimal")]
fn extract_decimal(row: &MySqlRow, index: usize) -> Option<JsonValue> {
    row.try_get::<rust_decimal::Decimal, _>(index)
        .map(|d| JsonValue::String(d.to_string()))
        .ok()
}

// DECIMAL travels as text; keep it a string so no precision is lost
#[cfg(not(feature = "decimal"))]
fn extract_decimal(row: &MySqlRow, index: usize) -> Option<JsonValue> {
    row.try_get::<String, _>(index).map(JsonValue::String).ok()
}

#[async_trait]
impl Transport for MySqlTransport {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        log::debug!("MySQL EXECUTE: {}", sql);
        log::trace!("  Parameters: {:?}", params);

        let result = if params.is_empty() {
            sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = Self::bind_param(query, param);
            }
            query.execute(&mut self.conn).await
        }
        .map_err(|e| map_sqlx_error(e, sql, params, self.backend))?;

        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => Some(id),
        };
        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        log::debug!("MySQL FETCH_ALL: {}", sql);
        log::trace!("  Parameters: {:?}", params);

        let mut query = sqlx::query(sql);
        for param in params {
            query = Self::bind_param(query, param);
        }
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, sql, params, self.backend))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.execute("START TRANSACTION", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    async fn ping(&mut self) -> Result<bool> {
        self.conn
            .ping()
            .await
            .map(|_| true)
            .map_err(|e| Error::connection(format!("MySQL ping failed: {}", e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::connection(format!("MySQL close failed: {}", e)))
    }
}
