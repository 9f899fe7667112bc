//! PostgreSQL transport over a single sqlx connection

use super::binary_to_json;
use crate::database::rows::Record;
use crate::database::transport::{map_sqlx_error, QueryResult, Transport};
use crate::error::{Error, Result};
use crate::query::{DatabaseBackend, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgColumn, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection as _, Postgres, Row, TypeInfo, ValueRef};

pub struct PostgresTransport {
    conn: PgConnection,
}

impl PostgresTransport {
    /// Open a connection from a `postgres://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let options: sqlx::postgres::PgConnectOptions = url
            .parse()
            .map_err(|e| Error::configuration(format!("Invalid PostgreSQL URL: {}", e)))?;
        let conn = options
            .connect()
            .await
            .map_err(|e| Error::connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
        Ok(Self { conn })
    }

    fn bind_param<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &Value,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Str(s) => query.bind(s.clone()),
            other => query.bind(other.to_sql_literal()),
        }
    }

    fn row_to_record(row: &PgRow) -> Record {
        let mut record = Record::with_capacity(row.columns().len());
        for (index, column) in row.columns().iter().enumerate() {
            record.insert(column.name().to_string(), extract_value(row, index, column));
        }
        record
    }
}

fn extract_value(row: &PgRow, index: usize, column: &PgColumn) -> JsonValue {
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return JsonValue::Null;
    }

    let type_name = column.type_info().name().to_uppercase();
    let value = match type_name.as_str() {
        "BOOL" | "BOOLEAN" => row.try_get::<bool, _>(index).map(JsonValue::Bool).ok(),
        "INT2" | "SMALLINT" | "SMALLSERIAL" => {
            row.try_get::<i16, _>(index).map(JsonValue::from).ok()
        }
        "INT4" | "INT" | "INTEGER" | "SERIAL" => {
            row.try_get::<i32, _>(index).map(JsonValue::from).ok()
        }
        "INT8" | "BIGINT" | "BIGSERIAL" => row.try_get::<i64, _>(index).map(JsonValue::from).ok(),
        "FLOAT4" | "REAL" => row
            .try_get::<f32, _>(index)
            .map(|f| JsonValue::from(f64::from(f)))
            .ok(),
        "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<f64, _>(index).map(JsonValue::from).ok(),
        "NUMERIC" | "DECIMAL" => extract_numeric(row, index),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            row.try_get::<String, _>(index).map(JsonValue::String).ok()
        }
        "JSON" | "JSONB" => row.try_get::<JsonValue, _>(index).ok(),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
            .ok(),
        "TIME" => row
            .try_get::<NaiveTime, _>(index)
            .map(|t| JsonValue::String(t.format("%H:%M:%S").to_string()))
            .ok(),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|dt| JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .ok(),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|dt| JsonValue::String(dt.to_rfc3339()))
            .ok(),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| binary_to_json(&bytes))
            .ok(),
        _ => None,
    };

    value
        .or_else(|| row.try_get::<String, _>(index).map(JsonValue::String).ok())
        .unwrap_or_else(|| {
            log::warn!(
                "Could not decode column '{}' (PostgreSQL type '{}'), using NULL",
                column.name(),
                type_name
            );
            JsonValue::Null
        })
}

#[cfg(feature = "decimal")]
fn extract_numeric(row: &PgRow, index: usize) -> Option<JsonValue> {
    row.try_get::<rust_decimal::Decimal, _>(index)
        .map(|d| JsonValue::String(d.to_string()))
        .ok()
}

// NUMERIC has a binary wire format that only the decimal feature decodes
#[cfg(not(feature = "decimal"))]
fn extract_numeric(_row: &PgRow, _index: usize) -> Option<JsonValue> {
    log::warn!("NUMERIC column read without the `decimal` feature; cast it to text in SQL");
    None
}

#[async_trait]
impl Transport for PostgresTransport {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        log::debug!("PostgreSQL EXECUTE: {}", sql);
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
        .map_err(|e| map_sqlx_error(e, sql, params, DatabaseBackend::Postgres))?;

        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        log::debug!("PostgreSQL FETCH_ALL: {}", sql);
        log::trace!("  Parameters: {:?}", params);

        let mut query = sqlx::query(sql);
        for param in params {
            query = Self::bind_param(query, param);
        }
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, sql, params, DatabaseBackend::Postgres))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN", &[]).await.map(|_| ())
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
            .map_err(|e| Error::connection(format!("PostgreSQL ping failed: {}", e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::connection(format!("PostgreSQL close failed: {}", e)))
    }
}
