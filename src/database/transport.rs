//! Transport trait
//!
//! A transport owns one native connection and executes already-rendered
//! SQL with positional parameters. Everything dialect-specific has been
//! decided before a statement gets here.

use super::rows::Record;
use crate::error::{Error, Result};
use crate::query::{DatabaseBackend, Value};
use async_trait::async_trait;

/// Outcome of a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Number of rows affected by the statement
    pub rows_affected: u64,
    /// Generated key of the last insert, when the engine reports one
    pub last_insert_id: Option<u64>,
}

/// Native connection used by `Connection`
///
/// Implementations are bundled for MySQL and PostgreSQL. Other engines
/// (SQL Server) plug in by implementing this trait over their client.
#[async_trait]
pub trait Transport: Send {
    fn backend(&self) -> DatabaseBackend;

    /// Execute a statement that returns no rows
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement and collect every row
    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Test connectivity
    async fn ping(&mut self) -> Result<bool>;

    /// Release the native connection
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Map a driver error onto the taxonomy
///
/// Transport-level failures become `Connection`, everything else is a
/// statement rejected by the engine.
pub(crate) fn map_sqlx_error(
    err: sqlx::Error,
    sql: &str,
    params: &[Value],
    backend: DatabaseBackend,
) -> Error {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => Error::connection(err.to_string()),
        sqlx::Error::Configuration(_) => Error::configuration(err.to_string()),
        other => Error::query_execution(other.to_string(), sql, params, backend.name()),
    }
}
