//! rustf-db - driver-agnostic SQL for MySQL, SQL Server and PostgreSQL
//!
//! One fluent `QueryBuilder` renders into dialect-specific SQL with bound
//! parameters, and a `Connection` executes it with:
//! - per-dialect quoting, LIMIT/OFFSET and upsert syntax
//! - an opt-in, single-use result cache
//! - a minimal transaction state machine
//! - schema introspection normalized across the three catalogs
//!
//! ```no_run
//! use rustf_db::{Condition, Connection, ConnectionConfig};
//!
//! # async fn run() -> rustf_db::Result<()> {
//! let config = ConnectionConfig::from_file("database.toml")?;
//! let mut conn = Connection::connect(config).await?;
//! let rows = conn
//!     .query()
//!     .select(["id", "name"])
//!     .from("user")
//!     .where_(Condition::gt("visits", 10))
//!     .order("name")
//!     .to_array()
//!     .execute(&mut conn)
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod cache;
pub mod database;
pub mod error;
pub mod query;

// Re-export main types for public API
pub use cache::{CacheMode, CacheStats, MemoryCache, ResultCache};
pub use database::{
    ColumnInfo, Connection, ConnectionConfig, ConnectionState, QueryLogger, Record, Row, Rows,
    Schema, Transport,
};
pub use error::{Error, Result};
pub use query::{
    Condition, DatabaseBackend, QueryBuilder, Sql, SqlDialect, Statement, TableNames, Value,
};
