//! Connection layer
//!
//! This module owns everything that touches a live database: configuration,
//! the `Transport` trait with its bundled sqlx implementations, the
//! `Connection` driver and schema introspection.

pub mod config;
pub mod connection;
pub mod rows;
pub mod schema;
pub mod transport;
pub mod transports;

// Re-export main types for convenience
pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use connection::{Connection, ConnectionState, LogQueryLogger, QueryLogger};
pub use rows::{Record, Row, Rows};
pub use schema::{ColumnInfo, Schema};
pub use transport::{QueryResult, Transport};
pub use transports::{MySqlTransport, PostgresTransport, ScriptLog, ScriptedTransport};
