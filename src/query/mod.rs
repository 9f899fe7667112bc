//! Query construction
//!
//! `QueryBuilder` accumulates clauses into a `QueryFragment`, rendering
//! conditions and values through the active `SqlDialect` as it goes. The
//! finished `Statement` carries named placeholders that the dialect turns
//! into positional markers for the transport.

pub mod builder;
pub mod condition;
pub mod dialects;
pub mod field;
pub mod fragment;
pub mod functions;
pub mod placeholder;
pub mod tables;
pub mod value;

pub use builder::{IntoList, JoinType, QueryBuilder, SelectItem, TableSource};
pub use condition::{Condition, Field, Logic, RenderContext};
pub use dialects::{
    create_dialect, DatabaseBackend, DatePart, InsertId, MsSqlDialect, MySQLDialect,
    PostgresDialect, SqlDialect, UpsertStrategy,
};
pub use field::{Direction, FieldName, TableRef};
pub use fragment::{QueryFragment, StatementKind};
pub use functions::Sql;
pub use placeholder::{Bindings, Statement};
pub use tables::TableNames;
pub use value::Value;
