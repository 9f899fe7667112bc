//! Bundled `Transport` implementations

pub mod mysql;
pub mod postgres;
pub mod scripted;

pub use mysql::MySqlTransport;
pub use postgres::PostgresTransport;
pub use scripted::{Executed, Reply, ScriptLog, ScriptedTransport};

use base64::Engine;
use serde_json::Value as JsonValue;

/// Binary cells travel as standard base64 text
pub(crate) fn binary_to_json(bytes: &[u8]) -> JsonValue {
    JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
}
