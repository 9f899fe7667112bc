use crate::query::Value;
use thiserror::Error;

pub mod context;

pub type Result<T> = std::result::Result<T, Error>;

// Re-export context helpers
pub use context::{ErrorChain, ErrorContext};

/// Main error type for the database layer
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid connection parameters
    #[error("Database configuration error: {0}")]
    Configuration(String),

    /// The transport could not establish or keep a connection
    #[error("Database connection error: {0}")]
    Connection(String),

    /// A statement rejected by the engine
    #[error("Query failed on {dialect}: {message} (SQL: {sql})")]
    QueryExecution {
        message: String,
        sql: String,
        values: Vec<Value>,
        dialect: String,
    },

    /// Transport failure while switching transaction state
    #[error("Database transaction error: {0}")]
    Transaction(String),

    /// Malformed query-builder input
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Feature not supported in {dialect}: {feature}")]
    UnsupportedFeature { dialect: String, feature: String },

    #[error("Missing required clause: {0}")]
    MissingClause(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Value conversion error: {0}")]
    Conversion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    // Error with context chain
    #[error("{message}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query_execution(
        message: impl Into<String>,
        sql: impl Into<String>,
        values: &[Value],
        dialect: impl Into<String>,
    ) -> Self {
        Self::QueryExecution {
            message: message.into(),
            sql: sql.into(),
            values: values.to_vec(),
            dialect: dialect.into(),
        }
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    pub fn invalid_condition(msg: impl Into<String>) -> Self {
        Self::InvalidCondition(msg.into())
    }

    pub fn unsupported(dialect: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            dialect: dialect.into(),
            feature: feature.into(),
        }
    }

    pub fn missing_clause(clause: impl Into<String>) -> Self {
        Self::MissingClause(clause.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    // Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context layers
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if error is retryable by the caller
    ///
    /// Nothing inside this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Error::Connection(_))
    }

    /// Whether the error is a programmer error in query construction
    pub fn is_invalid_condition(&self) -> bool {
        matches!(
            self.root(),
            Error::InvalidCondition(_) | Error::MissingClause(_)
        )
    }

    /// Get a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "E_DB_CONFIG",
            Error::Connection(_) => "E_DB_CONNECTION",
            Error::QueryExecution { .. } => "E_DB_QUERY",
            Error::Transaction(_) => "E_DB_TRANSACTION",
            Error::InvalidCondition(_) => "E_INVALID_CONDITION",
            Error::UnsupportedFeature { .. } => "E_UNSUPPORTED",
            Error::MissingClause(_) => "E_MISSING_CLAUSE",
            Error::Cache(_) => "E_CACHE",
            Error::Conversion(_) => "E_CONVERSION",
            Error::Json(_) => "E_JSON",
            Error::Io(_) => "E_IO",
            Error::Internal(_) => "E_INTERNAL",
            Error::WithContext { source, .. } => source.error_code(),
        }
    }
}
