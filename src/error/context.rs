//! Context layers on errors
//!
//! `Connection` and `Schema` wrap failures with what they were doing
//! (`Opening mysql connection to 'shop' on db1`), and `ErrorChain` flattens
//! the layers back into one line for `last_error()` and log records.

use super::Error;
use std::fmt;

/// Wrap the error of a `Result` in a context layer
pub trait ErrorContext<T> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>;

    /// Like `context`, building the message only on failure
    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ErrorContext<T> for Result<T, Error> {
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

/// Outermost-first view over the context layers of an error
pub struct ErrorChain<'a> {
    layers: Vec<&'a Error>,
}

impl<'a> ErrorChain<'a> {
    pub fn new(error: &'a Error) -> Self {
        let mut layers = vec![error];
        let mut current = error;
        while let Error::WithContext { source, .. } = current {
            layers.push(source);
            current = source;
        }
        Self { layers }
    }

    /// One message per layer, the root error last
    pub fn messages(&self) -> Vec<String> {
        self.layers.iter().map(|e| e.to_string()).collect()
    }

    pub fn root_cause(&self) -> &'a Error {
        self.layers[self.layers.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages().join(": "))
    }
}
