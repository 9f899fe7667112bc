//! In-memory transport that replays canned replies
//!
//! Every call is appended to a shared log so tests can assert on the exact
//! SQL and parameters a `Connection` produced, without a server.

use crate::database::rows::Record;
use crate::database::transport::{QueryResult, Transport};
use crate::error::{Error, Result};
use crate::query::{DatabaseBackend, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One canned reply, consumed in order by `execute` and `fetch_all`
#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Record>),
    Done(QueryResult),
    Fail(Error),
}

/// A statement seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Shared view of everything the transport received
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    entries: Arc<Mutex<Vec<Executed>>>,
}

impl ScriptLog {
    fn push(&self, sql: &str, params: &[Value]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Executed {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
        }
    }

    pub fn entries(&self) -> Vec<Executed> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn statements(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.sql).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<Executed> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.last().cloned())
    }
}

pub struct ScriptedTransport {
    backend: DatabaseBackend,
    replies: VecDeque<Reply>,
    log: ScriptLog,
}

impl ScriptedTransport {
    pub fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            replies: VecDeque::new(),
            log: ScriptLog::default(),
        }
    }

    /// Queue rows for the next read
    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.replies.push_back(Reply::Rows(rows));
        self
    }

    /// Queue the outcome of the next write
    pub fn with_result(mut self, rows_affected: u64, last_insert_id: Option<u64>) -> Self {
        self.replies.push_back(Reply::Done(QueryResult {
            rows_affected,
            last_insert_id,
        }));
        self
    }

    /// Queue a failure for the next statement
    pub fn with_error(mut self, error: Error) -> Self {
        self.replies.push_back(Reply::Fail(error));
        self
    }

    /// Handle on the statement log, valid after the transport is boxed
    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.log.push(sql, params);
        match self.replies.pop_front() {
            Some(Reply::Done(result)) => Ok(result),
            Some(Reply::Rows(rows)) => Ok(QueryResult {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
            }),
            Some(Reply::Fail(err)) => Err(err),
            None => Ok(QueryResult::default()),
        }
    }

    async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.log.push(sql, params);
        match self.replies.pop_front() {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Done(_)) | None => Ok(Vec::new()),
            Some(Reply::Fail(err)) => Err(err),
        }
    }

    async fn begin(&mut self) -> Result<()> {
        self.log.push("BEGIN", &[]);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.log.push("COMMIT", &[]);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.log.push("ROLLBACK", &[]);
        Ok(())
    }

    async fn ping(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.push("CLOSE", &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let mut record = Record::new();
        record.insert("id".into(), json!(7));
        let mut transport = ScriptedTransport::new(DatabaseBackend::MySQL)
            .with_rows(vec![record])
            .with_result(1, Some(9))
            .with_error(Error::connection("gone"));
        let log = transport.log();

        let rows = transport.fetch_all("SELECT 1", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        let result = transport.execute("INSERT", &[Value::Int(1)]).await.unwrap();
        assert_eq!(result.last_insert_id, Some(9));
        assert!(transport.execute("DELETE", &[]).await.is_err());
        assert!(transport.fetch_all("SELECT 2", &[]).await.unwrap().is_empty());

        assert_eq!(log.len(), 4);
        assert_eq!(log.entries()[1].params, vec![Value::Int(1)]);
    }
}
