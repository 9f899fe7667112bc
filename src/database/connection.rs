//! Connection driver
//!
//! Owns one transport, the dialect picked from the configuration, the
//! per-connection result cache and the transaction flag. Every statement
//! goes through `fetch_live` or `run_execute`, which count it, log it when
//! debug is on and record the last error.

use super::config::ConnectionConfig;
use super::rows::{json_to_u64, Record, Rows};
use super::transport::{QueryResult, Transport};
use super::transports::{MySqlTransport, PostgresTransport};
use crate::cache::{Cache, CacheConfig, CacheStats, ResultCache};
use crate::error::{Error, ErrorChain, ErrorContext, Result};
use crate::query::{
    create_dialect, Condition, DatabaseBackend, InsertId, IntoList, QueryBuilder, SelectItem, Sql,
    SqlDialect, Statement, TableNames, UpsertStrategy, Value,
};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    InTransaction,
}

/// Receives every statement while the debug flag is on
pub trait QueryLogger: Send + Sync {
    fn log(&self, operation: &str, sql: &str, values: &[Value]);
}

/// Forwards statements to the `log` facade under `rustf_db::query`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogQueryLogger;

impl QueryLogger for LogQueryLogger {
    fn log(&self, operation: &str, sql: &str, values: &[Value]) {
        if values.is_empty() {
            debug!(target: "rustf_db::query", "{}: {}", operation, sql);
        } else {
            debug!(target: "rustf_db::query", "{}: {} {:?}", operation, sql, values);
        }
    }
}

pub struct Connection {
    config: ConnectionConfig,
    dialect: Arc<dyn SqlDialect>,
    tables: TableNames,
    transport: Option<Box<dyn Transport>>,
    in_transaction: bool,
    cache: ResultCache,
    logger: Arc<dyn QueryLogger>,
    query_count: u64,
    last_error: Option<String>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect.name())
            .field("dbname", &self.config.dbname)
            .field("state", &self.state())
            .field("query_count", &self.query_count)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Connection {
    /// Connect with the bundled transport for the configured driver
    ///
    /// SQL Server has no bundled transport; open one yourself and use
    /// `with_transport`.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid database configuration")?;
        let backend = config.backend()?;
        let url = config.url()?;
        let opening = || {
            format!(
                "Opening {} connection to '{}' on {}",
                backend, config.dbname, config.hostname
            )
        };
        let transport: Box<dyn Transport> = match backend {
            DatabaseBackend::MySQL | DatabaseBackend::MariaDB => Box::new(
                MySqlTransport::connect(&url, backend)
                    .await
                    .with_context(opening)?,
            ),
            DatabaseBackend::Postgres => Box::new(
                PostgresTransport::connect(&url)
                    .await
                    .with_context(opening)?,
            ),
            DatabaseBackend::MsSql => {
                return Err(Error::configuration(
                    "No bundled SQL Server transport; use Connection::with_transport",
                ))
            }
        };
        debug!(
            "Connected to {} database '{}' on {}",
            backend, config.dbname, config.hostname
        );
        Self::with_transport(config, transport)
    }

    /// Wrap an already open transport
    pub fn with_transport(config: ConnectionConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let backend = config.backend()?;
        if family(backend) != family(transport.backend()) {
            return Err(Error::configuration(format!(
                "Driver '{}' does not match a {} transport",
                config.driver,
                transport.backend()
            )));
        }
        let cache = ResultCache::new(CacheConfig {
            max_entries: config.cache_capacity,
            default_ttl: config.cache_ttl(),
        });
        Ok(Self {
            dialect: create_dialect(backend),
            tables: config.table_names(),
            transport: Some(transport),
            in_transaction: false,
            cache,
            logger: Arc::new(LogQueryLogger),
            query_count: 0,
            last_error: None,
            config,
        })
    }

    /// Store results in a shared back-end instead of a private one
    pub fn with_cache_backend(mut self, backend: Box<dyn Cache<Vec<Record>>>) -> Self {
        self.cache = ResultCache::with_backend(backend, self.config.cache_ttl());
        self
    }

    pub fn set_logger(&mut self, logger: Arc<dyn QueryLogger>) {
        self.logger = logger;
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.transport, self.in_transaction) {
            (None, _) => ConnectionState::Disconnected,
            (Some(_), false) => ConnectionState::Connected,
            (Some(_), true) => ConnectionState::InTransaction,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.dialect.backend()
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub fn settings(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Statements sent to the engine by this connection
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// New builder bound to this connection's dialect and table naming
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.dialect)).with_tables(self.tables.clone())
    }

    // Transactions

    /// Start a transaction; false when one is already open or the connection is closed
    pub async fn begin_transaction(&mut self) -> bool {
        if self.in_transaction {
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.begin().await {
            Ok(()) => {
                self.in_transaction = true;
                self.trace("transaction", "BEGIN TRANSACTION", &[]);
                true
            }
            Err(err) => {
                self.remember(err.with_context("BEGIN TRANSACTION failed"));
                false
            }
        }
    }

    /// Commit; false when no transaction is open
    pub async fn commit(&mut self) -> bool {
        if !self.in_transaction {
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.commit().await {
            Ok(()) => {
                self.in_transaction = false;
                self.trace("transaction", "COMMIT", &[]);
                true
            }
            Err(err) => {
                self.remember(err.with_context("COMMIT failed"));
                false
            }
        }
    }

    /// Roll back; false when no transaction is open
    pub async fn rollback(&mut self) -> bool {
        if !self.in_transaction {
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.rollback().await {
            Ok(()) => {
                self.in_transaction = false;
                self.trace("transaction", "ROLLBACK", &[]);
                true
            }
            Err(err) => {
                self.remember(err.with_context("ROLLBACK failed"));
                false
            }
        }
    }

    /// Disconnect, rolling back an open transaction first
    pub async fn close(&mut self) -> Result<()> {
        if self.in_transaction && !self.rollback().await {
            warn!("Rollback before close failed; closing anyway");
        }
        self.in_transaction = false;
        match self.transport.take() {
            Some(transport) => transport
                .close()
                .await
                .context("Closing connection")
                .map_err(|err| self.fail(err)),
            None => Ok(()),
        }
    }

    pub async fn ping(&mut self) -> Result<bool> {
        self.transport_mut()?.ping().await
    }

    // Result cache

    /// Route the next read through the cache
    ///
    /// With `auto_save` a miss is stored at once; otherwise call
    /// `cache_save` with the rows you want kept.
    pub fn cache_on(&mut self, auto_save: bool) {
        self.cache.enable(auto_save);
    }

    /// Store rows under the key of the last manual-save miss
    pub fn cache_save(&mut self, rows: &Rows) -> bool {
        self.cache.save_pending(rows.clone().into_records())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }

    pub fn cache_clear(&mut self) {
        self.cache.clear();
    }

    pub fn cache_reset_stats(&mut self) {
        self.cache.reset_stats();
    }

    // Statement execution

    /// Run a read, consulting the result cache when it is armed
    pub async fn fetch_statement(
        &mut self,
        statement: &Statement,
        operation: &str,
        to_array: bool,
    ) -> Result<Rows> {
        let (sql, params) = statement.to_positional(self.dialect.as_ref());

        let key = self
            .cache
            .is_enabled()
            .then(|| ResultCache::key(&sql, &params));
        if let Some(key) = &key {
            if let Some(records) = self.cache.lookup(key) {
                if self.config.debug {
                    self.logger.log("cached", &sql, &params);
                }
                return Ok(Rows::from_records(records, to_array));
            }
        }

        let records = match self.run_fetch(&sql, &params, operation).await {
            Ok(records) => records,
            Err(err) => {
                self.cache.disable();
                return Err(err);
            }
        };
        if let Some(key) = key {
            self.cache.store_miss(key, &records);
        }
        Ok(Rows::from_records(records, to_array))
    }

    /// Run a write and return the affected row count
    pub async fn execute_statement(&mut self, statement: &Statement, operation: &str) -> Result<u64> {
        let (sql, params) = statement.to_positional(self.dialect.as_ref());
        Ok(self.run_execute(&sql, &params, operation).await?.rows_affected)
    }

    /// Read that never touches the cache
    pub(crate) async fn fetch_live(
        &mut self,
        statement: &Statement,
        operation: &str,
    ) -> Result<Vec<Record>> {
        let (sql, params) = statement.to_positional(self.dialect.as_ref());
        self.run_fetch(&sql, &params, operation).await
    }

    /// Run caller SQL returning rows
    ///
    /// `sql` refers to `values` as `:p0`, `:p1`, …
    pub async fn custom_query(
        &mut self,
        sql: &str,
        to_array: bool,
        values: Vec<Value>,
    ) -> Result<Rows> {
        let statement = Statement::with_values(sql, values);
        self.fetch_statement(&statement, "custom_query", to_array)
            .await
    }

    /// Run caller SQL that returns no rows; `values` bind to `:p0`, `:p1`, …
    pub async fn execute(&mut self, sql: &str, values: Vec<Value>) -> Result<u64> {
        let statement = Statement::with_values(sql, values);
        self.execute_statement(&statement, "query").await
    }

    // Table helpers

    /// Insert one row and return the generated key (0 when there is none)
    pub async fn insert<I, K, V>(&mut self, table: &str, data: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = self.query().insert(table, data).to_statement()?;
        self.insert_statement(statement, "id").await
    }

    async fn insert_statement(&mut self, statement: Statement, primary_key: &str) -> Result<u64> {
        match self.dialect.insert_id(primary_key) {
            InsertId::LastInsertId => {
                let (sql, params) = statement.to_positional(self.dialect.as_ref());
                let result = self.run_execute(&sql, &params, "insert").await?;
                Ok(result.last_insert_id.unwrap_or(0))
            }
            InsertId::Returning(clause) => {
                let statement = Statement::new(
                    format!("{}{}", statement.sql, clause),
                    statement.bindings,
                );
                let records = self.fetch_live(&statement, "insert").await?;
                Ok(records
                    .first()
                    .and_then(|row| row.get(primary_key).or_else(|| row.values().next()))
                    .and_then(json_to_u64)
                    .unwrap_or(0))
            }
        }
    }

    /// Insert, or update the row whose `primary_key` already exists
    ///
    /// Returns the new key after an insert and 0 after an update. On SQL
    /// Server this is a key lookup followed by UPDATE or INSERT, which is not
    /// atomic against concurrent writers.
    pub async fn insert_or_update<I, K, V>(
        &mut self,
        table: &str,
        data: I,
        primary_key: &str,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let data: Vec<(String, Value)> = data
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if self.dialect.upsert_strategy() == UpsertStrategy::LookupThenWrite {
            return self.lookup_then_write(table, data, primary_key).await;
        }

        let statement = self
            .query()
            .insert_or_update(table, data, primary_key)
            .to_statement()?;
        match self.dialect.upsert_returning(primary_key) {
            Some(clause) => {
                let statement = Statement::new(
                    format!("{}{}", statement.sql, clause),
                    statement.bindings,
                );
                let records = self.fetch_live(&statement, "insert_or_update").await?;
                let Some(row) = records.first() else {
                    return Ok(0);
                };
                let inserted = row
                    .get("inserted")
                    .map(|v| v.as_bool().unwrap_or_else(|| json_to_u64(v) == Some(1)))
                    .unwrap_or(false);
                if inserted {
                    Ok(row.get(primary_key).and_then(json_to_u64).unwrap_or(0))
                } else {
                    Ok(0)
                }
            }
            None => {
                // 1 = inserted, 2 = updated, 0 = unchanged
                let (sql, params) = statement.to_positional(self.dialect.as_ref());
                let result = self.run_execute(&sql, &params, "insert_or_update").await?;
                if result.rows_affected == 1 {
                    Ok(result.last_insert_id.unwrap_or(0))
                } else {
                    Ok(0)
                }
            }
        }
    }

    async fn lookup_then_write(
        &mut self,
        table: &str,
        data: Vec<(String, Value)>,
        primary_key: &str,
    ) -> Result<u64> {
        let key = data
            .iter()
            .find(|(column, _)| column == primary_key)
            .map(|(_, value)| value.clone());
        let Some(key) = key else {
            return self.insert(table, data).await;
        };

        let lookup = self
            .query()
            .select(SelectItem::Sql(Sql::raw("1")))
            .from(table)
            .where_(Condition::eq(primary_key, key.clone()))
            .limit(1, 0)
            .to_statement()?;
        let found = !self.fetch_live(&lookup, "select").await?.is_empty();

        if found {
            let changes: Vec<(String, Value)> = data
                .into_iter()
                .filter(|(column, _)| column != primary_key)
                .collect();
            if !changes.is_empty() {
                self.update(table, Condition::eq(primary_key, key), changes)
                    .await?;
            }
            Ok(0)
        } else {
            self.insert(table, data).await
        }
    }

    /// Update matching rows; true when at least one row changed
    pub async fn update<I, K, V>(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
        data: I,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = self
            .query()
            .update(table)
            .set(data)
            .where_(condition)
            .to_statement()?;
        Ok(self.execute_statement(&statement, "update").await? > 0)
    }

    /// Update every row of a table
    pub async fn update_all<I, K, V>(&mut self, table: &str, data: I) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = self.query().update(table).set(data).to_statement()?;
        Ok(self.execute_statement(&statement, "update").await? > 0)
    }

    /// Delete matching rows, at most `limit` of them when `limit > 0`
    pub async fn delete(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
        limit: u64,
    ) -> Result<u64> {
        let mut builder = self.query().delete(table, condition);
        if limit > 0 {
            builder = builder.limit(limit, 0);
        }
        let statement = builder.to_statement()?;
        self.execute_statement(&statement, "delete").await
    }

    /// `SELECT *` from a table as plain records
    pub async fn select(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
        sort: impl IntoList<String>,
        limit: u64,
    ) -> Result<Vec<Record>> {
        let mut builder = self.query().select("*").from(table).where_(condition);
        let sort = sort.into_list();
        if !sort.is_empty() {
            builder = builder.order(sort);
        }
        if limit > 0 {
            builder = builder.limit(limit, 0);
        }
        let statement = builder.to_statement()?;
        Ok(self
            .fetch_statement(&statement, "select", true)
            .await?
            .into_records())
    }

    /// First matching row
    pub async fn first(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
    ) -> Result<Option<Record>> {
        let records = self.select(table, condition, Vec::<String>::new(), 1).await?;
        Ok(records.into_iter().next())
    }

    /// Every matching row as an object
    pub async fn find(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
        sort: impl IntoList<String>,
    ) -> Result<Rows> {
        let records = self.select(table, condition, sort, 0).await?;
        Ok(Rows::from_records(records, false))
    }

    /// `MAX(primary_key) + 1` over the matching rows, 1 for an empty table
    pub async fn get_next_id(
        &mut self,
        table: &str,
        condition: impl Into<Condition>,
        primary_key: &str,
    ) -> Result<u64> {
        let statement = self
            .query()
            .select(Sql::max(primary_key).alias("max_id"))
            .from(table)
            .where_(condition)
            .to_statement()?;
        let records = self.fetch_live(&statement, "select").await?;
        let current = records
            .first()
            .and_then(|row| row.get("max_id"))
            .and_then(json_to_u64)
            .unwrap_or(0);
        Ok(current + 1)
    }

    // Maintenance

    /// Remove every row of a table
    pub async fn empty_table(&mut self, table: &str) -> Result<bool> {
        let sql = self
            .dialect
            .truncate_sql(&self.tables.qualified(self.dialect.as_ref(), table));
        self.run_execute(&sql, &[], "empty_table").await?;
        Ok(true)
    }

    /// Create `new_table` as a copy of `table` unless it already exists
    ///
    /// Returns whether `new_table` was already there.
    pub async fn copy_table_if_not_exists(
        &mut self,
        table: &str,
        new_table: &str,
    ) -> Result<bool> {
        if self.table_exists(new_table).await {
            return Ok(true);
        }
        let source = self.tables.qualified(self.dialect.as_ref(), table);
        let target = self.tables.qualified(self.dialect.as_ref(), new_table);
        for sql in self.dialect.copy_table_sql(&source, &target) {
            self.run_execute(&sql, &[], "copy_table")
                .await
                .with_context(|| format!("Copying '{}' to '{}'", table, new_table))?;
        }
        Ok(false)
    }

    /// Native OPTIMIZE TABLE where the engine has it, a no-op elsewhere
    pub async fn optimize_table(&mut self, table: &str) -> Result<bool> {
        let qualified = self.tables.qualified(self.dialect.as_ref(), table);
        match self.dialect.optimize_sql(&qualified) {
            Some(sql) => {
                self.run_fetch(&sql, &[], "optimize_table").await?;
                Ok(true)
            }
            None => {
                debug!("{} has no OPTIMIZE TABLE; skipping", self.dialect.name());
                Ok(true)
            }
        }
    }

    /// Native REPAIR TABLE where the engine has it, a no-op elsewhere
    pub async fn repair_table(&mut self, table: &str) -> Result<bool> {
        let qualified = self.tables.qualified(self.dialect.as_ref(), table);
        match self.dialect.repair_sql(&qualified) {
            Some(sql) => {
                self.run_fetch(&sql, &[], "repair_table").await?;
                Ok(true)
            }
            None => {
                debug!("{} has no REPAIR TABLE; skipping", self.dialect.name());
                Ok(true)
            }
        }
    }

    /// Switch the current database
    ///
    /// PostgreSQL cannot switch inside a session, so there this only
    /// reports whether `database` is the one already connected to.
    pub async fn select_db(&mut self, database: &str) -> Result<bool> {
        match self.dialect.select_db_sql(database) {
            Some(sql) => {
                self.run_execute(&sql, &[], "select_db").await?;
                self.config.dbname = database.to_string();
                Ok(true)
            }
            None => Ok(self.config.dbname == database),
        }
    }

    // Advisory checks: failures are logged and read as "no"

    pub async fn database_exists(&mut self, database: &str) -> bool {
        let statement = self.dialect.database_exists_statement(database);
        self.advisory(&statement).await.is_some_and(|rows| !rows.is_empty())
    }

    pub async fn table_exists(&mut self, table: &str) -> bool {
        let physical = self.tables.physical(table);
        let statement = self
            .dialect
            .table_exists_statement(&physical, self.tables.schema());
        self.advisory(&statement).await.is_some_and(|rows| !rows.is_empty())
    }

    pub async fn field_exists(&mut self, table: &str, column: &str) -> bool {
        let physical = self.tables.physical(table);
        let statement = self
            .dialect
            .field_exists_statement(&physical, column, self.tables.schema());
        self.advisory(&statement).await.is_some_and(|rows| !rows.is_empty())
    }

    pub async fn index_exists(&mut self, database: &str, table: &str, index: &str) -> bool {
        let physical = self.tables.physical(table);
        let statement =
            self.dialect
                .index_exists_statement(database, &physical, index, self.tables.schema());
        self.advisory(&statement).await.is_some_and(|rows| !rows.is_empty())
    }

    /// Declared data type of a column, `None` when unknown
    pub async fn column_type(
        &mut self,
        database: &str,
        table: &str,
        column: &str,
    ) -> Option<String> {
        let physical = self.tables.physical(table);
        let statement = self.dialect.column_type_statement(
            database,
            &physical,
            column,
            self.tables.schema(),
        );
        let rows = self.advisory(&statement).await?;
        let row = rows.into_iter().next()?;
        row.get("DATA_TYPE")
            .or_else(|| row.values().next())
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    async fn advisory(&mut self, statement: &Statement) -> Option<Vec<Record>> {
        match self.fetch_live(statement, "select").await {
            Ok(rows) => Some(rows),
            Err(err) => {
                warn!(
                    "Advisory query failed, treating as absent: {}",
                    ErrorChain::new(&err)
                );
                None
            }
        }
    }

    // Transport plumbing

    fn transport_mut(&mut self) -> Result<&mut Box<dyn Transport>> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::connection("Connection is closed"))
    }

    async fn run_fetch(
        &mut self,
        sql: &str,
        params: &[Value],
        operation: &str,
    ) -> Result<Vec<Record>> {
        let result = match self.transport_mut() {
            Ok(transport) => transport.fetch_all(sql, params).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(records) => {
                self.trace(operation, sql, params);
                Ok(records)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn run_execute(
        &mut self,
        sql: &str,
        params: &[Value],
        operation: &str,
    ) -> Result<QueryResult> {
        let result = match self.transport_mut() {
            Ok(transport) => transport.execute(sql, params).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(outcome) => {
                self.trace(operation, sql, params);
                Ok(outcome)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn trace(&mut self, operation: &str, sql: &str, params: &[Value]) {
        self.query_count += 1;
        if self.config.debug {
            self.logger.log(operation, sql, params);
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.last_error = Some(ErrorChain::new(&err).to_string());
        err
    }

    fn remember(&mut self, err: Error) {
        let chain = ErrorChain::new(&err).to_string();
        warn!("{}", chain);
        self.last_error = Some(chain);
    }
}

fn family(backend: DatabaseBackend) -> DatabaseBackend {
    match backend {
        DatabaseBackend::MariaDB => DatabaseBackend::MySQL,
        other => other,
    }
}
