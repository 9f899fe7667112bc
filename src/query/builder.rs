//! Fluent query builder
//!
//! Clause methods render their piece immediately into the `QueryFragment`
//! using the builder's dialect, so bindings accumulate in call order and
//! never collide. The first error raised by a clause is kept and reported
//! when the statement is built or executed.
//!
//! ```ignore
//! let rows = conn
//!     .query()
//!     .select(["U.id", "U.name"])
//!     .from("user U")
//!     .where_(("U.status", 1))
//!     .order("U.name")
//!     .limit(10, 0)
//!     .execute(&mut conn)
//!     .await?;
//! ```

use super::condition::{encode_operand, Condition, RenderContext};
use super::dialects::{create_dialect, DatabaseBackend, SqlDialect};
use super::field::{render_alias, split_direction, FieldName, TableRef};
use super::fragment::{Prefix, QueryFragment, StatementKind, UnionKind, UpsertClause};
use super::functions::Sql;
use super::placeholder::{Bindings, Statement};
use super::tables::TableNames;
use super::value::Value;
use crate::database::rows::{json_to_u64, Row, Rows};
use crate::database::Connection;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Conversion into a list of clause items
///
/// Lets clause methods take a single item, a `Vec` or an array.
pub trait IntoList<T> {
    fn into_list(self) -> Vec<T>;
}

macro_rules! impl_into_list {
    ($item:ty => $($single:ty),+) => {
        $(
            impl IntoList<$item> for $single {
                fn into_list(self) -> Vec<$item> {
                    vec![self.into()]
                }
            }
        )+

        impl<S: Into<$item>> IntoList<$item> for Vec<S> {
            fn into_list(self) -> Vec<$item> {
                self.into_iter().map(Into::into).collect()
            }
        }

        impl<S: Into<$item>, const N: usize> IntoList<$item> for [S; N] {
            fn into_list(self) -> Vec<$item> {
                self.into_iter().map(Into::into).collect()
            }
        }
    };
}

/// Entry of a select list
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `[table.]column [AS alias]` or `*`
    Field(String),
    Sql(Sql),
    /// `(subquery) AS alias`
    Query(Box<QueryBuilder>, String),
}

impl SelectItem {
    pub fn query(query: QueryBuilder, alias: impl Into<String>) -> Self {
        SelectItem::Query(Box::new(query), alias.into())
    }
}

impl From<&str> for SelectItem {
    fn from(field: &str) -> Self {
        SelectItem::Field(field.to_string())
    }
}

impl From<String> for SelectItem {
    fn from(field: String) -> Self {
        SelectItem::Field(field)
    }
}

impl From<Sql> for SelectItem {
    fn from(sql: Sql) -> Self {
        SelectItem::Sql(sql)
    }
}

impl_into_list!(SelectItem => &str, String, Sql, SelectItem);

/// Table or derived table used by FROM and JOIN
#[derive(Debug, Clone)]
pub enum TableSource {
    /// Logical table name with optional alias, e.g. `user U`
    Name(String),
    /// `(subquery) AS alias`
    Query(Box<QueryBuilder>, String),
}

impl TableSource {
    pub fn query(query: QueryBuilder, alias: impl Into<String>) -> Self {
        TableSource::Query(Box::new(query), alias.into())
    }
}

impl From<&str> for TableSource {
    fn from(table: &str) -> Self {
        TableSource::Name(table.to_string())
    }
}

impl From<String> for TableSource {
    fn from(table: String) -> Self {
        TableSource::Name(table)
    }
}

impl_into_list!(TableSource => &str, String, TableSource);
impl_into_list!(String => &str, String);
impl_into_list!(QueryBuilder => QueryBuilder);

/// Join kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

/// Fluent builder for one statement
#[derive(Debug)]
pub struct QueryBuilder {
    dialect: Arc<dyn SqlDialect>,
    tables: TableNames,
    fragment: QueryFragment,
    to_array: bool,
    cache: Option<bool>,
    error: Option<Error>,
}

impl Clone for QueryBuilder {
    fn clone(&self) -> Self {
        Self {
            dialect: Arc::clone(&self.dialect),
            tables: self.tables.clone(),
            fragment: self.fragment.clone(),
            to_array: self.to_array,
            cache: self.cache,
            error: self.error.as_ref().map(replicate_error),
        }
    }
}

/// Builder errors are plain data; rebuild them for a cloned builder
fn replicate_error(error: &Error) -> Error {
    match error.root() {
        Error::InvalidCondition(msg) => Error::InvalidCondition(msg.clone()),
        Error::MissingClause(clause) => Error::MissingClause(clause.clone()),
        Error::UnsupportedFeature { dialect, feature } => Error::UnsupportedFeature {
            dialect: dialect.clone(),
            feature: feature.clone(),
        },
        other => Error::internal(other.to_string()),
    }
}

impl QueryBuilder {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        Self {
            dialect,
            tables: TableNames::new(),
            fragment: QueryFragment::new(),
            to_array: false,
            cache: None,
            error: None,
        }
    }

    pub fn for_backend(backend: DatabaseBackend) -> Self {
        Self::new(create_dialect(backend))
    }

    /// Resolve logical table names through `tables`
    pub fn with_tables(mut self, tables: TableNames) -> Self {
        self.tables = tables;
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn kind(&self) -> StatementKind {
        self.fragment.kind
    }

    /// Independent copy of the builder and its bindings
    pub fn copy(&self) -> Self {
        self.clone()
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                None
            }
        }
    }

    fn render_condition(&mut self, condition: &Condition) -> Result<Option<String>> {
        if condition.is_empty() {
            return Ok(None);
        }
        let ctx = RenderContext::new(self.dialect.as_ref(), &self.tables);
        condition.render(&ctx, &mut self.fragment.bindings).map(Some)
    }

    fn render_select_item(&mut self, item: SelectItem) -> Result<String> {
        match item {
            SelectItem::Field(field) => {
                Ok(FieldName::parse(&field)?.render(self.dialect.as_ref()))
            }
            SelectItem::Sql(sql) => {
                let ctx = RenderContext::new(self.dialect.as_ref(), &self.tables);
                sql.render(&ctx, &mut self.fragment.bindings)
            }
            SelectItem::Query(query, alias) => {
                let sub = self.absorb(&query)?;
                Ok(format!(
                    "({}) AS {}",
                    sub,
                    self.dialect.quote_identifier(&alias)
                ))
            }
        }
    }

    fn render_table(&mut self, source: TableSource) -> Result<String> {
        match source {
            TableSource::Name(name) => {
                Ok(TableRef::parse(&name)?.render(self.dialect.as_ref(), &self.tables))
            }
            TableSource::Query(query, alias) => {
                let sub = self.absorb(&query)?;
                Ok(format!(
                    "({}) AS {}",
                    sub,
                    render_alias(self.dialect.as_ref(), &alias)
                ))
            }
        }
    }

    /// Render a nested builder and merge its bindings into ours
    fn absorb(&mut self, query: &QueryBuilder) -> Result<String> {
        let statement = query.to_statement()?;
        Ok(self
            .fragment
            .bindings
            .absorb(statement.bindings, &statement.sql))
    }

    fn target(&self, table: &str) -> Result<String> {
        Ok(TableRef::parse(table)?.render(self.dialect.as_ref(), &self.tables))
    }

    fn column(&self, column: &str) -> Result<String> {
        let field = FieldName::parse(column)?;
        if field.alias.is_some() || field.column == "*" {
            return Err(Error::invalid_condition(format!(
                "'{}' is not a plain column name",
                column
            )));
        }
        Ok(field.render_reference(self.dialect.as_ref()))
    }

    // Select list

    /// Columns to select; replaces any previous list
    pub fn select(mut self, items: impl IntoList<SelectItem>) -> Self {
        let mut rendered = Vec::new();
        for item in items.into_list() {
            let result = self.render_select_item(item);
            if let Some(sql) = self.record(result) {
                rendered.push(sql);
            }
        }
        self.fragment.kind = StatementKind::Select;
        self.fragment.select = rendered;
        self
    }

    /// `SELECT DISTINCT …`
    pub fn select_distinct(self, items: impl IntoList<SelectItem>) -> Self {
        let mut builder = self.select(items);
        builder.fragment.distinct = true;
        builder
    }

    /// Row-count projections
    ///
    /// `"*"` counts rows, `"U.id total"` counts a column under an alias.
    /// With no fields the projection is `COUNT(*) AS "count"`.
    pub fn select_count(mut self, fields: impl IntoList<String>) -> Self {
        let mut fields = fields.into_list();
        if fields.is_empty() {
            fields.push("* count".to_string());
        }
        let mut rendered = Vec::new();
        for field in fields {
            let result = FieldName::parse(&field).map(|parsed| {
                let alias = parsed.alias.clone().unwrap_or_else(|| "count".to_string());
                let column = FieldName { alias: None, ..parsed };
                format!(
                    "COUNT({}) AS {}",
                    column.render_reference(self.dialect.as_ref()),
                    self.dialect.quote_identifier(&alias)
                )
            });
            if let Some(sql) = self.record(result) {
                rendered.push(sql);
            }
        }
        self.fragment.kind = StatementKind::Select;
        self.fragment.select = rendered;
        self
    }

    /// Tables to read from; replaces any previous list
    pub fn from(mut self, tables: impl IntoList<TableSource>) -> Self {
        let mut rendered = Vec::new();
        for table in tables.into_list() {
            let result = self.render_table(table);
            if let Some(sql) = self.record(result) {
                rendered.push(sql);
            }
        }
        self.fragment.from = rendered;
        self
    }

    // Predicates

    /// Set the WHERE predicate, replacing any previous one
    pub fn where_(mut self, condition: impl Into<Condition>) -> Self {
        let result = self.render_condition(&condition.into());
        if let Some(rendered) = self.record(result) {
            self.fragment.where_clause = rendered;
        }
        self
    }

    /// `(existing) AND (condition)`
    pub fn and_where(self, condition: impl Into<Condition>) -> Self {
        self.combine_where(condition.into(), "AND")
    }

    /// `(existing) OR (condition)`
    pub fn or_where(self, condition: impl Into<Condition>) -> Self {
        self.combine_where(condition.into(), "OR")
    }

    fn combine_where(mut self, condition: Condition, logic: &str) -> Self {
        let result = self.render_condition(&condition);
        if let Some(Some(rendered)) = self.record(result) {
            self.fragment.where_clause = Some(match self.fragment.where_clause.take() {
                Some(existing) => format!("({}) {} ({})", existing, logic, rendered),
                None => rendered,
            });
        }
        self
    }

    /// Append `EXISTS (SELECT 1 FROM table WHERE condition)` with AND
    pub fn exists(self, table: &str, condition: impl Into<Condition>) -> Self {
        self.push_exists(table, condition.into(), false)
    }

    pub fn not_exists(self, table: &str, condition: impl Into<Condition>) -> Self {
        self.push_exists(table, condition.into(), true)
    }

    fn push_exists(mut self, table: &str, condition: Condition, negate: bool) -> Self {
        let result = self.target(table).and_then(|target| {
            let mut sql = format!("SELECT 1 FROM {}", target);
            if let Some(predicate) = self.render_condition(&condition)? {
                sql.push_str(" WHERE ");
                sql.push_str(&predicate);
            }
            Ok(sql)
        });
        if let Some(sub) = self.record(result) {
            let keyword = if negate { "NOT EXISTS" } else { "EXISTS" };
            self.fragment.exists.push(format!("{} ({})", keyword, sub));
        }
        self
    }

    // Joins

    pub fn join(
        mut self,
        table: impl Into<TableSource>,
        join_type: JoinType,
        on: impl Into<Condition>,
    ) -> Self {
        if join_type == JoinType::Full && !self.dialect.supports_full_join() {
            let err = Error::unsupported(self.dialect.name(), "FULL OUTER JOIN");
            self.record::<()>(Err(err));
            return self;
        }
        let on = on.into();
        let result = self.render_table(table.into()).and_then(|table| {
            let mut sql = format!("{} {}", join_type.as_sql(), table);
            if let Some(predicate) = self.render_condition(&on)? {
                sql.push_str(" ON ");
                sql.push_str(&predicate);
            }
            Ok(sql)
        });
        if let Some(join) = self.record(result) {
            self.fragment.joins.push(join);
        }
        self
    }

    pub fn inner_join(self, table: impl Into<TableSource>, on: impl Into<Condition>) -> Self {
        self.join(table, JoinType::Inner, on)
    }

    pub fn left_join(self, table: impl Into<TableSource>, on: impl Into<Condition>) -> Self {
        self.join(table, JoinType::Left, on)
    }

    pub fn right_join(self, table: impl Into<TableSource>, on: impl Into<Condition>) -> Self {
        self.join(table, JoinType::Right, on)
    }

    // Grouping and ordering

    pub fn group_by(mut self, fields: impl IntoList<String>) -> Self {
        let mut rendered = Vec::new();
        for field in fields.into_list() {
            let result = self.column(&field);
            if let Some(sql) = self.record(result) {
                rendered.push(sql);
            }
        }
        self.fragment.group_by = rendered;
        self
    }

    pub fn having(mut self, condition: impl Into<Condition>) -> Self {
        let result = self.render_condition(&condition.into());
        if let Some(rendered) = self.record(result) {
            self.fragment.having = rendered;
        }
        self
    }

    /// Sort keys, e.g. `"U.name"`, `"created_at DESC"` or `"RAND()"`
    pub fn order(mut self, fields: impl IntoList<String>) -> Self {
        let mut rendered = Vec::new();
        for field in fields.into_list() {
            let (name, direction) = split_direction(&field);
            let result = if name.eq_ignore_ascii_case("RAND()") {
                Ok(self.dialect.random_function().to_string())
            } else {
                self.column(name)
            };
            if let Some(mut sql) = self.record(result) {
                if let Some(direction) = direction {
                    sql.push(' ');
                    sql.push_str(direction.as_sql());
                }
                rendered.push(sql);
            }
        }
        self.fragment.order_by = rendered;
        self
    }

    /// Cap the result at `count` rows, skipping `start`
    ///
    /// A count of 0 removes the cap.
    pub fn limit(mut self, count: u64, start: u64) -> Self {
        self.fragment.limit = if count > 0 { Some(count) } else { None };
        self.fragment.offset = if start > 0 { Some(start) } else { None };
        self
    }

    pub fn offset(mut self, start: u64) -> Self {
        self.fragment.offset = if start > 0 { Some(start) } else { None };
        self
    }

    /// 1-based page of `per_page` rows
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page, (page - 1) * per_page)
    }

    // Writes

    /// `INSERT INTO table (…) VALUES (…)`
    ///
    /// `Value::Sql` and field references are inlined, everything else bound.
    pub fn insert<I, K, V>(mut self, table: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.fragment.kind = StatementKind::Insert;
        let result = self.target(table);
        self.fragment.target = self.record(result);
        self.fragment.insert_columns.clear();
        self.fragment.insert_values.clear();

        for (column, value) in data {
            let column = column.into();
            let value = value.into();
            let result = self.column(&column).and_then(|quoted| {
                let ctx = RenderContext::new(self.dialect.as_ref(), &self.tables);
                let operand = encode_operand(&ctx, &mut self.fragment.bindings, &column, &value)?;
                Ok((quoted, operand))
            });
            if let Some((quoted, operand)) = self.record(result) {
                self.fragment.insert_columns.push(quoted);
                self.fragment.insert_values.push(operand);
            }
        }
        self
    }

    /// INSERT that updates the non-key columns when `primary_key` exists
    ///
    /// Rendered natively on MySQL and PostgreSQL. SQL Server has no single
    /// statement form; use `Connection::insert_or_update` there.
    pub fn insert_or_update<I, K, V>(self, table: &str, data: I, primary_key: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let data: Vec<(String, Value)> = data
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let columns = data.iter().map(|(k, _)| k.clone()).collect();
        let mut builder = self.insert(table, data);
        builder.fragment.upsert = Some(UpsertClause {
            columns,
            primary_key: primary_key.to_string(),
        });
        builder
    }

    /// `INSERT INTO table (columns) SELECT …`
    pub fn insert_select(
        mut self,
        table: &str,
        query: QueryBuilder,
        columns: impl IntoList<String>,
    ) -> Self {
        self.fragment.kind = StatementKind::Insert;
        let result = self.target(table);
        self.fragment.target = self.record(result);
        let mut quoted = Vec::new();
        for column in columns.into_list() {
            let result = self.column(&column);
            if let Some(sql) = self.record(result) {
                quoted.push(sql);
            }
        }
        self.fragment.insert_columns = quoted;
        let result = self.absorb(&query);
        self.fragment.insert_select = self.record(result);
        self
    }

    pub fn update(mut self, table: &str) -> Self {
        self.fragment.kind = StatementKind::Update;
        let result = self.target(table);
        self.fragment.target = self.record(result);
        self
    }

    /// Assignments for UPDATE, appended to any earlier ones
    pub fn set<I, K, V>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in data {
            let column = column.into();
            let value = value.into();
            let result = self.column(&column).and_then(|quoted| {
                let ctx = RenderContext::new(self.dialect.as_ref(), &self.tables);
                let base = format!("s{}", column);
                let operand = encode_operand(&ctx, &mut self.fragment.bindings, &base, &value)?;
                Ok(format!("{} = {}", quoted, operand))
            });
            if let Some(assignment) = self.record(result) {
                self.fragment.set.push(assignment);
            }
        }
        self
    }

    /// `column = <Sql expression>`
    pub fn set_expr(mut self, column: &str, expression: Sql) -> Self {
        let result = self.column(column).and_then(|quoted| {
            let ctx = RenderContext::new(self.dialect.as_ref(), &self.tables);
            let rendered = expression.render_expression(&ctx, &mut self.fragment.bindings)?;
            Ok(format!("{} = {}", quoted, rendered))
        });
        if let Some(assignment) = self.record(result) {
            self.fragment.set.push(assignment);
        }
        self
    }

    /// Caller-trusted assignment, e.g. `"`hits` = `hits` + 1"`
    pub fn set_raw(mut self, assignment: impl Into<String>) -> Self {
        self.fragment.set.push(assignment.into());
        self
    }

    /// `DELETE FROM table WHERE condition`
    pub fn delete(mut self, table: &str, condition: impl Into<Condition>) -> Self {
        self.fragment.kind = StatementKind::Delete;
        let result = self.target(table);
        self.fragment.target = self.record(result);
        self.where_(condition)
    }

    // Unions

    /// `(a) UNION (b)`; select from the union with `select` to page it
    pub fn union(self, queries: impl IntoList<QueryBuilder>) -> Self {
        self.push_unions(queries.into_list(), UnionKind::Distinct)
    }

    pub fn union_all(self, queries: impl IntoList<QueryBuilder>) -> Self {
        self.push_unions(queries.into_list(), UnionKind::All)
    }

    fn push_unions(mut self, queries: Vec<QueryBuilder>, kind: UnionKind) -> Self {
        for query in queries {
            let result = self.absorb(&query);
            if let Some(sql) = self.record(result) {
                self.fragment.unions.push(sql);
            }
        }
        self.fragment.kind = StatementKind::Select;
        self.fragment.union_kind = Some(kind);
        self
    }

    // Prefixes

    pub fn explain(mut self) -> Self {
        self.fragment.prefix = Some(Prefix::Explain);
        self
    }

    pub fn create_view(mut self, name: &str) -> Self {
        let view = self.tables.qualified(self.dialect.as_ref(), name);
        self.fragment.prefix = Some(Prefix::CreateView(view));
        self
    }

    pub fn create_tmp_table(mut self, name: &str) -> Self {
        let table = self.tables.qualified(self.dialect.as_ref(), name);
        self.fragment.prefix = Some(Prefix::CreateTempTable(table));
        self
    }

    // Execution flags

    /// Return plain records from the next `execute`
    pub fn to_array(mut self) -> Self {
        self.to_array = true;
        self
    }

    /// Route every execution of this builder through the result cache
    pub fn cache_on(mut self, auto_save: bool) -> Self {
        self.cache = Some(auto_save);
        self
    }

    // Output

    /// Render the statement with named placeholders
    pub fn to_statement(&self) -> Result<Statement> {
        if let Some(err) = &self.error {
            return Err(replicate_error(err));
        }
        let sql = self.dialect.assemble(&self.fragment)?;
        let mut bindings: Bindings = self.fragment.bindings.clone();
        bindings.retain_used(&sql);
        Ok(Statement::new(sql, bindings))
    }

    /// SQL with positional markers and the parameters in order
    pub fn build(&self) -> Result<(String, Vec<Value>)> {
        Ok(self.to_statement()?.to_positional(self.dialect.as_ref()))
    }

    /// SQL with the values spliced in, for display only
    pub fn text(&self) -> Result<String> {
        Ok(self.to_statement()?.interpolated())
    }

    pub fn get_values(&self) -> Result<Vec<Value>> {
        Ok(self.build()?.1)
    }

    // Execution

    /// Run the statement
    ///
    /// Reads return rows; writes return an empty row set. The `to_array`
    /// flag applies to this call only.
    pub async fn execute(&mut self, conn: &mut Connection) -> Result<Rows> {
        let to_array = std::mem::take(&mut self.to_array);
        let statement = self.to_statement()?;
        if self.fragment.kind != StatementKind::Select || self.fragment.prefix.is_some() {
            conn.execute_statement(&statement, self.fragment.kind.name())
                .await?;
            return Ok(Rows::from_records(Vec::new(), to_array));
        }
        if let Some(auto_save) = self.cache {
            conn.cache_on(auto_save);
        }
        conn.fetch_statement(&statement, self.fragment.kind.name(), to_array)
            .await
    }

    /// Run a write and return the affected row count
    pub async fn save(&mut self, conn: &mut Connection) -> Result<u64> {
        self.to_array = false;
        let statement = self.to_statement()?;
        conn.execute_statement(&statement, self.fragment.kind.name())
            .await
    }

    /// First row, or `None` when nothing matches
    pub async fn first(&mut self, conn: &mut Connection) -> Result<Option<Row>> {
        self.fragment.limit = Some(1);
        Ok(self.execute(conn).await?.first())
    }

    /// Number of matching rows
    ///
    /// Without an explicit select list a `COUNT(*)` projection is used.
    pub async fn count(&self, conn: &mut Connection) -> Result<u64> {
        let mut counting = self.clone();
        if !counting.fragment.has_select() {
            counting = counting.select_count(Vec::<String>::new());
            counting.fragment.order_by.clear();
            counting.fragment.limit = None;
            counting.fragment.offset = None;
        }
        let row = counting.to_array().execute(conn).await?.first();
        Ok(row
            .as_ref()
            .and_then(|row| row.get("count").or_else(|| row.first_value()))
            .and_then(json_to_u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql() -> QueryBuilder {
        QueryBuilder::for_backend(DatabaseBackend::MySQL)
    }

    #[test]
    fn test_select_where_per_dialect() {
        let (sql, params) = mysql()
            .select("*")
            .from("users")
            .where_(("id", 5))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `users` WHERE `id` = ?");
        assert_eq!(params, vec![Value::Int(5)]);

        let (sql, params) = QueryBuilder::for_backend(DatabaseBackend::Postgres)
            .select("*")
            .from("users")
            .where_(("id", 5))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" WHERE \"id\" = $1");
        assert_eq!(params, vec![Value::Int(5)]);

        let (sql, params) = QueryBuilder::for_backend(DatabaseBackend::MsSql)
            .select("*")
            .from("users")
            .where_(("id", 5))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM [users] WHERE [id] = @P1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_where_composition_is_left_associative() {
        let statement = mysql()
            .from("users")
            .where_(("a", 1))
            .and_where(("b", 2))
            .or_where(("c", 3))
            .to_statement()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM `users` WHERE ((`a` = :a0) AND (`b` = :b1)) OR (`c` = :c2)"
        );

        let statement = mysql()
            .from("users")
            .where_(("a", 1))
            .where_(("b", 2))
            .to_statement()
            .unwrap();
        assert_eq!(statement.sql, "SELECT * FROM `users` WHERE `b` = :b1");
        assert_eq!(statement.bindings.len(), 1);
    }

    #[test]
    fn test_aliases_joins_and_order() {
        let sql = mysql()
            .select(["U.id", "U.name AS user_name", "P.title"])
            .from("user U")
            .left_join("post P", Condition::on("P.user_id", "U.id"))
            .order(["U.name", "P.id DESC"])
            .text()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT U.`id`, U.`name` AS `user_name`, P.`title` FROM `user` AS U \
             LEFT JOIN `post` AS P ON P.`user_id` = U.`id` ORDER BY U.`name`, P.`id` DESC"
        );
    }

    #[test]
    fn test_table_prefix_and_mapping() {
        let tables = TableNames::new()
            .with_prefix("app")
            .with_mapping("member", "users");
        let sql = mysql()
            .with_tables(tables)
            .from("member M")
            .text()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM `app_users` AS M");
    }

    #[test]
    fn test_limit_forms() {
        let q = |backend| {
            QueryBuilder::for_backend(backend)
                .from("users")
                .limit(10, 20)
                .text()
                .unwrap()
        };
        assert_eq!(q(DatabaseBackend::MySQL), "SELECT * FROM `users` LIMIT 20,10");
        assert_eq!(
            q(DatabaseBackend::Postgres),
            "SELECT * FROM \"users\" LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            q(DatabaseBackend::MsSql),
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_random_order_follows_dialect() {
        let sql = QueryBuilder::for_backend(DatabaseBackend::MsSql)
            .from("users")
            .order("RAND()")
            .limit(1, 0)
            .text()
            .unwrap();
        assert_eq!(sql, "SELECT TOP 1 * FROM [users] ORDER BY NEWID()");
    }

    #[test]
    fn test_select_count_projection() {
        let sql = QueryBuilder::for_backend(DatabaseBackend::Postgres)
            .select_count(Vec::<String>::new())
            .from("users")
            .text()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(*) AS \"count\" FROM \"users\"");

        let sql = mysql()
            .select_count("U.id total")
            .from("users U")
            .text()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(U.`id`) AS `total` FROM `users` AS U");
    }

    #[test]
    fn test_subquery_bindings_are_renamed() {
        let inner = mysql()
            .select("user_id")
            .from("orders")
            .where_(("id", 7));
        let statement = mysql()
            .from("users")
            .where_(Condition::and(vec![
                Condition::eq("id", 3),
                Condition::in_query("id", inner),
            ]))
            .to_statement()
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM `users` WHERE (`id` = :id0 AND `id` IN (SELECT `user_id` FROM `orders` WHERE `id` = :id1))"
        );
        assert_eq!(statement.bindings.values(), vec![Value::Int(3), Value::Int(7)]);
    }

    #[test]
    fn test_update_and_delete() {
        let statement = mysql()
            .update("users")
            .set([("name", Value::from("Ann")), ("visits", Value::sql("`visits` + 1"))])
            .where_(("id", 1))
            .to_statement()
            .unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE `users` SET `name` = :sname0, `visits` = `visits` + 1 WHERE `id` = :id1"
        );

        let (sql, _) = QueryBuilder::for_backend(DatabaseBackend::MsSql)
            .delete("users", ("id", 1))
            .limit(1, 0)
            .build()
            .unwrap();
        assert_eq!(sql, "DELETE TOP (1) FROM [users] WHERE [id] = @P1");
    }

    #[test]
    fn test_insert_inlines_sql_values() {
        let (sql, params) = QueryBuilder::for_backend(DatabaseBackend::Postgres)
            .insert(
                "users",
                vec![
                    ("name", Value::from("Ann")),
                    ("created_at", Value::sql("CURRENT_TIMESTAMP")),
                ],
            )
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"name\", \"created_at\") VALUES ($1, CURRENT_TIMESTAMP)"
        );
        assert_eq!(params, vec![Value::from("Ann")]);
    }

    #[test]
    fn test_exists_and_union() {
        let sql = mysql()
            .from("user U")
            .where_(("U.status", 1))
            .exists("post", Condition::on("user_id", "U.id"))
            .text()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM `user` AS U WHERE U.`status` = 1 AND EXISTS (SELECT 1 FROM `post` WHERE `user_id` = U.`id`)"
        );

        let a = mysql().select("id").from("a").where_(("x", "1"));
        let b = mysql().select("id").from("b").where_(("x", "2"));
        let statement = mysql().union_all(vec![a, b]).to_statement().unwrap();
        assert_eq!(
            statement.sql,
            "(SELECT `id` FROM `a` WHERE `x` = :x0) UNION ALL (SELECT `id` FROM `b` WHERE `x` = :x1)"
        );
    }

    #[test]
    fn test_errors_surface_at_build_time() {
        let err = mysql()
            .select("name; DROP TABLE users")
            .from("users")
            .build()
            .unwrap_err();
        assert!(err.is_invalid_condition());

        let err = mysql()
            .from("a")
            .join("b", JoinType::Full, Condition::on("a.id", "b.id"))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "E_UNSUPPORTED");

        let err = QueryBuilder::for_backend(DatabaseBackend::MsSql)
            .from("users")
            .explain()
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "E_UNSUPPORTED");

        // cloned builders keep the failure
        let broken = mysql().from("bad table name here");
        assert!(broken.copy().build().is_err());
    }

    #[test]
    fn test_zero_limit_means_no_cap() {
        let (sql, _) = mysql().from("users").limit(0, 0).build().unwrap();
        assert_eq!(sql, "SELECT * FROM `users`");

        let (sql, _) = QueryBuilder::for_backend(DatabaseBackend::MsSql)
            .from("users")
            .limit(10, 0)
            .limit(0, 0)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM [users]");

        let (sql, _) = QueryBuilder::for_backend(DatabaseBackend::Postgres)
            .from("users")
            .limit(0, 20)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"users\" OFFSET 20");
    }

    #[test]
    fn test_bare_union_rejects_trailing_predicates() {
        let a = mysql().select("id").from("a");
        let b = mysql().select("id").from("b");
        let err = mysql()
            .union(vec![a.copy(), b.copy()])
            .where_(("id", 1))
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "E_UNSUPPORTED");

        let err = mysql()
            .union(vec![a.copy(), b.copy()])
            .group_by("id")
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "E_UNSUPPORTED");

        let (sql, params) = mysql()
            .select("*")
            .union(vec![a, b])
            .where_(("id", 1))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM ((SELECT `id` FROM `a`) UNION (SELECT `id` FROM `b`)) AS U9 WHERE `id` = ?"
        );
        assert_eq!(params, vec![Value::Int(1)]);
    }

    #[test]
    fn test_ordered_writes_only_on_mysql() {
        let (sql, _) = mysql()
            .delete("logs", ("level", "debug"))
            .order("id")
            .limit(100, 0)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "DELETE FROM `logs` WHERE `level` = ? ORDER BY `id` LIMIT 100"
        );

        for backend in [DatabaseBackend::MsSql, DatabaseBackend::Postgres] {
            let err = QueryBuilder::for_backend(backend)
                .update("logs")
                .set([("seen", true)])
                .order("id")
                .build()
                .unwrap_err();
            assert_eq!(err.error_code(), "E_UNSUPPORTED");
        }
    }
}
