//! Condition encoding
//!
//! A `Condition` is an explicit tagged tree. Rendering produces SQL with
//! named placeholders and records the bound values in a `Bindings` map.

use super::builder::QueryBuilder;
use super::dialects::SqlDialect;
use super::field::FieldName;
use super::functions::Sql;
use super::placeholder::Bindings;
use super::tables::TableNames;
use super::value::Value;
use crate::error::{Error, Result};

/// Everything a fragment needs to render itself
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub dialect: &'a dyn SqlDialect,
    pub tables: &'a TableNames,
}

impl<'a> RenderContext<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, tables: &'a TableNames) -> Self {
        Self { dialect, tables }
    }
}

/// Boolean operator joining the members of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Logic::And => " AND ",
            Logic::Or => " OR ",
        }
    }
}

/// Left-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Identifier, validated and quoted at render time
    Name(String),
    /// Raw SQL expression, trusted as written
    Expr(String),
}

impl Field {
    fn render(&self, dialect: &dyn SqlDialect) -> Result<(String, String)> {
        match self {
            Field::Name(name) => {
                let field = FieldName::parse(name)?;
                if field.alias.is_some() {
                    return Err(Error::invalid_condition(format!(
                        "'{}' carries an alias, which is not allowed in a condition",
                        name
                    )));
                }
                Ok((field.render_reference(dialect), field.binding_base()))
            }
            Field::Expr(expr) => {
                let base: String = expr
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .take(16)
                    .collect();
                Ok((expr.clone(), base))
            }
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::Name(name.to_string())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Name(name)
    }
}

const OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", ">", "<=", ">=", "LIKE", "NOT LIKE", "ILIKE", "IN", "NOT IN", "IS",
    "IS NOT", "REGEXP", "NOT REGEXP",
];

fn normalize_operator(operator: &str) -> Result<String> {
    let normalized = operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    if OPERATORS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(Error::invalid_condition(format!(
            "Unknown comparison operator '{}'",
            operator
        )))
    }
}

/// Predicate tree handed to `where_`, `having`, joins and helpers
#[derive(Debug, Clone)]
pub enum Condition {
    Compare {
        field: Field,
        operator: String,
        value: Value,
    },
    Group {
        logic: Logic,
        conditions: Vec<Condition>,
    },
    /// Caller-trusted SQL, rendered verbatim
    Raw(String),
    /// Predicate built from an `Sql` helper, e.g. `Sql::between`
    Expr(Sql),
    /// `field IN (SELECT …)` and friends
    Subquery {
        field: Field,
        operator: String,
        query: Box<QueryBuilder>,
    },
}

impl Condition {
    pub fn compare(field: impl Into<Field>, operator: &str, value: impl Into<Value>) -> Self {
        Condition::Compare {
            field: field.into(),
            operator: operator.to_string(),
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, "=", value)
    }

    pub fn ne(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, "!=", value)
    }

    pub fn gt(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, ">", value)
    }

    pub fn gte(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, ">=", value)
    }

    pub fn lt(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, "<", value)
    }

    pub fn lte(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self::compare(field, "<=", value)
    }

    pub fn like(field: impl Into<Field>, pattern: impl Into<Value>) -> Self {
        Self::compare(field, "LIKE", pattern)
    }

    pub fn is_in<I, V>(field: impl Into<Field>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::compare(field, "IN", Value::list(values))
    }

    pub fn not_in<I, V>(field: impl Into<Field>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::compare(field, "NOT IN", Value::list(values))
    }

    pub fn is_null(field: impl Into<Field>) -> Self {
        Self::compare(field, "=", Value::Null)
    }

    pub fn is_not_null(field: impl Into<Field>) -> Self {
        Self::compare(field, "!=", Value::Null)
    }

    /// Primary-key shorthand, `id = value`
    pub fn id(value: impl Into<Value>) -> Self {
        Self::eq("id", value)
    }

    /// Column-to-column equality, the usual join predicate
    pub fn on(left: &str, right: &str) -> Self {
        Self::eq(left, Value::field(right))
    }

    /// Comparison whose left-hand side is a raw SQL expression
    pub fn expr(expression: impl Into<String>, operator: &str, value: impl Into<Value>) -> Self {
        Condition::Compare {
            field: Field::Expr(expression.into()),
            operator: operator.to_string(),
            value: value.into(),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(sql.into())
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            logic: Logic::And,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            logic: Logic::Or,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn in_query(field: impl Into<Field>, query: QueryBuilder) -> Self {
        Self::subquery(field, "IN", query)
    }

    pub fn subquery(field: impl Into<Field>, operator: &str, query: QueryBuilder) -> Self {
        Condition::Subquery {
            field: field.into(),
            operator: operator.to_string(),
            query: Box::new(query),
        }
    }

    /// True for groups with nothing to render
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Group { conditions, .. } => conditions.iter().all(Condition::is_empty),
            Condition::Raw(sql) => sql.trim().is_empty(),
            _ => false,
        }
    }

    /// Render into SQL, binding values into `bindings`
    pub fn render(&self, ctx: &RenderContext<'_>, bindings: &mut Bindings) -> Result<String> {
        match self {
            Condition::Compare {
                field,
                operator,
                value,
            } => render_compare(ctx, bindings, field, operator, value),
            Condition::Group { logic, conditions } => {
                let mut parts = Vec::with_capacity(conditions.len());
                for condition in conditions.iter().filter(|c| !c.is_empty()) {
                    parts.push(condition.render(ctx, bindings)?);
                }
                match parts.len() {
                    0 => Err(Error::invalid_condition("empty condition group")),
                    1 => Ok(parts.remove(0)),
                    _ => Ok(format!("({})", parts.join(logic.as_sql()))),
                }
            }
            Condition::Raw(sql) => Ok(sql.clone()),
            Condition::Expr(sql) => sql.render_expression(ctx, bindings),
            Condition::Subquery {
                field,
                operator,
                query,
            } => {
                let (field_sql, _) = field.render(ctx.dialect)?;
                let operator = match normalize_operator(operator)?.as_str() {
                    "=" | "IN" => "IN".to_string(),
                    "!=" | "<>" | "NOT IN" => "NOT IN".to_string(),
                    other => other.to_string(),
                };
                let statement = query.to_statement()?;
                let sub_sql = bindings.absorb(statement.bindings, &statement.sql);
                Ok(format!("{} {} ({})", field_sql, operator, sub_sql))
            }
        }
    }
}

fn render_compare(
    ctx: &RenderContext<'_>,
    bindings: &mut Bindings,
    field: &Field,
    operator: &str,
    value: &Value,
) -> Result<String> {
    let (field_sql, base) = field.render(ctx.dialect)?;
    let operator = normalize_operator(operator)?;

    match value {
        Value::Null => {
            if operator == "=" || operator == "IS" {
                Ok(format!("{} IS NULL", field_sql))
            } else {
                Ok(format!("{} IS NOT NULL", field_sql))
            }
        }
        Value::List(items) => {
            let negate = match operator.as_str() {
                "=" | "IN" => false,
                "!=" | "<>" | "NOT IN" => true,
                other => {
                    return Err(Error::invalid_condition(format!(
                        "Operator '{}' cannot take a list of values",
                        other
                    )))
                }
            };
            render_in(ctx, bindings, &field_sql, &base, items, negate)
        }
        _ if operator == "IN" || operator == "NOT IN" => render_in(
            ctx,
            bindings,
            &field_sql,
            &base,
            std::slice::from_ref(value),
            operator == "NOT IN",
        ),
        _ => {
            let operand = encode_operand(ctx, bindings, &base, value)?;
            Ok(format!("{} {} {}", field_sql, operator, operand))
        }
    }
}

fn render_in(
    ctx: &RenderContext<'_>,
    bindings: &mut Bindings,
    field_sql: &str,
    base: &str,
    items: &[Value],
    negate: bool,
) -> Result<String> {
    if items.is_empty() {
        // IN () is not valid SQL on any engine
        return Ok(String::from(if negate { "1 = 1" } else { "1 = 0" }));
    }

    let mut members = Vec::with_capacity(items.len());
    for item in items {
        members.push(match item {
            Value::Float(f) if !f.is_finite() => {
                return Err(Error::invalid_condition(format!(
                    "{} is not a valid SQL number",
                    f
                )))
            }
            Value::Bool(b) => ctx.dialect.bool_literal(*b).to_string(),
            Value::Int(_) | Value::Float(_) | Value::Null => item.to_sql_literal(),
            Value::List(_) => {
                return Err(Error::invalid_condition("nested lists are not allowed in IN"))
            }
            other => encode_operand(ctx, bindings, base, other)?,
        });
    }

    let keyword = if negate { "NOT IN" } else { "IN" };
    Ok(format!("{} {} ({})", field_sql, keyword, members.join(", ")))
}

/// Render a right-hand operand: bind scalars, inline references and raw SQL
pub(crate) fn encode_operand(
    ctx: &RenderContext<'_>,
    bindings: &mut Bindings,
    base: &str,
    value: &Value,
) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
            Ok(bindings.bind(base, value.clone()))
        }
        Value::FieldRef { alias, name } => {
            let field = FieldName::parse(&match alias {
                Some(alias) => format!("{}.{}", alias, name),
                None => name.clone(),
            })?;
            Ok(field.render_reference(ctx.dialect))
        }
        Value::Sql(sql) => Ok(sql.clone()),
        Value::List(items) => {
            let mut members = Vec::with_capacity(items.len());
            for item in items {
                members.push(encode_operand(ctx, bindings, base, item)?);
            }
            Ok(format!("({})", members.join(", ")))
        }
    }
}

impl<V: Into<Value>> From<(&str, V)> for Condition {
    fn from((field, value): (&str, V)) -> Self {
        Condition::eq(field, value)
    }
}

impl<V: Into<Value>> From<(&str, &str, V)> for Condition {
    fn from((field, operator, value): (&str, &str, V)) -> Self {
        Condition::compare(field, operator, value)
    }
}

impl From<Vec<Condition>> for Condition {
    fn from(conditions: Vec<Condition>) -> Self {
        Condition::and(conditions)
    }
}

impl From<Sql> for Condition {
    fn from(sql: Sql) -> Self {
        Condition::Expr(sql)
    }
}
