//! SQL function helpers
//!
//! `Sql` values describe an expression (`COUNT(*)`, `IFNULL(a, b)`, …)
//! without committing to a dialect. They are rendered when the builder
//! assembles the statement, so the same helper yields `GROUP_CONCAT` on
//! MySQL and `STRING_AGG` elsewhere.

use super::condition::{encode_operand, Condition, RenderContext};
use super::dialects::DatePart;
use super::field::FieldName;
use super::placeholder::Bindings;
use super::value::Value;
use crate::error::Result;

#[derive(Debug, Clone)]
enum SqlExpr {
    Raw(String),
    Literal(Value),
    Column(String),
    Aggregate {
        function: &'static str,
        column: String,
        distinct: bool,
    },
    Distinct(String),
    Concat {
        columns: Vec<String>,
        separator: Option<String>,
    },
    GroupConcat {
        column: String,
        separator: String,
        order: Option<String>,
        distinct: bool,
    },
    IfNull(String, String),
    Now,
    Random,
    DatePart(DatePart, String),
    Date(String),
    DateDiff(String, String),
    DateFormat {
        column: String,
        format: String,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    IsNull(String),
    IsNotNull(String),
    Position {
        needle: Value,
        haystack: String,
    },
    NextId {
        column: String,
        table: String,
        condition: Option<Box<Condition>>,
    },
}

/// Dialect-neutral SQL expression with an optional alias
#[derive(Debug, Clone)]
pub struct Sql {
    expr: SqlExpr,
    alias: Option<String>,
}

impl Sql {
    fn new(expr: SqlExpr) -> Self {
        Self { expr, alias: None }
    }

    /// Attach `AS alias` for use in a select list
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Caller-trusted SQL, inserted verbatim
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(SqlExpr::Raw(sql.into()))
    }

    /// Quoted string literal
    pub fn str_value(value: impl Into<String>) -> Self {
        Self::new(SqlExpr::Literal(Value::Str(value.into())))
    }

    /// Plain column reference
    pub fn column(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::Column(column.into()))
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::aggregate("COUNT", column, false)
    }

    pub fn count_distinct(column: impl Into<String>) -> Self {
        Self::aggregate("COUNT", column, true)
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::aggregate("SUM", column, false)
    }

    pub fn avg(column: impl Into<String>) -> Self {
        Self::aggregate("AVG", column, false)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::aggregate("MIN", column, false)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::aggregate("MAX", column, false)
    }

    fn aggregate(function: &'static str, column: impl Into<String>, distinct: bool) -> Self {
        Self::new(SqlExpr::Aggregate {
            function,
            column: column.into(),
            distinct,
        })
    }

    pub fn distinct(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::Distinct(column.into()))
    }

    pub fn concat<I, S>(columns: I, separator: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SqlExpr::Concat {
            columns: columns.into_iter().map(Into::into).collect(),
            separator: separator.map(str::to_string),
        })
    }

    pub fn group_concat(
        column: impl Into<String>,
        separator: &str,
        order: Option<&str>,
        distinct: bool,
    ) -> Self {
        Self::new(SqlExpr::GroupConcat {
            column: column.into(),
            separator: separator.to_string(),
            order: order.map(str::to_string),
            distinct,
        })
    }

    /// `IFNULL(first, second)` over two columns
    pub fn if_null(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(SqlExpr::IfNull(first.into(), second.into()))
    }

    pub fn now() -> Self {
        Self::new(SqlExpr::Now)
    }

    pub fn rand() -> Self {
        Self::new(SqlExpr::Random)
    }

    pub fn year(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Year, column.into()))
    }

    pub fn month(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Month, column.into()))
    }

    pub fn day(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Day, column.into()))
    }

    pub fn hour(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Hour, column.into()))
    }

    pub fn minute(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Minute, column.into()))
    }

    pub fn second(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::DatePart(DatePart::Second, column.into()))
    }

    pub fn date(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::Date(column.into()))
    }

    /// Whole days from `second` to `first`
    pub fn date_diff(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::new(SqlExpr::DateDiff(first.into(), second.into()))
    }

    /// Format a date column; `format` is in the engine's own notation
    pub fn date_format(column: impl Into<String>, format: impl Into<String>) -> Self {
        Self::new(SqlExpr::DateFormat {
            column: column.into(),
            format: format.into(),
        })
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(SqlExpr::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        })
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::IsNull(column.into()))
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(SqlExpr::IsNotNull(column.into()))
    }

    pub fn position(needle: impl Into<Value>, haystack: impl Into<String>) -> Self {
        Self::new(SqlExpr::Position {
            needle: needle.into(),
            haystack: haystack.into(),
        })
    }

    /// `1 + MAX(column)` of a (logical) table, 1 when empty
    pub fn next_id(
        column: impl Into<String>,
        table: impl Into<String>,
        condition: Option<Condition>,
    ) -> Self {
        Self::new(SqlExpr::NextId {
            column: column.into(),
            table: table.into(),
            condition: condition.map(Box::new),
        })
    }

    /// Render the expression followed by `AS alias` when one was given
    pub fn render(&self, ctx: &RenderContext<'_>, bindings: &mut Bindings) -> Result<String> {
        let expression = self.render_expression(ctx, bindings)?;
        Ok(match &self.alias {
            Some(alias) => format!("{} AS {}", expression, ctx.dialect.quote_identifier(alias)),
            None => expression,
        })
    }

    /// Render the bare expression
    pub fn render_expression(
        &self,
        ctx: &RenderContext<'_>,
        bindings: &mut Bindings,
    ) -> Result<String> {
        let dialect = ctx.dialect;
        let column = |name: &str| -> Result<String> {
            Ok(FieldName::parse(name)?.render_reference(dialect))
        };

        Ok(match &self.expr {
            SqlExpr::Raw(sql) => sql.clone(),
            SqlExpr::Literal(value) => value.to_sql_literal(),
            SqlExpr::Column(name) => column(name)?,
            SqlExpr::Aggregate {
                function,
                column: name,
                distinct,
            } => {
                let inner = column(name)?;
                if *distinct {
                    format!("{}(DISTINCT {})", function, inner)
                } else {
                    format!("{}({})", function, inner)
                }
            }
            SqlExpr::Distinct(name) => format!("DISTINCT {}", column(name)?),
            SqlExpr::Concat { columns, separator } => {
                let parts = columns
                    .iter()
                    .map(|name| column(name))
                    .collect::<Result<Vec<_>>>()?;
                let separator = separator.as_ref().map(|s| Value::from(s.as_str()).to_sql_literal());
                dialect.concat_syntax(&parts, separator.as_deref())
            }
            SqlExpr::GroupConcat {
                column: name,
                separator,
                order,
                distinct,
            } => {
                let order = match order {
                    Some(order) => {
                        let (name, direction) = super::field::split_direction(order);
                        let mut rendered = column(name)?;
                        if let Some(direction) = direction {
                            rendered.push(' ');
                            rendered.push_str(direction.as_sql());
                        }
                        Some(rendered)
                    }
                    None => None,
                };
                dialect.group_concat_syntax(
                    &column(name)?,
                    &Value::from(separator.as_str()).to_sql_literal(),
                    order.as_deref(),
                    *distinct,
                )?
            }
            SqlExpr::IfNull(first, second) => dialect.if_null_syntax(&column(first)?, &column(second)?),
            SqlExpr::Now => dialect.current_timestamp().to_string(),
            SqlExpr::Random => dialect.random_function().to_string(),
            SqlExpr::DatePart(part, name) => dialect.date_part_syntax(*part, &column(name)?),
            SqlExpr::Date(name) => dialect.date_syntax(&column(name)?),
            SqlExpr::DateDiff(first, second) => {
                dialect.date_diff_syntax(&column(first)?, &column(second)?)
            }
            SqlExpr::DateFormat {
                column: name,
                format,
            } => dialect.date_format_syntax(
                &column(name)?,
                &Value::from(format.as_str()).to_sql_literal(),
            ),
            SqlExpr::Between {
                column: name,
                low,
                high,
            } => {
                let field = FieldName::parse(name)?;
                let base = field.binding_base();
                let low = encode_operand(ctx, bindings, &base, low)?;
                let high = encode_operand(ctx, bindings, &base, high)?;
                format!("{} BETWEEN {} AND {}", field.render_reference(dialect), low, high)
            }
            SqlExpr::IsNull(name) => format!("{} IS NULL", column(name)?),
            SqlExpr::IsNotNull(name) => format!("{} IS NOT NULL", column(name)?),
            SqlExpr::Position { needle, haystack } => {
                let needle = encode_operand(ctx, bindings, "position", needle)?;
                dialect.position_syntax(&needle, &column(haystack)?)
            }
            SqlExpr::NextId {
                column: name,
                table,
                condition,
            } => {
                let mut sql = format!(
                    "SELECT MAX({}) FROM {} AS X",
                    column(name)?,
                    ctx.tables.qualified(dialect, table)
                );
                if let Some(condition) = condition.as_ref().filter(|c| !c.is_empty()) {
                    sql.push_str(" WHERE ");
                    sql.push_str(&condition.render(ctx, bindings)?);
                }
                format!("(1 + {})", dialect.if_null_syntax(&format!("({})", sql), "0"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialects::{MsSqlDialect, MySQLDialect, PostgresDialect, SqlDialect};
    use crate::query::tables::TableNames;

    fn render_on(dialect: &dyn SqlDialect, sql: &Sql) -> String {
        let tables = TableNames::new();
        let ctx = RenderContext::new(dialect, &tables);
        let mut bindings = Bindings::new();
        sql.render(&ctx, &mut bindings).unwrap()
    }

    #[test]
    fn test_aggregates() {
        let mysql = MySQLDialect::new();
        assert_eq!(render_on(&mysql, &Sql::count("*").alias("total")), "COUNT(*) AS `total`");
        assert_eq!(render_on(&mysql, &Sql::count_distinct("U.id")), "COUNT(DISTINCT U.`id`)");
        assert_eq!(render_on(&mysql, &Sql::max("price")), "MAX(`price`)");
    }

    #[test]
    fn test_dialect_specific_functions() {
        let concat = Sql::concat(["first_name", "last_name"], Some(" "));
        assert_eq!(
            render_on(&MySQLDialect::new(), &concat),
            "CONCAT_WS(' ', `first_name`, `last_name`)"
        );
        assert_eq!(
            render_on(&MsSqlDialect::new(), &concat),
            "[first_name] + ' ' + [last_name]"
        );

        let grouped = Sql::group_concat("name", ",", Some("name DESC"), false);
        assert_eq!(
            render_on(&MySQLDialect::new(), &grouped),
            "GROUP_CONCAT(`name` ORDER BY `name` DESC SEPARATOR ',')"
        );
        assert_eq!(
            render_on(&PostgresDialect::new(), &grouped),
            "STRING_AGG(CAST(\"name\" AS TEXT), ',' ORDER BY \"name\" DESC)"
        );

        assert_eq!(render_on(&MsSqlDialect::new(), &Sql::now()), "GETDATE()");
        assert_eq!(
            render_on(&MsSqlDialect::new(), &Sql::if_null("nick", "name")),
            "ISNULL([nick], [name])"
        );
        assert_eq!(
            render_on(&PostgresDialect::new(), &Sql::year("created_at")),
            "EXTRACT(YEAR FROM \"created_at\")"
        );
    }

    #[test]
    fn test_between_binds_bounds() {
        let tables = TableNames::new();
        let dialect = MySQLDialect::new();
        let ctx = RenderContext::new(&dialect, &tables);
        let mut bindings = Bindings::new();
        let sql = Sql::between("created_at", "2024-01-01", "2024-12-31")
            .render(&ctx, &mut bindings)
            .unwrap();
        assert_eq!(sql, "`created_at` BETWEEN :createdat0 AND :createdat1");
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_next_id_uses_table_names() {
        let tables = TableNames::new().with_prefix("app");
        let dialect = MySQLDialect::new();
        let ctx = RenderContext::new(&dialect, &tables);
        let mut bindings = Bindings::new();
        let sql = Sql::next_id("id", "user", Some(Condition::eq("status", 1)))
            .alias("next")
            .render(&ctx, &mut bindings)
            .unwrap();
        assert_eq!(
            sql,
            "(1 + IFNULL((SELECT MAX(`id`) FROM `app_user` AS X WHERE `status` = :status0), 0)) AS `next`"
        );
    }

    #[test]
    fn test_invalid_column_is_rejected() {
        let tables = TableNames::new();
        let dialect = MySQLDialect::new();
        let ctx = RenderContext::new(&dialect, &tables);
        let mut bindings = Bindings::new();
        assert!(Sql::sum("price; DROP TABLE x")
            .render(&ctx, &mut bindings)
            .is_err());
    }
}
