//! Field, table and ordering specifications
//!
//! Builder methods take plain strings such as `"U.name AS n"`,
//! `"users U"` or `"created_at DESC"`. Anything that does not match the
//! identifier grammar is rejected; raw SQL must go through `Value::Sql`,
//! `Condition::raw` or the `Sql` helpers.

use super::dialects::SqlDialect;
use super::tables::TableNames;
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

const IDENT: &str = r#"`[A-Za-z0-9_]+`|"[A-Za-z0-9_]+"|\[[A-Za-z0-9_]+\]|[A-Za-z0-9_]+"#;

#[allow(clippy::expect_used)]
static FIELD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?:(?P<table>{i})\.)?(?P<column>{i}|\*)(?:\s+(?:(?i:AS)\s+)?(?P<alias>{i}))?$",
        i = IDENT
    ))
    .expect("field grammar is a valid regex")
});

#[allow(clippy::expect_used)]
static TABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<table>(?:(?:{i})\.)?(?:{i}))(?:\s+(?:(?i:AS)\s+)?(?P<alias>{i}))?$",
        i = IDENT
    ))
    .expect("table grammar is a valid regex")
});

#[allow(clippy::expect_used)]
static SHORT_ALIAS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][0-9]{0,2}$").expect("alias pattern is a valid regex"));

fn unquote(identifier: &str) -> String {
    identifier
        .trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'))
        .to_string()
}

/// Single-letter aliases (`U`, `Q1`) stay bare in the rendered SQL
pub fn is_short_alias(alias: &str) -> bool {
    SHORT_ALIAS.is_match(alias)
}

/// Render an alias the way it will appear after `AS` or before `.`
pub fn render_alias(dialect: &dyn SqlDialect, alias: &str) -> String {
    if is_short_alias(alias) {
        alias.to_string()
    } else {
        dialect.quote_identifier(alias)
    }
}

/// Parsed `[table.]column [AS alias]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldName {
    pub table: Option<String>,
    pub column: String,
    pub alias: Option<String>,
}

impl FieldName {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let captures = FIELD_REGEX.captures(trimmed).ok_or_else(|| {
            Error::invalid_condition(format!(
                "'{}' is not a field name; wrap raw SQL in Sql::raw",
                input
            ))
        })?;

        Ok(Self {
            table: captures.name("table").map(|m| unquote(m.as_str())),
            column: captures
                .name("column")
                .map(|m| unquote(m.as_str()))
                .unwrap_or_default(),
            alias: captures.name("alias").map(|m| unquote(m.as_str())),
        })
    }

    pub fn column(name: impl Into<String>) -> Self {
        Self {
            table: None,
            column: name.into(),
            alias: None,
        }
    }

    pub fn qualified(table: Option<String>, column: impl Into<String>) -> Self {
        Self {
            table,
            column: column.into(),
            alias: None,
        }
    }

    /// Text used to derive placeholder names
    pub fn binding_base(&self) -> String {
        match &self.table {
            Some(table) => format!("{}{}", table, self.column),
            None => self.column.clone(),
        }
    }

    /// Quoted reference without the alias
    pub fn render_reference(&self, dialect: &dyn SqlDialect) -> String {
        let column = if self.column == "*" {
            "*".to_string()
        } else {
            dialect.quote_identifier(&self.column)
        };
        match &self.table {
            Some(table) => format!("{}.{}", render_alias(dialect, table), column),
            None => column,
        }
    }

    /// Quoted reference followed by `AS alias` when aliased
    pub fn render(&self, dialect: &dyn SqlDialect) -> String {
        let reference = self.render_reference(dialect);
        match &self.alias {
            Some(alias) => format!("{} AS {}", reference, dialect.quote_identifier(alias)),
            None => reference,
        }
    }
}

/// Parsed `table [AS alias]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let captures = TABLE_REGEX.captures(trimmed).ok_or_else(|| {
            Error::invalid_condition(format!("'{}' is not a table name", input))
        })?;

        let name = captures
            .name("table")
            .map(|m| {
                m.as_str()
                    .split('.')
                    .map(unquote)
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            alias: captures.name("alias").map(|m| unquote(m.as_str())),
        })
    }

    pub fn render(&self, dialect: &dyn SqlDialect, tables: &TableNames) -> String {
        let table = tables.qualified(dialect, &self.name);
        match &self.alias {
            Some(alias) => format!("{} AS {}", table, render_alias(dialect, alias)),
            None => table,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Split a trailing ASC/DESC off an order specification
pub fn split_direction(input: &str) -> (&str, Option<Direction>) {
    let trimmed = input.trim();
    if let Some((head, tail)) = trimmed.rsplit_once(char::is_whitespace) {
        if tail.eq_ignore_ascii_case("ASC") {
            return (head.trim_end(), Some(Direction::Asc));
        }
        if tail.eq_ignore_ascii_case("DESC") {
            return (head.trim_end(), Some(Direction::Desc));
        }
    }
    (trimmed, None)
}
