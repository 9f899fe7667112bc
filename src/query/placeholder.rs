//! Named parameter bookkeeping
//!
//! Fragments are rendered with named placeholders (`:id0`). A `Statement`
//! is turned into the driver's positional form only at the very end, so
//! subqueries can be merged into a parent without renumbering.

use super::dialects::SqlDialect;
use super::value::Value;
use indexmap::IndexMap;

/// Ordered placeholder name to value map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: IndexMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value and return its placeholder (with the leading colon)
    ///
    /// The name is the lowercased base with quotes, dots, spaces, dashes and
    /// underscores removed, suffixed by the current binding count.
    pub fn bind(&mut self, base: &str, value: Value) -> String {
        let mut stem: String = base
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if stem.is_empty() || stem.starts_with(|c: char| c.is_ascii_digit()) {
            stem.insert(0, 'p');
        }

        let mut index = self.values.len();
        let mut name = format!("{}{}", stem, index);
        while self.values.contains_key(&name) {
            index += 1;
            name = format!("{}{}", stem, index);
        }

        self.values.insert(name.clone(), value);
        format!(":{}", name)
    }

    /// Insert under an exact name, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let name = name.trim_start_matches(':').to_string();
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name.trim_start_matches(':'))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name.trim_start_matches(':'))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn values(&self) -> Vec<Value> {
        self.values.values().cloned().collect()
    }

    /// Merge the bindings of a nested statement
    ///
    /// Colliding names are renamed inside `sql`; the rewritten text is
    /// returned so it can be embedded into the parent.
    pub fn absorb(&mut self, other: Bindings, sql: &str) -> String {
        let mut renames: IndexMap<String, String> = IndexMap::new();
        for (name, value) in other.values {
            if self.values.contains_key(&name) {
                let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
                let placeholder = self.bind(base, value);
                renames.insert(name, placeholder);
            } else {
                self.values.insert(name, value);
            }
        }

        if renames.is_empty() {
            return sql.to_string();
        }
        rewrite_placeholders(sql, |name| renames.get(name).cloned())
    }

    /// Drop values whose placeholder no longer appears in `sql`
    pub fn retain_used(&mut self, sql: &str) {
        let mut used = Vec::new();
        rewrite_placeholders(sql, |name| {
            used.push(name.to_string());
            None
        });
        self.values.retain(|name, _| used.iter().any(|u| u == name));
    }
}

impl IntoIterator for Bindings {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Rendered SQL with its named bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Bindings,
}

impl Statement {
    pub fn new(sql: impl Into<String>, bindings: Bindings) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }

    /// Statement without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Bindings::new())
    }

    /// Statement with a fixed list of values bound in order
    ///
    /// `sql` uses `:p0`, `:p1`, ... for the values.
    pub fn with_values(sql: impl Into<String>, values: Vec<Value>) -> Self {
        let mut bindings = Bindings::new();
        for (i, value) in values.into_iter().enumerate() {
            bindings.insert(format!("p{}", i), value);
        }
        Self::new(sql, bindings)
    }

    /// Convert named placeholders to the dialect's positional markers
    ///
    /// Values are emitted in the order their placeholders appear, so a name
    /// used twice is bound twice.
    pub fn to_positional(&self, dialect: &dyn SqlDialect) -> (String, Vec<Value>) {
        let mut params = Vec::with_capacity(self.bindings.len());
        let sql = rewrite_placeholders(&self.sql, |name| {
            let value = self.bindings.get(name)?;
            params.push(value.clone());
            Some(dialect.placeholder(params.len()))
        });
        (sql, params)
    }

    /// SQL with every bound value spliced in as a literal
    ///
    /// For logs and debugging only; never sent to the engine.
    pub fn interpolated(&self) -> String {
        rewrite_placeholders(&self.sql, |name| {
            self.bindings.get(name).map(Value::to_sql_literal)
        })
    }
}

/// Walk `sql` and offer every `:name` outside quotes to `replace`
///
/// Returning `None` keeps the placeholder as written. Quoted literals,
/// quoted identifiers and `::` casts are skipped.
pub fn rewrite_placeholders<F>(sql: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '[' => {
                quote = Some(']');
                out.push(c);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match replace(&name) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push(':');
                        out.push_str(&name);
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
