//! Parameter-safe SQL text builder.
//!
//! `Sql` stores SQL pieces and [`Value`] parameters separately and generates
//! `$1, $2, ...` placeholders when rendered, so fragments can be composed without
//! tracking placeholder indices by hand.

use crate::ident::Ident;
use crate::value::Value;
use std::fmt::Write;

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A SQL-first, parameter-safe dynamic SQL builder.
#[derive(Debug, Clone, Default)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Value>,
}

impl Sql {
    /// Create a new builder with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
        }
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    ///
    /// [`Value::Default`] is emitted as the `DEFAULT` keyword instead of a parameter.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        match value.into() {
            Value::Default => self.push("DEFAULT"),
            value => {
                self.parts.push(SqlPart::Param);
                self.params.push(value);
                self
            }
        }
    }

    /// Append a validated identifier.
    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        let mut s = String::new();
        ident.write_sql(&mut s);
        self.push(&s)
    }

    /// Append another fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        self
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        let mut idx: usize = 0;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    let _ = write!(&mut out, "${idx}");
                }
            }
        }
        out
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Render and hand over the bound parameters.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        let text = self.to_sql();
        (text, self.params)
    }
}
