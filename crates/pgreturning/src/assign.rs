//! SET clause assignments for UPDATE statements.
//!
//! # Example
//! ```ignore
//! use pgreturning::Assignment;
//!
//! // SET "name" = $1
//! Assignment::set("name", "updated");
//!
//! // SET "int_field" = "id" + $1
//! Assignment::add("int_field", "id", 2);
//!
//! // SET "updated_at" = NOW()
//! Assignment::raw("updated_at", "NOW()");
//! ```

use crate::error::OrmResult;
use crate::ident::Ident;
use crate::meta::EntityMeta;
use crate::sql::Sql;
use crate::value::Value;

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// `col = $n` (parameterized value)
    Value(Value),
    /// `col = other_col`
    Column(String),
    /// `col = other_col + $n`
    Add { column: String, amount: Value },
    /// Raw SQL expression (escape hatch). Bypasses injection protection.
    Raw(String),
}

/// One `column = expression` pair of a SET clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub expr: SetExpr,
}

impl Assignment {
    /// Assign a parameterized value.
    pub fn set(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            expr: SetExpr::Value(value.into()),
        }
    }

    /// Copy another column of the same row.
    pub fn copy(column: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            expr: SetExpr::Column(from.into()),
        }
    }

    /// Assign `from + amount`, evaluated by the database.
    pub fn add(
        column: impl Into<String>,
        from: impl Into<String>,
        amount: impl Into<Value>,
    ) -> Self {
        Self {
            column: column.into(),
            expr: SetExpr::Add {
                column: from.into(),
                amount: amount.into(),
            },
        }
    }

    /// Assign a raw SQL expression.
    pub fn raw(column: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            expr: SetExpr::Raw(expr.into()),
        }
    }

    pub(crate) fn append_to_sql(&self, entity: &EntityMeta, sql: &mut Sql) -> OrmResult<()> {
        let target = column_ident(entity, &self.column)?;
        sql.push_ident(&target).push(" = ");
        match &self.expr {
            SetExpr::Value(v) => {
                sql.push_bind(v.clone());
            }
            SetExpr::Column(other) => {
                sql.push_ident(&column_ident(entity, other)?);
            }
            SetExpr::Add { column, amount } => {
                sql.push_ident(&column_ident(entity, column)?).push(" + ");
                sql.push_bind(amount.clone());
            }
            SetExpr::Raw(expr) => {
                sql.push(expr);
            }
        }
        Ok(())
    }
}

fn column_ident(entity: &EntityMeta, name: &str) -> OrmResult<Ident> {
    Ident::column(&entity.concrete_column(name)?.storage_key)
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for Assignment {
    fn from((column, value): (K, V)) -> Self {
        Assignment::set(column, value)
    }
}
