//! Filter predicates for UPDATE/DELETE statements.
//!
//! Conditions name columns by attribute name; the compiler resolves them to quoted
//! storage keys of the target entity. A condition can be *structurally empty*
//! ([`Condition::matches_nothing`]): provably matching no row, e.g. `id IN ()`.
//! Such filters are never sent to the database.

use crate::error::OrmResult;
use crate::ident::Ident;
use crate::meta::EntityMeta;
use crate::sql::Sql;
use crate::value::Value;

/// Query operator for building conditions.
///
/// # Example
/// ```ignore
/// use pgreturning::{Condition, Op};
///
/// Condition::new("id", Op::In(vec![3.into(), 4.into(), 5.into()]));
/// Condition::new("name", Op::Ilike("%test%".into()));
/// Condition::new("int_field", Op::IsNull);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal: column = value
    Eq(Value),
    /// Not equal: column != value
    Ne(Value),
    /// Greater than: column > value
    Gt(Value),
    /// Greater than or equal: column >= value
    Gte(Value),
    /// Less than: column < value
    Lt(Value),
    /// Less than or equal: column <= value
    Lte(Value),
    /// LIKE pattern match
    Like(Value),
    /// Case-insensitive LIKE (PostgreSQL ILIKE)
    Ilike(Value),
    /// NOT LIKE pattern match
    NotLike(Value),
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
    /// IN (list)
    In(Vec<Value>),
    /// NOT IN (list)
    NotIn(Vec<Value>),
    /// BETWEEN a AND b
    Between(Value, Value),
}

impl Op {
    fn operator(&self) -> &'static str {
        match self {
            Op::Eq(_) => "=",
            Op::Ne(_) => "!=",
            Op::Gt(_) => ">",
            Op::Gte(_) => ">=",
            Op::Lt(_) => "<",
            Op::Lte(_) => "<=",
            Op::Like(_) => "LIKE",
            Op::Ilike(_) => "ILIKE",
            Op::NotLike(_) => "NOT LIKE",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
            Op::In(_) => "IN",
            Op::NotIn(_) => "NOT IN",
            Op::Between(..) => "BETWEEN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ConditionInner {
    /// Raw SQL condition (escape hatch, not checked).
    Raw(String),
    Expr { column: String, op: Op },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// Provably matches no row.
    Nothing,
}

/// A filter predicate over one entity's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition(ConditionInner);

impl Condition {
    /// Create a structured condition from a column name and operator.
    pub fn new(column: impl Into<String>, op: Op) -> Self {
        Condition(ConditionInner::Expr {
            column: column.into(),
            op,
        })
    }

    /// Create a raw SQL condition.
    ///
    /// # Safety
    /// Be careful with SQL injection when using raw conditions.
    pub fn raw(sql: impl Into<String>) -> Self {
        Condition(ConditionInner::Raw(sql.into()))
    }

    /// A condition that provably matches nothing.
    pub fn nothing() -> Self {
        Condition(ConditionInner::Nothing)
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Condition(ConditionInner::And(conditions))
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Condition(ConditionInner::Or(conditions))
    }

    pub fn negate(condition: Condition) -> Self {
        Condition(ConditionInner::Not(Box::new(condition)))
    }

    // ==================== Convenience constructors ====================

    /// column = value
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Eq(value.into()))
    }

    /// column != value
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Ne(value.into()))
    }

    /// column > value
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Gt(value.into()))
    }

    /// column >= value
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Gte(value.into()))
    }

    /// column < value
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Lt(value.into()))
    }

    /// column <= value
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Lte(value.into()))
    }

    /// column IN (values...)
    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(column, Op::In(values.into_iter().map(Into::into).collect()))
    }

    /// column NOT IN (values...)
    pub fn not_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(column, Op::NotIn(values.into_iter().map(Into::into).collect()))
    }

    /// column IS NULL
    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, Op::IsNull)
    }

    /// Whether the predicate provably matches no row, without consulting the database.
    pub fn matches_nothing(&self) -> bool {
        match &self.0 {
            ConditionInner::Nothing => true,
            ConditionInner::Expr { op: Op::In(vals), .. } => vals.is_empty(),
            ConditionInner::And(cs) => cs.iter().any(Condition::matches_nothing),
            ConditionInner::Or(cs) => cs.iter().all(Condition::matches_nothing),
            ConditionInner::Raw(_) | ConditionInner::Expr { .. } | ConditionInner::Not(_) => {
                false
            }
        }
    }

    /// Append this condition, resolving column names against `entity`.
    pub fn append_to_sql(&self, entity: &EntityMeta, sql: &mut Sql) -> OrmResult<()> {
        match &self.0 {
            ConditionInner::Raw(s) => {
                sql.push(s);
            }
            ConditionInner::Nothing => {
                sql.push("FALSE");
            }
            ConditionInner::Not(inner) => {
                sql.push("NOT (");
                inner.append_to_sql(entity, sql)?;
                sql.push(")");
            }
            ConditionInner::And(cs) | ConditionInner::Or(cs) if cs.is_empty() => {
                let is_and = matches!(self.0, ConditionInner::And(_));
                sql.push(if is_and { "TRUE" } else { "FALSE" });
            }
            ConditionInner::And(cs) | ConditionInner::Or(cs) => {
                let joiner = if matches!(self.0, ConditionInner::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                sql.push("(");
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        sql.push(joiner);
                    }
                    c.append_to_sql(entity, sql)?;
                }
                sql.push(")");
            }
            ConditionInner::Expr { column, op } => {
                let descriptor = entity.concrete_column(column)?;
                let ident = Ident::column(&descriptor.storage_key)?;
                match op {
                    Op::In(vals) | Op::NotIn(vals) if vals.is_empty() => {
                        sql.push(if matches!(op, Op::In(_)) { "FALSE" } else { "TRUE" });
                    }
                    Op::In(vals) | Op::NotIn(vals) => {
                        sql.push_ident(&ident).push(" ").push(op.operator()).push(" (");
                        for (i, v) in vals.iter().enumerate() {
                            if i > 0 {
                                sql.push(", ");
                            }
                            sql.push_bind(v.clone());
                        }
                        sql.push(")");
                    }
                    Op::IsNull | Op::IsNotNull => {
                        sql.push_ident(&ident).push(" ").push(op.operator());
                    }
                    Op::Between(a, b) => {
                        sql.push_ident(&ident).push(" BETWEEN ");
                        sql.push_bind(a.clone()).push(" AND ").push_bind(b.clone());
                    }
                    Op::Eq(v)
                    | Op::Ne(v)
                    | Op::Gt(v)
                    | Op::Gte(v)
                    | Op::Lt(v)
                    | Op::Lte(v)
                    | Op::Like(v)
                    | Op::Ilike(v)
                    | Op::NotLike(v) => {
                        sql.push_ident(&ident).push(" ").push(op.operator()).push(" ");
                        sql.push_bind(v.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrmError;
    use std::sync::Arc;

    fn meta() -> Arc<EntityMeta> {
        EntityMeta::builder("TestModel", "tests_testmodel")
            .primary_key("id")
            .column_as("name", "name_col")
            .build()
            .unwrap()
    }

    fn render(c: &Condition) -> (String, Vec<Value>) {
        let mut sql = Sql::new("");
        c.append_to_sql(&meta(), &mut sql).unwrap();
        sql.into_parts()
    }

    #[test]
    fn resolves_storage_keys() {
        let (text, params) = render(&Condition::eq("name", "x"));
        assert_eq!(text, r#""name_col" = $1"#);
        assert_eq!(params, vec![Value::Text("x".into())]);
    }

    #[test]
    fn range_filter() {
        let c = Condition::and(vec![Condition::gt("id", 2), Condition::lte("id", 5)]);
        let (text, _) = render(&c);
        assert_eq!(text, r#"("id" > $1 AND "id" <= $2)"#);
    }

    #[test]
    fn in_list() {
        let (text, params) = render(&Condition::in_list("id", [3, 4, 5]));
        assert_eq!(text, r#""id" IN ($1, $2, $3)"#);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn structural_emptiness() {
        assert!(Condition::in_list("id", Vec::<i32>::new()).matches_nothing());
        assert!(Condition::nothing().matches_nothing());
        assert!(
            Condition::and(vec![Condition::eq("id", 1), Condition::nothing()]).matches_nothing()
        );
        assert!(Condition::or(vec![]).matches_nothing());
        assert!(
            !Condition::or(vec![Condition::eq("id", 1), Condition::nothing()]).matches_nothing()
        );
        assert!(!Condition::not_in("id", Vec::<i32>::new()).matches_nothing());
        assert!(!Condition::negate(Condition::nothing()).matches_nothing());
    }

    #[test]
    fn empty_lists_inside_or_render_as_constants() {
        let c = Condition::or(vec![
            Condition::in_list("id", Vec::<i32>::new()),
            Condition::not_in("id", Vec::<i32>::new()),
        ]);
        assert_eq!(render(&c).0, "(FALSE OR TRUE)");
    }

    #[test]
    fn unknown_column_is_an_error() {
        let mut sql = Sql::new("");
        let err = Condition::eq("missing", 1)
            .append_to_sql(&meta(), &mut sql)
            .unwrap_err();
        assert!(matches!(err, OrmError::UnknownColumn { .. }));
    }
}
