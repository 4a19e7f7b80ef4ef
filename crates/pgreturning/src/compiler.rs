//! Mutation requests and their compilation to Postgres SQL.
//!
//! A [`MutationRequest`] is the statement-level description of an UPDATE, DELETE or
//! multi-row INSERT against one entity. A [`StatementCompiler`] turns it into SQL text
//! plus bind parameters, or reports [`Compiled::Empty`] when the request provably
//! affects no row and must not be sent at all.

use crate::assign::Assignment;
use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::meta::EntityMeta;
use crate::sql::Sql;
use crate::value::Value;
use std::sync::Arc;

/// Statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Update,
    Delete,
    Insert,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
            MutationKind::Insert => "insert",
        }
    }
}

/// Query-level state carried over from the caller's query.
///
/// Ordering, locking, eager joins and annotations only make sense for reads. The
/// augmenter strips them; a compiler rejects requests that still carry them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryClauses {
    pub ordering: Vec<String>,
    pub lock: Option<String>,
    pub joins: Vec<String>,
    pub annotations: Vec<(String, String)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// The query was turned into a `values()` projection.
    pub projected: bool,
}

impl QueryClauses {
    pub fn is_sliced(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Whether any read-only clause (ordering, lock, joins, annotations) is set.
    pub fn has_read_clauses(&self) -> bool {
        !self.ordering.is_empty()
            || self.lock.is_some()
            || !self.joins.is_empty()
            || !self.annotations.is_empty()
    }

    /// Drop ordering, locking, eager joins and annotations.
    pub fn strip_read_clauses(&mut self) {
        self.ordering.clear();
        self.lock = None;
        self.joins.clear();
        self.annotations.clear();
    }
}

/// One row-mutating statement against one entity.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub kind: MutationKind,
    pub entity: Arc<EntityMeta>,
    /// `None` matches every row.
    pub filter: Option<Condition>,
    pub assignments: Vec<Assignment>,
    /// Attribute names of the inserted columns.
    pub insert_columns: Vec<String>,
    /// One value per insert column for every row. `Value::Default` renders `DEFAULT`.
    pub input_rows: Vec<Vec<Value>>,
    pub clauses: QueryClauses,
}

impl MutationRequest {
    fn base(kind: MutationKind, entity: Arc<EntityMeta>) -> Self {
        Self {
            kind,
            entity,
            filter: None,
            assignments: Vec::new(),
            insert_columns: Vec::new(),
            input_rows: Vec::new(),
            clauses: QueryClauses::default(),
        }
    }

    pub fn update(
        entity: Arc<EntityMeta>,
        filter: Option<Condition>,
        assignments: Vec<Assignment>,
    ) -> Self {
        Self {
            filter,
            assignments,
            ..Self::base(MutationKind::Update, entity)
        }
    }

    pub fn delete(entity: Arc<EntityMeta>, filter: Option<Condition>) -> Self {
        Self {
            filter,
            ..Self::base(MutationKind::Delete, entity)
        }
    }

    pub fn insert(entity: Arc<EntityMeta>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            insert_columns: columns,
            input_rows: rows,
            ..Self::base(MutationKind::Insert, entity)
        }
    }

    pub fn with_clauses(mut self, clauses: QueryClauses) -> Self {
        self.clauses = clauses;
        self
    }
}

/// Compiled SQL text with its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub text: String,
    pub params: Vec<Value>,
}

impl From<Sql> for CompiledStatement {
    fn from(sql: Sql) -> Self {
        let (text, params) = sql.into_parts();
        Self { text, params }
    }
}

/// Compilation outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Statement(CompiledStatement),
    /// The request provably affects no row; nothing must be executed.
    Empty,
}

/// Turns mutation requests into SQL.
pub trait StatementCompiler: Send + Sync {
    fn compile(&self, request: &MutationRequest) -> OrmResult<Compiled>;

    /// `SELECT 1` existence check for the row with primary key `pk`.
    fn compile_exists(&self, entity: &EntityMeta, pk: &Value) -> OrmResult<CompiledStatement>;
}

/// The Postgres compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgCompiler;

impl PgCompiler {
    fn check_clauses(request: &MutationRequest) -> OrmResult<()> {
        if request.clauses.is_sliced() {
            return Err(OrmError::SlicedQuery);
        }
        if request.clauses.has_read_clauses() {
            return Err(OrmError::validation(format!(
                "{} on '{}' carries ordering, locking, joins or annotations",
                request.kind.as_str(),
                request.entity.name()
            )));
        }
        Ok(())
    }

    fn push_where(request: &MutationRequest, sql: &mut Sql) -> OrmResult<()> {
        if let Some(filter) = &request.filter {
            sql.push(" WHERE ");
            filter.append_to_sql(&request.entity, sql)?;
        }
        Ok(())
    }

    fn compile_update(request: &MutationRequest, table: &Ident) -> OrmResult<Sql> {
        if request.assignments.is_empty() {
            return Err(OrmError::EmptyAssignment);
        }
        let mut sql = Sql::new("UPDATE ");
        sql.push_ident(table).push(" SET ");
        for (i, a) in request.assignments.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            a.append_to_sql(&request.entity, &mut sql)?;
        }
        Self::push_where(request, &mut sql)?;
        Ok(sql)
    }

    fn compile_delete(request: &MutationRequest, table: &Ident) -> OrmResult<Sql> {
        let mut sql = Sql::new("DELETE FROM ");
        sql.push_ident(table);
        Self::push_where(request, &mut sql)?;
        Ok(sql)
    }

    fn compile_insert(request: &MutationRequest, table: &Ident) -> OrmResult<Sql> {
        let entity = &request.entity;

        // Multi-row `DEFAULT VALUES` does not exist; fall back to a defaulted primary key.
        let (columns, rows): (Vec<&str>, Vec<Vec<Value>>) = if request.insert_columns.is_empty()
        {
            (
                vec![entity.primary_key().name.as_str()],
                vec![vec![Value::Default]; request.input_rows.len()],
            )
        } else {
            (
                request.insert_columns.iter().map(String::as_str).collect(),
                request.input_rows.clone(),
            )
        };

        let mut sql = Sql::new("INSERT INTO ");
        sql.push_ident(table).push(" (");
        for (i, name) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            let column = entity.concrete_column(name)?;
            sql.push_ident(&Ident::column(&column.storage_key)?);
        }
        sql.push(") VALUES ");

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(OrmError::validation(format!(
                    "insert row {i} has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            if i > 0 {
                sql.push(", ");
            }
            sql.push("(");
            for (j, value) in row.into_iter().enumerate() {
                if j > 0 {
                    sql.push(", ");
                }
                sql.push_bind(value);
            }
            sql.push(")");
        }
        Ok(sql)
    }
}

impl StatementCompiler for PgCompiler {
    fn compile(&self, request: &MutationRequest) -> OrmResult<Compiled> {
        Self::check_clauses(request)?;
        let table = Ident::parse(request.entity.table())?;

        let sql = match request.kind {
            MutationKind::Update | MutationKind::Delete
                if request
                    .filter
                    .as_ref()
                    .is_some_and(Condition::matches_nothing) =>
            {
                if request.kind == MutationKind::Update && request.assignments.is_empty() {
                    return Err(OrmError::EmptyAssignment);
                }
                return Ok(Compiled::Empty);
            }
            MutationKind::Insert if request.input_rows.is_empty() => return Ok(Compiled::Empty),
            MutationKind::Update => Self::compile_update(request, &table)?,
            MutationKind::Delete => Self::compile_delete(request, &table)?,
            MutationKind::Insert => Self::compile_insert(request, &table)?,
        };
        Ok(Compiled::Statement(sql.into()))
    }

    fn compile_exists(&self, entity: &EntityMeta, pk: &Value) -> OrmResult<CompiledStatement> {
        let table = Ident::parse(entity.table())?;
        let key = Ident::column(&entity.primary_key().storage_key)?;
        let mut sql = Sql::new("SELECT 1 FROM ");
        sql.push_ident(&table)
            .push(" WHERE ")
            .push_ident(&key)
            .push(" = ")
            .push_bind(pk.clone())
            .push(" LIMIT 1");
        Ok(sql.into())
    }
}
