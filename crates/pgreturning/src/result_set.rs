//! Materialized results of RETURNING statements.
//!
//! A [`ReturningResultSet`] is filled by exactly one statement and never goes back
//! to the database: counting, indexing, projections and concatenation all read the
//! cached rows.
//!
//! ```ignore
//! let rows = query.filter(Condition::gt("id", 2)).update_returning(&exec, [("name", "x")]).await?;
//! assert_eq!(rows.count(), 3);
//! let ids = rows.values_list(&["id"], ValuesListOptions::flat())?;
//! ```

use crate::augment::AugmentedStatement;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::instance::Instance;
use crate::meta::EntityMeta;
use crate::selection::FieldSelection;
use crate::value::Value;
use std::ops::{Add, Bound, Index, RangeBounds};
use std::sync::Arc;

/// A named tuple: one returned row projected onto some columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of `column`, if projected.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

/// Shape of [`ReturningResultSet::values_list`] output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValuesListOptions {
    /// One bare value per row. Requires exactly one column.
    pub flat: bool,
    /// One [`Record`] per row.
    pub named: bool,
}

impl ValuesListOptions {
    pub fn flat() -> Self {
        Self {
            flat: true,
            named: false,
        }
    }

    pub fn named() -> Self {
        Self {
            flat: false,
            named: true,
        }
    }
}

/// Output of [`ReturningResultSet::values_list`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValuesList {
    Tuples(Vec<Vec<Value>>),
    Flat(Vec<Value>),
    Named(Vec<Record>),
}

impl ValuesList {
    pub fn len(&self) -> usize {
        match self {
            ValuesList::Tuples(v) => v.len(),
            ValuesList::Flat(v) => v.len(),
            ValuesList::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows returned by one UPDATE/DELETE/INSERT ... RETURNING statement.
#[derive(Debug, Clone)]
pub struct ReturningResultSet {
    entity: Arc<EntityMeta>,
    selection: FieldSelection,
    rows: Vec<Instance>,
    db: String,
}

impl ReturningResultSet {
    /// Run `statement` once and materialize its rows.
    pub async fn execute<E: Executor>(
        executor: &E,
        statement: &AugmentedStatement,
        entity: Arc<EntityMeta>,
    ) -> OrmResult<Self> {
        if statement.returning.owner() != entity.name() {
            return Err(OrmError::CrossEntitySelection {
                expected: entity.name().to_string(),
                found: statement.returning.owner().to_string(),
            });
        }
        let raw = executor.fetch(&statement.text, &statement.params).await?;
        let names = statement.returning.names();
        let rows = raw
            .into_iter()
            .map(|values| Instance::from_row(entity.clone(), &names, values))
            .collect::<OrmResult<Vec<_>>>()?;

        Ok(Self {
            entity,
            selection: statement.returning.clone(),
            rows,
            db: executor.alias().to_string(),
        })
    }

    /// A result set for a statement that was never sent.
    pub fn empty(entity: Arc<EntityMeta>, selection: FieldSelection, db: impl Into<String>) -> Self {
        Self {
            entity,
            selection,
            rows: Vec::new(),
            db: db.into(),
        }
    }

    /// Number of rows. Never queries.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> OrmResult<&Instance> {
        self.rows.get(index).ok_or(OrmError::IndexOutOfRange {
            index,
            len: self.rows.len(),
        })
    }

    /// Rows in `range`, clamped to the result length.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let len = self.rows.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .clamp(start, len);

        Self {
            rows: self.rows[start..end].to_vec(),
            ..self.shell()
        }
    }

    fn shell(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            selection: self.selection.clone(),
            rows: Vec::new(),
            db: self.db.clone(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.rows.iter()
    }

    pub fn first(&self) -> Option<&Instance> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&Instance> {
        self.rows.last()
    }

    fn resolve_columns(&self, columns: &[&str]) -> OrmResult<Arc<[String]>> {
        if columns.is_empty() {
            return Ok(self.selection.names().into());
        }
        columns
            .iter()
            .map(|&c| {
                if self.selection.contains(c) {
                    Ok(c.to_string())
                } else {
                    Err(OrmError::unknown_column(self.entity.name(), c))
                }
            })
            .collect::<OrmResult<Vec<_>>>()
            .map(Into::into)
    }

    fn project(&self, columns: &Arc<[String]>) -> OrmResult<Vec<Vec<Value>>> {
        self.rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned())
                    .collect::<OrmResult<Vec<_>>>()
            })
            .collect()
    }

    /// Rows as records. An empty `columns` means every returned column.
    pub fn values(&self, columns: &[&str]) -> OrmResult<Vec<Record>> {
        let columns = self.resolve_columns(columns)?;
        Ok(self
            .project(&columns)?
            .into_iter()
            .map(|values| Record {
                columns: columns.clone(),
                values,
            })
            .collect())
    }

    /// Rows as tuples, bare values or records.
    pub fn values_list(
        &self,
        columns: &[&str],
        options: ValuesListOptions,
    ) -> OrmResult<ValuesList> {
        if columns.is_empty() {
            return Err(OrmError::invalid_arguments(
                "values_list() requires at least one column",
            ));
        }
        if options.flat && options.named {
            return Err(OrmError::invalid_arguments(
                "'flat' and 'named' can't be used together",
            ));
        }
        if options.flat && columns.len() > 1 {
            return Err(OrmError::invalid_arguments(
                "'flat' is not valid when values_list is called with more than one field",
            ));
        }

        if options.named {
            return Ok(ValuesList::Named(self.values(columns)?));
        }
        let columns = self.resolve_columns(columns)?;
        let tuples = self.project(&columns)?;
        if options.flat {
            Ok(ValuesList::Flat(
                tuples.into_iter().flat_map(|t| t.into_iter().next()).collect(),
            ))
        } else {
            Ok(ValuesList::Tuples(tuples))
        }
    }

    /// Rows of `self` followed by rows of `other`. Both must have fetched the same columns.
    pub fn concat(&self, other: &ReturningResultSet) -> OrmResult<Self> {
        if self.entity.name() != other.entity.name()
            || !self.selection.same_columns(&other.selection)
        {
            return Err(OrmError::IncompatibleSelections {
                left: self.selection.names(),
                right: other.selection.names(),
            });
        }
        let mut rows = Vec::with_capacity(self.len() + other.len());
        rows.extend_from_slice(&self.rows);
        rows.extend_from_slice(&other.rows);
        Ok(Self {
            rows,
            ..self.shell()
        })
    }

    /// Alias of the database the statement ran against.
    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn entity(&self) -> &Arc<EntityMeta> {
        &self.entity
    }

    pub fn selection(&self) -> &FieldSelection {
        &self.selection
    }

    /// Names of the returned columns.
    pub fn fields(&self) -> Vec<String> {
        self.selection.names()
    }

    pub fn into_vec(self) -> Vec<Instance> {
        self.rows
    }
}

impl Index<usize> for ReturningResultSet {
    type Output = Instance;

    fn index(&self, index: usize) -> &Instance {
        &self.rows[index]
    }
}

impl Add for &ReturningResultSet {
    type Output = OrmResult<ReturningResultSet>;

    fn add(self, other: &ReturningResultSet) -> Self::Output {
        self.concat(other)
    }
}

impl<'a> IntoIterator for &'a ReturningResultSet {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for ReturningResultSet {
    type Item = Instance;
    type IntoIter = std::vec::IntoIter<Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests;
