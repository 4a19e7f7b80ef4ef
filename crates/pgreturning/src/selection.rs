//! Resolving which columns a RETURNING statement fetches back.
//!
//! [`resolve_selection`] is a pure function of the entity metadata and the caller's
//! [`LoadDirective`]. The primary key is always part of the result: result identity
//! and patch-back both depend on it.

use crate::error::{OrmError, OrmResult};
use crate::meta::{ColumnDescriptor, EntityMeta};

/// Partial-load directive, the equivalent of `only(...)` / `defer(...)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadDirective {
    /// All storage-backed columns.
    #[default]
    All,
    /// Exactly these columns (plus the primary key).
    Only(Vec<String>),
    /// All storage-backed columns except these (the primary key is kept).
    Defer(Vec<String>),
}

impl LoadDirective {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn defer<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Defer(names.into_iter().map(Into::into).collect())
    }
}

/// Ordered set of columns fetched back by one statement, all owned by one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    owner: String,
    columns: Vec<ColumnDescriptor>,
}

impl FieldSelection {
    /// Build a selection, failing if the descriptors belong to more than one entity.
    pub fn new(columns: Vec<ColumnDescriptor>) -> OrmResult<Self> {
        let Some(first) = columns.first() else {
            return Err(OrmError::validation("Empty field selection"));
        };
        let owner = first.owner.clone();
        if let Some(other) = columns.iter().find(|c| c.owner != owner) {
            return Err(OrmError::CrossEntitySelection {
                expected: owner,
                found: other.owner.clone(),
            });
        }
        Ok(Self { owner, columns })
    }

    /// Name of the owning entity.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Attribute names, in selection order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Same attribute names in the same order.
    pub fn same_columns(&self, other: &FieldSelection) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name)
    }
}

/// Look up a directive name, following at most one `relation__column` hop.
fn lookup<'a>(entity: &'a EntityMeta, name: &str) -> OrmResult<&'a ColumnDescriptor> {
    match name.split_once("__") {
        Some((relation, rest)) => {
            let target = entity
                .related(relation)
                .ok_or_else(|| OrmError::unknown_column(entity.name(), name))?;
            lookup(target, rest)
        }
        None => entity
            .column(name)
            .ok_or_else(|| OrmError::unknown_column(entity.name(), name)),
    }
}

/// Compute the columns to fetch back for `entity` under `directive`.
///
/// Columns are returned in the entity's declaration order, so two directives naming
/// the same set yield equal selections.
pub fn resolve_selection(
    entity: &EntityMeta,
    directive: &LoadDirective,
) -> OrmResult<FieldSelection> {
    let named = match directive {
        LoadDirective::All => Vec::new(),
        LoadDirective::Only(names) | LoadDirective::Defer(names) => names
            .iter()
            .map(|n| lookup(entity, n))
            .collect::<OrmResult<Vec<_>>>()?,
    };

    if let Some(foreign) = named.iter().find(|c| c.owner != entity.name()) {
        return Err(OrmError::CrossEntitySelection {
            expected: entity.name().to_string(),
            found: foreign.owner.clone(),
        });
    }

    let is_named = |c: &ColumnDescriptor| named.iter().any(|n| n.name == c.name);

    let columns = match directive {
        LoadDirective::All => entity.concrete_columns().cloned().collect(),
        LoadDirective::Only(_) => {
            if let Some(relation) = named.iter().find(|c| c.is_relation) {
                return Err(OrmError::validation(format!(
                    "'{}' is a relation of '{}' and has no column to return",
                    relation.name,
                    entity.name()
                )));
            }
            entity
                .concrete_columns()
                .filter(|c| c.is_primary_key || is_named(c))
                .cloned()
                .collect()
        }
        LoadDirective::Defer(_) => entity
            .concrete_columns()
            .filter(|c| c.is_primary_key || !is_named(c))
            .cloned()
            .collect(),
    };

    FieldSelection::new(columns)
}
