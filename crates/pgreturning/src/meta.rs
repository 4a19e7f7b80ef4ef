//! Entity metadata: the table, columns and identity of a domain type.
//!
//! An [`EntityMeta`] is built once per entity type and shared behind an [`Arc`];
//! every [`Instance`](crate::Instance) and result set keeps a handle to it.
//!
//! ```ignore
//! use pgreturning::EntityMeta;
//!
//! let author = EntityMeta::builder("Author", "app_author")
//!     .primary_key("id")
//!     .column("name")
//!     .build()?;
//!
//! let book = EntityMeta::builder("Book", "app_book")
//!     .primary_key("id")
//!     .column("title")
//!     .foreign_key("author_id", "author_id")
//!     .relation("author", author.clone())
//!     .build()?;
//! ```

use crate::error::{OrmError, OrmResult};
use std::collections::HashSet;
use std::sync::Arc;

/// One fetchable unit of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Attribute name, used on instances and in `values()` output.
    pub name: String,
    /// Column name in the table.
    pub storage_key: String,
    /// Name of the entity owning this column.
    pub owner: String,
    /// Relation descriptors have no column on the owner's table.
    pub is_relation: bool,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Whether this descriptor is backed by a column of the owner's table.
    pub fn is_concrete(&self) -> bool {
        !self.is_relation
    }
}

/// Table metadata for one entity type.
#[derive(Debug)]
pub struct EntityMeta {
    name: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    related: Vec<(String, Arc<EntityMeta>)>,
    select_on_save: bool,
}

impl EntityMeta {
    /// Start building metadata for `name`, stored in `table`.
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> EntityMetaBuilder {
        EntityMetaBuilder {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            related: Vec::new(),
            select_on_save: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All descriptors, relations included, in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Storage-backed descriptors in declaration order.
    pub fn concrete_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_concrete())
    }

    /// Descriptor by attribute name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Concrete descriptor by attribute name, or `UnknownColumn`.
    pub fn concrete_column(&self, name: &str) -> OrmResult<&ColumnDescriptor> {
        self.concrete_columns()
            .find(|c| c.name == name)
            .ok_or_else(|| OrmError::unknown_column(&self.name, name))
    }

    /// Position of a concrete column among [`EntityMeta::concrete_columns`].
    pub(crate) fn concrete_position(&self, name: &str) -> Option<usize> {
        self.concrete_columns().position(|c| c.name == name)
    }

    /// The primary-key descriptor.
    pub fn primary_key(&self) -> &ColumnDescriptor {
        // The builder refuses metadata without exactly one primary key.
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .unwrap_or(&self.columns[0])
    }

    /// Metadata of the entity reached through relation `name`.
    pub fn related(&self, name: &str) -> Option<&Arc<EntityMeta>> {
        self.related.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// Saves must verify the row exists before issuing an UPDATE.
    pub fn select_on_save(&self) -> bool {
        self.select_on_save
    }
}

/// Builder for [`EntityMeta`].
#[derive(Debug)]
pub struct EntityMetaBuilder {
    name: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    related: Vec<(String, Arc<EntityMeta>)>,
    select_on_save: bool,
}

impl EntityMetaBuilder {
    fn push(mut self, name: &str, storage_key: &str, is_relation: bool, is_pk: bool) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.to_string(),
            storage_key: storage_key.to_string(),
            owner: self.name.clone(),
            is_relation,
            is_primary_key: is_pk,
        });
        self
    }

    /// Declare the primary-key column.
    pub fn primary_key(self, name: &str) -> Self {
        self.push(name, name, false, true)
    }

    /// Declare a column stored under the same name.
    pub fn column(self, name: &str) -> Self {
        self.push(name, name, false, false)
    }

    /// Declare a column whose storage key differs from its attribute name.
    pub fn column_as(self, name: &str, storage_key: &str) -> Self {
        self.push(name, storage_key, false, false)
    }

    /// Declare a foreign key; it is a concrete column on this table.
    pub fn foreign_key(self, name: &str, storage_key: &str) -> Self {
        self.column_as(name, storage_key)
    }

    /// Declare a relation to another entity. Relations have no backing column.
    pub fn relation(mut self, name: &str, target: Arc<EntityMeta>) -> Self {
        self.related.push((name.to_string(), target));
        self.push(name, "", true, false)
    }

    /// Require an existence check before saves issue an UPDATE.
    pub fn select_on_save(mut self, enabled: bool) -> Self {
        self.select_on_save = enabled;
        self
    }

    pub fn build(self) -> OrmResult<Arc<EntityMeta>> {
        let pk_count = self.columns.iter().filter(|c| c.is_primary_key).count();
        if pk_count != 1 {
            return Err(OrmError::validation(format!(
                "Entity '{}' must declare exactly one primary key, found {pk_count}",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.as_str()) {
                return Err(OrmError::validation(format!(
                    "Entity '{}' declares '{}' twice",
                    self.name, c.name
                )));
            }
            if c.is_concrete() && c.storage_key.is_empty() {
                return Err(OrmError::validation(format!(
                    "Column '{}' of '{}' has an empty storage key",
                    c.name, self.name
                )));
            }
            if c.name.contains("__") {
                return Err(OrmError::validation(format!(
                    "Column name '{}' may not contain '__'",
                    c.name
                )));
            }
        }

        crate::ident::Ident::parse(&self.table)?;

        Ok(Arc::new(EntityMeta {
            name: self.name,
            table: self.table,
            columns: self.columns,
            related: self.related,
            select_on_save: self.select_on_save,
        }))
    }
}
