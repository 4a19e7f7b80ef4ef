//! In-memory domain objects.
//!
//! An [`Instance`] holds one value slot per concrete column of its entity. A slot is
//! either [`FieldState::Loaded`] or [`FieldState::Deferred`]; a deferred slot was never
//! fetched and is distinct from a loaded NULL. Reading a deferred slot is an error and
//! never triggers a query.

use crate::error::{OrmError, OrmResult};
use crate::meta::EntityMeta;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Load state of one column on an [`Instance`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    Loaded(Value),
    Deferred,
}

impl FieldState {
    pub fn is_deferred(&self) -> bool {
        matches!(self, FieldState::Deferred)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldState::Loaded(v) => Some(v),
            FieldState::Deferred => None,
        }
    }
}

/// A domain object of one entity type.
#[derive(Debug, Clone)]
pub struct Instance {
    entity: Arc<EntityMeta>,
    fields: Vec<FieldState>,
    adding: bool,
}

impl Instance {
    /// A new, not yet persisted object. Every column starts deferred.
    pub fn new(entity: Arc<EntityMeta>) -> Self {
        let fields = vec![FieldState::Deferred; entity.concrete_columns().count()];
        Self {
            entity,
            fields,
            adding: true,
        }
    }

    /// A new object with the given columns set.
    pub fn with_values<I, K, V>(entity: Arc<EntityMeta>, values: I) -> OrmResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut instance = Self::new(entity);
        for (k, v) in values {
            instance.set(k.as_ref(), v)?;
        }
        Ok(instance)
    }

    /// Materialize a persisted row: `columns` are loaded from `values`, the rest deferred.
    pub(crate) fn from_row(
        entity: Arc<EntityMeta>,
        columns: &[String],
        values: Vec<Value>,
    ) -> OrmResult<Self> {
        if columns.len() != values.len() {
            return Err(OrmError::decode(
                entity.name(),
                format!("expected {} columns, got {}", columns.len(), values.len()),
            ));
        }
        let mut instance = Self::new(entity);
        instance.adding = false;
        for (column, value) in columns.iter().zip(values) {
            instance.set(column, value)?;
        }
        Ok(instance)
    }

    pub fn entity(&self) -> &Arc<EntityMeta> {
        &self.entity
    }

    /// `true` until the object has been inserted or loaded from the database.
    pub fn is_adding(&self) -> bool {
        self.adding
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.adding = false;
    }

    fn position(&self, column: &str) -> OrmResult<usize> {
        self.entity
            .concrete_position(column)
            .ok_or_else(|| OrmError::unknown_column(self.entity.name(), column))
    }

    /// Load state of `column`.
    pub fn state(&self, column: &str) -> OrmResult<&FieldState> {
        let idx = self.position(column)?;
        Ok(&self.fields[idx])
    }

    /// Loaded value of `column`; `Deferred` error if it was never fetched.
    pub fn get(&self, column: &str) -> OrmResult<&Value> {
        self.state(column)?.value().ok_or_else(|| OrmError::Deferred {
            entity: self.entity.name().to_string(),
            column: column.to_string(),
        })
    }

    /// Set `column`, marking it loaded.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> OrmResult<()> {
        let idx = self.position(column)?;
        self.fields[idx] = FieldState::Loaded(value.into());
        Ok(())
    }

    pub fn is_deferred(&self, column: &str) -> bool {
        self.state(column).map(FieldState::is_deferred).unwrap_or(false)
    }

    /// Names of the columns never fetched for this object.
    pub fn deferred_fields(&self) -> Vec<&str> {
        self.entity
            .concrete_columns()
            .zip(&self.fields)
            .filter(|(_, s)| s.is_deferred())
            .map(|(c, _)| c.name.as_str())
            .collect()
    }

    /// Loaded `(column, value)` pairs in column order.
    pub fn loaded(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entity
            .concrete_columns()
            .zip(&self.fields)
            .filter_map(|(c, s)| s.value().map(|v| (c.name.as_str(), v)))
    }

    /// Primary key value, if loaded and not NULL.
    pub fn pk(&self) -> Option<&Value> {
        self.get(&self.entity.primary_key().name)
            .ok()
            .filter(|v| !v.is_null())
    }

    /// Loaded columns as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .loaded()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Decode the loaded columns into `T`.
    ///
    /// Deferred columns are absent from the input, so `T` should model them as
    /// `Option` or `#[serde(default)]`.
    pub fn decode<T: DeserializeOwned>(&self) -> OrmResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| OrmError::decode(self.entity.name(), e.to_string()))
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entity, &other.entity)
            && self.fields == other.fields
            && self.adding == other.adding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn meta() -> Arc<EntityMeta> {
        EntityMeta::builder("TestModel", "tests_testmodel")
            .primary_key("id")
            .column("name")
            .column("int_field")
            .build()
            .unwrap()
    }

    #[test]
    fn new_instance_is_fully_deferred() {
        let i = Instance::new(meta());
        assert!(i.is_adding());
        assert_eq!(i.deferred_fields(), ["id", "name", "int_field"]);
        assert!(i.pk().is_none());
    }

    #[test]
    fn deferred_is_not_null() {
        let mut i = Instance::new(meta());
        i.set("name", Value::Null).unwrap();
        assert_eq!(i.get("name").unwrap(), &Value::Null);
        assert!(matches!(i.get("int_field"), Err(OrmError::Deferred { .. })));
        assert!(matches!(i.get("nope"), Err(OrmError::UnknownColumn { .. })));
    }

    #[test]
    fn from_row_loads_only_given_columns() {
        let i = Instance::from_row(
            meta(),
            &["id".to_string(), "int_field".to_string()],
            vec![Value::Int(3), Value::Int(21)],
        )
        .unwrap();
        assert!(!i.is_adding());
        assert_eq!(i.pk(), Some(&Value::Int(3)));
        assert_eq!(i.deferred_fields(), ["name"]);
    }

    #[test]
    fn from_row_rejects_width_mismatch() {
        let err = Instance::from_row(meta(), &["id".to_string()], vec![]).unwrap_err();
        assert!(matches!(err, OrmError::Decode { .. }));
    }

    #[test]
    fn decode_into_struct() {
        #[derive(Deserialize)]
        struct Row {
            id: i64,
            name: Option<String>,
        }

        let i = Instance::with_values(meta(), [("id", Value::Int(2)), ("name", "test2".into())])
            .unwrap();
        let row: Row = i.decode().unwrap();
        assert_eq!(row.id, 2);
        assert_eq!(row.name.as_deref(), Some("test2"));
    }
}
