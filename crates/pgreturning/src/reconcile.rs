//! Matching rows returned by a bulk INSERT back onto the caller's objects.
//!
//! Postgres assigns sequence values to a multi-row `VALUES` list in list order and
//! RETURNING echoes them, so every input can be identified by primary key: inputs
//! that carried a key keep it, inputs without one take the generated keys in return
//! order. Each returned row is then copied onto the input with the same key, which
//! picks up values rewritten by defaults and triggers.
//!
//! Without key echo there is nothing to match on. The rows are handed back in
//! engine order with [`ReconcileMode::Unordered`].

use crate::capability::Capabilities;
use crate::error::{OrmError, OrmResult};
use crate::instance::Instance;
use crate::result_set::ReturningResultSet;
use crate::value::Key;
use std::collections::{HashMap, HashSet};

/// How returned rows relate to the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Every input was matched by primary key and patched; objects are in input order.
    Matched,
    /// Objects are the returned rows in engine order; they may not line up with inputs.
    Unordered,
}

/// Bulk insert outcome.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub objects: Vec<Instance>,
    pub mode: ReconcileMode,
}

impl Reconciled {
    pub fn is_matched(&self) -> bool {
        self.mode == ReconcileMode::Matched
    }

    /// Append another batch.
    pub(crate) fn extend(&mut self, other: Reconciled) {
        self.objects.extend(other.objects);
        if other.mode == ReconcileMode::Unordered {
            self.mode = ReconcileMode::Unordered;
        }
    }
}

/// Returned rows of one batch keyed by primary key. Lives for one batch only.
#[derive(Debug)]
pub struct InsertReconciliationMap<'a> {
    by_key: HashMap<Key, &'a Instance>,
}

impl<'a> InsertReconciliationMap<'a> {
    pub fn build(returned: &'a ReturningResultSet) -> OrmResult<Self> {
        let mut by_key = HashMap::with_capacity(returned.len());
        for row in returned {
            let key = row_key(row)?;
            if by_key.insert(key.clone(), row).is_some() {
                return Err(OrmError::reconciliation(format!(
                    "primary key {key} returned twice"
                )));
            }
        }
        Ok(Self { by_key })
    }

    /// Remove and return the row for `key`. A key is matched at most once.
    pub fn take(&mut self, key: &Key) -> Option<&'a Instance> {
        self.by_key.remove(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn row_key(row: &Instance) -> OrmResult<Key> {
    row.pk()
        .and_then(|v| v.as_key())
        .ok_or_else(|| OrmError::reconciliation("returned row has no usable primary key"))
}

fn input_key(input: &Instance) -> OrmResult<Option<Key>> {
    match input.pk() {
        None => Ok(None),
        Some(v) => v.as_key().map(Some).ok_or_else(|| {
            OrmError::reconciliation(format!("primary key {v:?} cannot identify a row"))
        }),
    }
}

/// Patch `inputs` with the rows of one batch.
pub fn reconcile(
    inputs: Vec<Instance>,
    returned: &ReturningResultSet,
    capabilities: Capabilities,
) -> OrmResult<Reconciled> {
    if !capabilities.echoes_generated_keys {
        tracing::warn!(
            target: "pgreturning.sql",
            entity = returned.entity().name(),
            rows = returned.len(),
            "server does not echo generated keys, bulk insert results are unordered"
        );
        return Ok(Reconciled {
            objects: returned.iter().cloned().collect(),
            mode: ReconcileMode::Unordered,
        });
    }

    if inputs.len() != returned.len() {
        return Err(OrmError::reconciliation(format!(
            "{} objects inserted but {} rows returned",
            inputs.len(),
            returned.len()
        )));
    }

    let explicit = inputs
        .iter()
        .map(input_key)
        .collect::<OrmResult<Vec<_>>>()?;
    let supplied: HashSet<&Key> = explicit.iter().flatten().collect();

    let mut generated = Vec::new();
    for row in returned {
        let key = row_key(row)?;
        if !supplied.contains(&key) {
            generated.push(key);
        }
    }
    let missing = explicit.iter().filter(|k| k.is_none()).count();
    if generated.len() != missing {
        return Err(OrmError::reconciliation(format!(
            "{missing} objects without a primary key but {} generated keys returned",
            generated.len()
        )));
    }

    let mut generated = generated.into_iter();
    let keys: Vec<Key> = explicit
        .into_iter()
        .map(|k| k.or_else(|| generated.next()))
        .collect::<Option<_>>()
        .ok_or_else(|| OrmError::reconciliation("ran out of generated keys"))?;

    // Match the whole batch before patching anything.
    let mut map = InsertReconciliationMap::build(returned)?;
    let matched = keys
        .iter()
        .map(|key| {
            map.take(key).ok_or_else(|| {
                OrmError::reconciliation(format!("no returned row for primary key {key}"))
            })
        })
        .collect::<OrmResult<Vec<_>>>()?;

    let columns = returned.fields();
    let mut objects = inputs;
    for (object, row) in objects.iter_mut().zip(matched) {
        for column in &columns {
            object.set(column, row.get(column)?.clone())?;
        }
        object.mark_persisted();
    }

    Ok(Reconciled {
        objects,
        mode: ReconcileMode::Matched,
    })
}
