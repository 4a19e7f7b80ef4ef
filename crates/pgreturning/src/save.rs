//! Saving single objects and copying the stored row back onto them.
//!
//! Each save runs in its own [`SaveContext`]:
//!
//! ```text
//! Idle -> ReturningRequested -> Updated | Inserted | NoOp -> Idle
//! ```
//!
//! The context lives for one call and is never shared between calls or objects.

use crate::assign::Assignment;
use crate::augment::{Augmented, augment};
use crate::compiler::{Compiled, MutationRequest};
use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::instance::Instance;
use crate::meta::EntityMeta;
use crate::result_set::ReturningResultSet;
use crate::selection::{FieldSelection, LoadDirective, resolve_selection};
use crate::value::Value;
use std::sync::Arc;

/// Options of a single save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Always INSERT.
    pub force_insert: bool,
    /// Always UPDATE; a missing row is a `NotFound` error.
    pub force_update: bool,
    /// Update (and fetch back) only these columns.
    pub update_fields: Option<Vec<String>>,
}

impl SaveOptions {
    pub fn insert() -> Self {
        Self {
            force_insert: true,
            ..Self::default()
        }
    }

    pub fn update() -> Self {
        Self {
            force_update: true,
            ..Self::default()
        }
    }

    pub fn update_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Position of a save in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    ReturningRequested,
    Updated,
    Inserted,
    NoOp,
}

/// What a save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated,
    Inserted,
    /// Nothing needed writing.
    NoOp,
}

/// Per-call save state.
#[derive(Debug)]
pub struct SaveContext {
    returning: bool,
    state: SaveState,
    history: Vec<SaveState>,
}

impl SaveContext {
    pub fn new(returning: bool) -> Self {
        Self {
            returning,
            state: SaveState::Idle,
            history: vec![SaveState::Idle],
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[SaveState] {
        &self.history
    }

    pub fn is_returning(&self) -> bool {
        self.returning
    }

    fn transition(&mut self, next: SaveState) {
        self.state = next;
        self.history.push(next);
    }

    fn finish(&mut self, outcome: SaveOutcome) -> SaveOutcome {
        self.transition(match outcome {
            SaveOutcome::Updated => SaveState::Updated,
            SaveOutcome::Inserted => SaveState::Inserted,
            SaveOutcome::NoOp => SaveState::NoOp,
        });
        self.transition(SaveState::Idle);
        outcome
    }

    fn reset(&mut self) {
        if self.state != SaveState::Idle {
            self.transition(SaveState::Idle);
        }
    }
}

/// Saves instances through an executor and patches them with the stored values.
#[derive(Debug)]
pub struct ObjectPatcher<'e, E> {
    executor: &'e E,
}

impl<'e, E: Executor> ObjectPatcher<'e, E> {
    pub fn new(executor: &'e E) -> Self {
        Self { executor }
    }

    /// Save `instance` and copy the columns the database stored back onto it.
    pub async fn save_returning(
        &self,
        instance: &mut Instance,
        options: SaveOptions,
    ) -> OrmResult<SaveOutcome> {
        let mut ctx = SaveContext::new(true);
        self.run(&mut ctx, instance, &options).await
    }

    /// Save `instance` without fetching columns back (only a generated primary key).
    pub async fn save(&self, instance: &mut Instance, options: SaveOptions) -> OrmResult<SaveOutcome> {
        let mut ctx = SaveContext::new(false);
        self.run(&mut ctx, instance, &options).await
    }

    /// Drive one save through `ctx`. The context is back at `Idle` when this returns,
    /// whether the save succeeded or failed.
    pub async fn run(
        &self,
        ctx: &mut SaveContext,
        instance: &mut Instance,
        options: &SaveOptions,
    ) -> OrmResult<SaveOutcome> {
        match self.drive(ctx, instance, options).await {
            Ok(outcome) => Ok(ctx.finish(outcome)),
            Err(err) => {
                ctx.reset();
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &mut SaveContext,
        instance: &mut Instance,
        options: &SaveOptions,
    ) -> OrmResult<SaveOutcome> {
        if options.force_insert && (options.force_update || options.update_fields.is_some()) {
            return Err(OrmError::invalid_arguments(
                "cannot force both insert and update in a save",
            ));
        }
        if ctx.returning {
            self.executor.capabilities().require_returning()?;
        }
        ctx.transition(SaveState::ReturningRequested);

        if let Some(fields) = &options.update_fields {
            if fields.is_empty() {
                return Ok(SaveOutcome::NoOp);
            }
            if instance.pk().is_none() {
                return Err(OrmError::validation(
                    "cannot restrict the columns of a save without a primary key",
                ));
            }
        }

        let entity = instance.entity().clone();
        let try_update = !options.force_insert
            && instance.pk().is_some()
            && (!instance.is_adding() || options.force_update || options.update_fields.is_some());

        if try_update {
            match self.update(ctx, instance, options, &entity).await? {
                Some(outcome) => return Ok(outcome),
                None if options.force_update || options.update_fields.is_some() => {
                    return Err(OrmError::not_found(format!(
                        "{} did not affect any rows",
                        entity.name()
                    )));
                }
                None => {}
            }
        }

        self.insert(ctx, instance, &entity).await?;
        Ok(SaveOutcome::Inserted)
    }

    fn assignments(
        instance: &Instance,
        options: &SaveOptions,
        entity: &EntityMeta,
    ) -> OrmResult<Vec<Assignment>> {
        let pk = entity.primary_key().name.as_str();
        match &options.update_fields {
            Some(fields) => fields
                .iter()
                .filter(|f| f.as_str() != pk)
                .map(|f| {
                    entity.concrete_column(f)?;
                    Ok(Assignment::set(f.as_str(), instance.get(f)?.clone()))
                })
                .collect(),
            None => Ok(instance
                .loaded()
                .filter(|(name, _)| *name != pk)
                .map(|(name, value)| Assignment::set(name, value.clone()))
                .collect()),
        }
    }

    async fn exists(&self, entity: &EntityMeta, pk: &Value) -> OrmResult<bool> {
        let stmt = self.executor.compiler().compile_exists(entity, pk)?;
        let rows = self.executor.fetch(&stmt.text, &stmt.params).await?;
        Ok(!rows.is_empty())
    }

    /// `Some(outcome)` if the row was handled, `None` if it does not exist.
    async fn update(
        &self,
        ctx: &SaveContext,
        instance: &mut Instance,
        options: &SaveOptions,
        entity: &Arc<EntityMeta>,
    ) -> OrmResult<Option<SaveOutcome>> {
        let pk = instance
            .pk()
            .cloned()
            .ok_or_else(|| OrmError::validation("update without a primary key"))?;
        let assignments = Self::assignments(instance, options, entity)?;

        if assignments.is_empty() {
            // Nothing to write: restricted saves succeed, primary-key-only rows must still exist.
            if options.update_fields.is_some() || self.exists(entity, &pk).await? {
                return Ok(Some(SaveOutcome::NoOp));
            }
            return Ok(None);
        }

        let check_first = entity.select_on_save() && !options.force_update;
        if check_first && !self.exists(entity, &pk).await? {
            return Ok(None);
        }

        let filter = Condition::eq(entity.primary_key().name.as_str(), pk.clone());
        let request = MutationRequest::update(entity.clone(), Some(filter), assignments);

        let updated = if ctx.returning {
            let directive = match &options.update_fields {
                Some(fields) => LoadDirective::Only(fields.clone()),
                None => LoadDirective::All,
            };
            let selection = resolve_selection(entity, &directive)?;
            let rows = self.run_returning(&request, &selection, entity).await?;
            match rows.first() {
                Some(row) => {
                    copy_loaded(row, instance, &selection)?;
                    true
                }
                None => false,
            }
        } else {
            match self.executor.compiler().compile(&request)? {
                Compiled::Statement(stmt) => {
                    self.executor.execute(&stmt.text, &stmt.params).await? > 0
                }
                Compiled::Empty => false,
            }
        };

        // A row found by the first check but not by the UPDATE is checked again: if it
        // is still there the save counts as done, if it vanished the save inserts.
        if !updated && check_first && !self.exists(entity, &pk).await? {
            return Ok(None);
        }
        if !updated && !check_first {
            return Ok(None);
        }
        Ok(Some(SaveOutcome::Updated))
    }

    async fn insert(
        &self,
        ctx: &SaveContext,
        instance: &mut Instance,
        entity: &Arc<EntityMeta>,
    ) -> OrmResult<()> {
        let (columns, row) = insert_row(instance);
        let request = MutationRequest::insert(entity.clone(), columns, vec![row]);

        let directive = if ctx.returning {
            LoadDirective::All
        } else {
            LoadDirective::only(Vec::<String>::new())
        };
        let selection = resolve_selection(entity, &directive)?;
        let rows = self.run_returning(&request, &selection, entity).await?;

        if let Some(row) = rows.first() {
            copy_loaded(row, instance, &selection)?;
            instance.mark_persisted();
        }
        Ok(())
    }

    async fn run_returning(
        &self,
        request: &MutationRequest,
        selection: &FieldSelection,
        entity: &Arc<EntityMeta>,
    ) -> OrmResult<ReturningResultSet> {
        match augment(self.executor.compiler(), request, selection)? {
            Augmented::Statement(stmt) => {
                ReturningResultSet::execute(self.executor, &stmt, entity.clone()).await
            }
            Augmented::Empty => Ok(ReturningResultSet::empty(
                entity.clone(),
                selection.clone(),
                self.executor.alias(),
            )),
        }
    }
}

/// All concrete columns of `instance`; unset ones (and a NULL primary key) as `DEFAULT`.
pub(crate) fn insert_row(instance: &Instance) -> (Vec<String>, Vec<Value>) {
    let entity = instance.entity();
    entity
        .concrete_columns()
        .map(|c| {
            let value = match instance.state(&c.name) {
                Ok(state) => match state.value() {
                    Some(Value::Null) if c.is_primary_key => Value::Default,
                    Some(v) => v.clone(),
                    None => Value::Default,
                },
                Err(_) => Value::Default,
            };
            (c.name.clone(), value)
        })
        .unzip()
}

fn copy_loaded(from: &Instance, to: &mut Instance, selection: &FieldSelection) -> OrmResult<()> {
    for column in selection.columns() {
        to.set(&column.name, from.get(&column.name)?.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
