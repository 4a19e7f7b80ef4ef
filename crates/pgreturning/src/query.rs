//! Entity queries and their RETURNING operations.
//!
//! [`EntityQuery`] collects what the caller narrowed the query to: a filter, a
//! partial-load directive, and read-only clauses (ordering, locking, eager joins,
//! annotations, slicing, projection). The mutating operations are implemented by the
//! [`Returning`] component the query holds, so they can be reused by anything that
//! can describe a [`MutationRequest`].
//!
//! # Example
//!
//! ```ignore
//! use pgreturning::{Assignment, Condition, EntityQuery, PgExecutor};
//!
//! let exec = PgExecutor::new(&client);
//! let rows = EntityQuery::new(test_model.clone())
//!     .filter(Condition::gt("id", 2))
//!     .only(["int_field"])
//!     .update_returning(&exec, [Assignment::add("int_field", "id", 2)])
//!     .await?;
//!
//! for row in &rows {
//!     println!("{:?}", row.get("int_field")?);
//! }
//! ```

use crate::assign::Assignment;
use crate::augment::{Augmented, augment};
use crate::compiler::{MutationRequest, QueryClauses};
use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::instance::Instance;
use crate::meta::EntityMeta;
use crate::reconcile::{ReconcileMode, Reconciled, reconcile};
use crate::result_set::ReturningResultSet;
use crate::save::{ObjectPatcher, SaveOptions, SaveOutcome, insert_row};
use crate::selection::{FieldSelection, LoadDirective, resolve_selection};
use crate::value::Value;
use std::sync::Arc;

/// The RETURNING operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Returning;

impl Returning {
    /// Augment `request` and run it once. Structurally empty requests run nothing.
    pub async fn run<E: Executor>(
        &self,
        executor: &E,
        request: &MutationRequest,
        selection: &FieldSelection,
    ) -> OrmResult<ReturningResultSet> {
        executor.capabilities().require_returning()?;
        match augment(executor.compiler(), request, selection)? {
            Augmented::Statement(stmt) => {
                ReturningResultSet::execute(executor, &stmt, request.entity.clone()).await
            }
            Augmented::Empty => Ok(ReturningResultSet::empty(
                request.entity.clone(),
                selection.clone(),
                executor.alias(),
            )),
        }
    }

    pub async fn update<E: Executor>(
        &self,
        executor: &E,
        request: MutationRequest,
        directive: &LoadDirective,
    ) -> OrmResult<ReturningResultSet> {
        let selection = resolve_selection(&request.entity, directive)?;
        self.run(executor, &request, &selection).await
    }

    pub async fn delete<E: Executor>(
        &self,
        executor: &E,
        request: MutationRequest,
        directive: &LoadDirective,
    ) -> OrmResult<ReturningResultSet> {
        let selection = resolve_selection(&request.entity, directive)?;
        self.run(executor, &request, &selection).await
    }

    /// Insert one object with `fields` set and return it with every stored column.
    pub async fn create<E, I, K, V>(
        &self,
        executor: &E,
        entity: Arc<EntityMeta>,
        fields: I,
    ) -> OrmResult<Instance>
    where
        E: Executor,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut instance = Instance::with_values(entity, fields)?;
        self.save(executor, &mut instance, SaveOptions::insert())
            .await?;
        Ok(instance)
    }

    /// Insert `objects` in batches and patch them with the stored rows.
    ///
    /// When a batch fails after earlier ones succeeded, the error is
    /// [`OrmError::BulkInsert`], carrying the finished objects and the unsaved inputs.
    pub async fn bulk_create<E: Executor>(
        &self,
        executor: &E,
        entity: &Arc<EntityMeta>,
        objects: Vec<Instance>,
        batch_size: Option<usize>,
        directive: &LoadDirective,
    ) -> OrmResult<Reconciled> {
        executor.capabilities().require_returning()?;
        if let Some(other) = objects.iter().find(|o| o.entity().name() != entity.name()) {
            return Err(OrmError::validation(format!(
                "cannot insert '{}' objects into '{}'",
                other.entity().name(),
                entity.name()
            )));
        }

        let selection = resolve_selection(entity, directive)?;
        let width = entity.concrete_columns().count();
        let per_batch = executor.config().rows_per_batch(batch_size, width);

        let mut result = Reconciled {
            objects: Vec::with_capacity(objects.len()),
            mode: ReconcileMode::Matched,
        };
        let mut finished_batches = 0usize;
        let mut remaining = objects.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<Instance> = remaining.by_ref().take(per_batch).collect();
            match self.insert_batch(executor, entity, &batch, &selection).await {
                Ok(done) => {
                    result.extend(done);
                    finished_batches += 1;
                }
                Err(err) if finished_batches == 0 => return Err(err),
                Err(err) => {
                    let mut pending = batch;
                    pending.extend(remaining);
                    return Err(OrmError::BulkInsert {
                        completed: Box::new(result),
                        pending,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(result)
    }

    async fn insert_batch<E: Executor>(
        &self,
        executor: &E,
        entity: &Arc<EntityMeta>,
        batch: &[Instance],
        selection: &FieldSelection,
    ) -> OrmResult<Reconciled> {
        let mut columns = Vec::new();
        let rows = batch
            .iter()
            .map(|o| {
                let (names, values) = insert_row(o);
                columns = names;
                values
            })
            .collect();

        let request = MutationRequest::insert(entity.clone(), columns, rows);
        let returned = self.run(executor, &request, selection).await?;
        reconcile(batch.to_vec(), &returned, executor.capabilities())
    }

    pub async fn save<E: Executor>(
        &self,
        executor: &E,
        instance: &mut Instance,
        options: SaveOptions,
    ) -> OrmResult<SaveOutcome> {
        ObjectPatcher::new(executor)
            .save_returning(instance, options)
            .await
    }
}

/// A query over one entity, narrowed by filters and load directives.
#[derive(Debug, Clone)]
pub struct EntityQuery {
    entity: Arc<EntityMeta>,
    filter: Option<Condition>,
    load: LoadDirective,
    clauses: QueryClauses,
    returning: Returning,
}

impl EntityQuery {
    pub fn new(entity: Arc<EntityMeta>) -> Self {
        Self {
            entity,
            filter: None,
            load: LoadDirective::All,
            clauses: QueryClauses::default(),
            returning: Returning,
        }
    }

    pub fn entity(&self) -> &Arc<EntityMeta> {
        &self.entity
    }

    /// Narrow the query. Repeated filters are combined with AND.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Condition::and(vec![existing, condition]),
            None => condition,
        });
        self
    }

    /// Load only these columns (plus the primary key).
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load = LoadDirective::only(names);
        self
    }

    /// Skip these columns. Repeated calls accumulate.
    pub fn defer<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deferred = match std::mem::take(&mut self.load) {
            LoadDirective::Defer(existing) => existing,
            _ => Vec::new(),
        };
        deferred.extend(names.into_iter().map(Into::into));
        self.load = LoadDirective::Defer(deferred);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.clauses.ordering.push(column.into());
        self
    }

    pub fn select_for_update(mut self) -> Self {
        self.clauses.lock = Some("FOR UPDATE".to_string());
        self
    }

    pub fn select_related(mut self, relation: impl Into<String>) -> Self {
        self.clauses.joins.push(relation.into());
        self
    }

    pub fn annotate(mut self, alias: impl Into<String>, expr: impl Into<String>) -> Self {
        self.clauses.annotations.push((alias.into(), expr.into()));
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.clauses.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.clauses.offset = Some(n);
        self
    }

    /// Mark the query as a `values()` projection. Projected queries cannot mutate.
    pub fn values(mut self) -> Self {
        self.clauses.projected = true;
        self
    }

    pub fn load_directive(&self) -> &LoadDirective {
        &self.load
    }

    pub fn clauses(&self) -> &QueryClauses {
        &self.clauses
    }

    /// Columns a RETURNING statement on this query fetches back.
    pub fn selection(&self) -> OrmResult<FieldSelection> {
        resolve_selection(&self.entity, &self.load)
    }

    /// UPDATE the matched rows and return them.
    pub async fn update_returning<E, I, A>(
        &self,
        executor: &E,
        assignments: I,
    ) -> OrmResult<ReturningResultSet>
    where
        E: Executor,
        I: IntoIterator<Item = A>,
        A: Into<Assignment>,
    {
        let assignments: Vec<Assignment> = assignments.into_iter().map(Into::into).collect();
        if assignments.is_empty() {
            return Err(OrmError::EmptyAssignment);
        }
        let request =
            MutationRequest::update(self.entity.clone(), self.filter.clone(), assignments)
                .with_clauses(self.clauses.clone());
        self.returning.update(executor, request, &self.load).await
    }

    /// DELETE the matched rows and return them.
    pub async fn delete_returning<E: Executor>(
        &self,
        executor: &E,
    ) -> OrmResult<ReturningResultSet> {
        let request = MutationRequest::delete(self.entity.clone(), self.filter.clone())
            .with_clauses(self.clauses.clone());
        self.returning.delete(executor, request, &self.load).await
    }

    /// INSERT one object and return it with every stored column.
    pub async fn create_returning<E, I, K, V>(&self, executor: &E, fields: I) -> OrmResult<Instance>
    where
        E: Executor,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.returning
            .create(executor, self.entity.clone(), fields)
            .await
    }

    /// INSERT `objects` and patch each with its stored row.
    pub async fn bulk_create_returning<E: Executor>(
        &self,
        executor: &E,
        objects: Vec<Instance>,
        batch_size: Option<usize>,
    ) -> OrmResult<Reconciled> {
        self.returning
            .bulk_create(executor, &self.entity, objects, batch_size, &self.load)
            .await
    }

    /// Save `instance`, copying the stored columns back onto it.
    pub async fn save_returning<E: Executor>(
        &self,
        executor: &E,
        instance: &mut Instance,
        options: SaveOptions,
    ) -> OrmResult<SaveOutcome> {
        self.returning.save(executor, instance, options).await
    }
}
