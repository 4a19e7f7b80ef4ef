//! # pgreturning
//!
//! UPDATE, DELETE and INSERT with `RETURNING` for Postgres, materialized into
//! in-memory objects in a single round trip.
//!
//! ## Features
//!
//! - **One round trip**: the affected rows come back with the mutation itself
//! - **Partial loads**: `only` / `defer` decide which columns are fetched back; the
//!   primary key always is
//! - **Cached results**: a [`ReturningResultSet`] never re-queries
//! - **Bulk insert reconciliation**: stored values (defaults, trigger rewrites) are
//!   copied back onto the caller's objects by primary key
//! - **Save-returning**: single-object saves that reload what the database stored
//! - **Transaction-friendly**: pass a transaction anywhere a `GenericClient` is expected
//!
//! ## Example
//!
//! ```ignore
//! use pgreturning::{Assignment, Condition, EntityMeta, EntityQuery, PgExecutor};
//!
//! let test_model = EntityMeta::builder("TestModel", "tests_testmodel")
//!     .primary_key("id")
//!     .column("name")
//!     .column("int_field")
//!     .build()?;
//!
//! let exec = PgExecutor::new(&client);
//!
//! // UPDATE ... RETURNING
//! let updated = EntityQuery::new(test_model.clone())
//!     .filter(Condition::gt("id", 2))
//!     .update_returning(&exec, [("name", "updated")])
//!     .await?;
//!
//! // DELETE ... RETURNING
//! let deleted = EntityQuery::new(test_model.clone())
//!     .filter(Condition::in_list("id", [3, 4, 5]))
//!     .delete_returning(&exec)
//!     .await?;
//!
//! // INSERT ... RETURNING, matched back onto the inputs
//! let created = EntityQuery::new(test_model.clone())
//!     .bulk_create_returning(&exec, objects, None)
//!     .await?;
//! ```

pub mod assign;
pub mod augment;
pub mod capability;
pub mod client;
pub mod compiler;
pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
pub mod ident;
pub mod instance;
pub mod meta;
pub mod query;
pub mod reconcile;
pub mod result_set;
pub mod save;
pub mod selection;
pub mod sql;
pub mod value;

pub use assign::{Assignment, SetExpr};
pub use augment::{Augmented, AugmentedStatement, augment};
pub use capability::Capabilities;
pub use client::GenericClient;
pub use compiler::{
    Compiled, CompiledStatement, MutationKind, MutationRequest, PgCompiler, QueryClauses,
    StatementCompiler,
};
pub use condition::{Condition, Op};
pub use config::ReturningConfig;
pub use error::{OrmError, OrmResult};
pub use executor::{Executor, PgExecutor};
pub use ident::Ident;
pub use instance::{FieldState, Instance};
pub use meta::{ColumnDescriptor, EntityMeta, EntityMetaBuilder};
pub use query::{EntityQuery, Returning};
pub use reconcile::{InsertReconciliationMap, ReconcileMode, Reconciled, reconcile};
pub use result_set::{Record, ReturningResultSet, ValuesList, ValuesListOptions};
pub use save::{ObjectPatcher, SaveContext, SaveOptions, SaveOutcome, SaveState};
pub use selection::{FieldSelection, LoadDirective, resolve_selection};
pub use sql::Sql;
pub use value::{Key, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
