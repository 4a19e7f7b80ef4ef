//! Error types for pgreturning

use thiserror::Error;

/// Result type alias for pgreturning operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for RETURNING operations.
///
/// Variants fall into three groups:
/// - database errors (`Connection`, `Query`, constraint violations),
/// - precondition errors raised before any statement runs (`EmptyAssignment`,
///   `SlicedQuery`, `ProjectedQuery`, `CrossEntitySelection`, `InvalidArguments`, ...),
/// - result errors raised while reading or reconciling fetched rows.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// `update_returning` was called without any assignment.
    #[error("No updates were provided")]
    EmptyAssignment,

    /// The query was row-limited (LIMIT/OFFSET) before the mutation.
    #[error("Cannot update or delete once a slice has been taken")]
    SlicedQuery,

    /// The query was projected (`values()` / `values_list()`) before the mutation.
    #[error("Cannot update or delete after a values projection")]
    ProjectedQuery,

    /// Load directives reference columns of more than one entity.
    #[error("Cannot fetch columns of related entity '{found}' with a RETURNING statement on '{expected}'")]
    CrossEntitySelection { expected: String, found: String },

    /// Column is not known, or was not fetched by the statement.
    #[error("Unknown column '{column}' on '{entity}'")]
    UnknownColumn { entity: String, column: String },

    /// Column exists but was never fetched for this instance.
    #[error("Column '{column}' of '{entity}' was not loaded")]
    Deferred { entity: String, column: String },

    /// Positional access past the end of a result set.
    #[error("Index {index} out of range for result set of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    /// Malformed call arguments (e.g. `flat` together with `named`).
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Result sets fetched different columns and cannot be concatenated.
    #[error("Result sets with different fields can't be concatenated: {left:?} vs {right:?}")]
    IncompatibleSelections {
        left: Vec<String>,
        right: Vec<String>,
    },

    /// Rows returned by a bulk insert could not be matched to its inputs.
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// A bulk insert batch failed after earlier batches were written.
    ///
    /// `completed` holds the objects of every finished batch, already patched.
    /// `pending` holds the inputs of the failed batch and of every batch after it,
    /// unpatched. Rows of the failed batch may have been written if the failure came
    /// after the statement ran.
    #[error("Bulk insert stopped after {} objects: {source}", .completed.objects.len())]
    BulkInsert {
        completed: Box<crate::reconcile::Reconciled>,
        pending: Vec<crate::instance::Instance>,
        source: Box<OrmError>,
    },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unknown column error
    pub fn unknown_column(entity: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            entity: entity.into(),
            column: column.into(),
        }
    }

    /// Create a reconciliation error
    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation(message.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Mutation issued against a query shape that RETURNING cannot reconstruct.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, Self::SlicedQuery | Self::ProjectedQuery)
    }

    /// Programmer error detected before any statement was sent.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::EmptyAssignment
                | Self::SlicedQuery
                | Self::ProjectedQuery
                | Self::CrossEntitySelection { .. }
                | Self::InvalidArguments(_)
        )
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
