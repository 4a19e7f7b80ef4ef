//! Runtime configuration for RETURNING operations.

/// Postgres refuses statements with more bind parameters than this.
pub const POSTGRES_MAX_BIND_PARAMS: usize = 65_535;

/// Configuration shared by the executors of one database connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturningConfig {
    /// Alias of the database the statements are written to, reported by result sets.
    pub write_alias: String,
    /// Rows per INSERT statement when the caller does not pass a batch size.
    /// `None` fills each statement up to `max_bind_params`.
    pub default_batch_size: Option<usize>,
    /// Upper bound on bind parameters per statement.
    pub max_bind_params: usize,
    /// Truncate SQL in log events (in bytes). `None` means no truncation.
    pub max_sql_log_length: Option<usize>,
}

impl Default for ReturningConfig {
    fn default() -> Self {
        Self {
            write_alias: "default".to_string(),
            default_batch_size: None,
            max_bind_params: POSTGRES_MAX_BIND_PARAMS,
            max_sql_log_length: Some(200),
        }
    }
}

impl ReturningConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database alias reported by result sets.
    pub fn write_alias(mut self, alias: impl Into<String>) -> Self {
        self.write_alias = alias.into();
        self
    }

    /// Set the default bulk insert batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.default_batch_size = Some(size);
        self
    }

    /// Lower the bind parameter ceiling (it never exceeds the server limit).
    pub fn max_bind_params(mut self, max: usize) -> Self {
        self.max_bind_params = max.clamp(1, POSTGRES_MAX_BIND_PARAMS);
        self
    }

    /// Set maximum SQL length in log events.
    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = Some(len);
        self
    }

    /// Disable SQL truncation in log events.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_log_length = None;
        self
    }

    /// Rows per INSERT for `columns` columns per row.
    ///
    /// An explicit `requested` size wins, then `default_batch_size`; both are capped so a
    /// statement never exceeds `max_bind_params`. Always at least 1.
    pub fn rows_per_batch(&self, requested: Option<usize>, columns: usize) -> usize {
        let cap = (self.max_bind_params / columns.max(1)).max(1);
        requested
            .or(self.default_batch_size)
            .filter(|&n| n > 0)
            .map_or(cap, |n| n.min(cap))
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_log_length {
            Some(max) if sql.len() > max => {
                let mut end = max;
                while end > 0 && !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end])
            }
            _ => sql.to_string(),
        }
    }
}
