//! Statement execution.
//!
//! An [`Executor`] runs one statement at a time and hands rows back as plain
//! [`Value`] vectors. It also carries the per-connection context every operation
//! needs: the write alias, the negotiated [`Capabilities`], the [`ReturningConfig`]
//! and the [`StatementCompiler`].

use crate::capability::Capabilities;
use crate::client::GenericClient;
use crate::compiler::{PgCompiler, StatementCompiler};
use crate::config::ReturningConfig;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::future::Future;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Runs compiled statements.
pub trait Executor: Send + Sync {
    fn config(&self) -> &ReturningConfig;

    fn capabilities(&self) -> Capabilities;

    /// Alias of the database written to.
    fn alias(&self) -> &str {
        &self.config().write_alias
    }

    fn compiler(&self) -> &dyn StatementCompiler {
        &PgCompiler
    }

    /// Run a statement and return its rows, one `Value` per column.
    fn fetch(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Vec<Value>>>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> impl Future<Output = OrmResult<u64>> + Send;
}

/// [`Executor`] over a borrowed [`GenericClient`] (connection, pooled client or transaction).
///
/// ```ignore
/// let tx = client.transaction().await?;
/// let exec = PgExecutor::new(&tx);
/// let rows = query.delete_returning(&exec).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug)]
pub struct PgExecutor<'a, C> {
    client: &'a C,
    capabilities: Capabilities,
    config: ReturningConfig,
}

impl<'a, C: GenericClient> PgExecutor<'a, C> {
    /// Executor assuming a current Postgres server.
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            capabilities: Capabilities::postgres(),
            config: ReturningConfig::default(),
        }
    }

    /// Executor with capabilities negotiated from the server version.
    pub async fn connect(client: &'a C) -> OrmResult<Self> {
        let capabilities = Capabilities::detect(client).await?;
        Ok(Self {
            capabilities,
            ..Self::new(client)
        })
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_config(mut self, config: ReturningConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    fn log(&self, sql: &str, param_count: usize, rows: u64) {
        tracing::debug!(
            target: "pgreturning.sql",
            db = %self.config.write_alias,
            param_count,
            rows,
            sql = %self.config.truncate_sql(sql),
        );
    }
}

fn bind_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_row(row: &Row) -> OrmResult<Vec<Value>> {
    (0..row.len())
        .map(|i| {
            row.try_get::<_, Value>(i)
                .map_err(|e| OrmError::decode(row.columns()[i].name(), e.to_string()))
        })
        .collect()
}

impl<C: GenericClient> Executor for PgExecutor<'_, C> {
    fn config(&self) -> &ReturningConfig {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn fetch(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Vec<Value>>> {
        let rows = self.client.query(sql, &bind_refs(params)).await?;
        self.log(sql, params.len(), rows.len() as u64);
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let affected = self.client.execute(sql, &bind_refs(params)).await?;
        self.log(sql, params.len(), affected);
        Ok(affected)
    }
}
