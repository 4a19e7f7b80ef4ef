//! Server capabilities relevant to RETURNING, negotiated once per connection.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};

/// `server_version_num` of the first release accepting `RETURNING` on INSERT/UPDATE/DELETE.
pub const RETURNING_MIN_VERSION: i32 = 80_200;

/// What the connected server can do for RETURNING statements.
///
/// Code paths branch on these flags, never on raw version numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// INSERT ... RETURNING reports the engine-generated primary keys.
    pub echoes_generated_keys: bool,
    /// UPDATE/DELETE/INSERT accept a RETURNING clause.
    pub supports_returning: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::postgres()
    }
}

impl Capabilities {
    /// Every supported Postgres release.
    pub const fn postgres() -> Self {
        Self {
            echoes_generated_keys: true,
            supports_returning: true,
        }
    }

    /// RETURNING works but generated keys are not reported, so bulk insert results
    /// can only be handed back in engine order.
    pub const fn without_key_echo() -> Self {
        Self {
            echoes_generated_keys: false,
            supports_returning: true,
        }
    }

    /// Derive capabilities from `server_version_num`.
    pub fn negotiate(server_version_num: i32) -> Self {
        let supports_returning = server_version_num >= RETURNING_MIN_VERSION;
        Self {
            echoes_generated_keys: supports_returning,
            supports_returning,
        }
    }

    /// Ask the server for its version and negotiate.
    pub async fn detect<C: GenericClient>(client: &C) -> OrmResult<Self> {
        let rows = client.query("SHOW server_version_num", &[]).await?;
        let row = rows
            .first()
            .ok_or_else(|| OrmError::not_found("SHOW server_version_num returned no row"))?;
        let raw: String = row
            .try_get(0)
            .map_err(|e| OrmError::decode("server_version_num", e.to_string()))?;
        let version = raw
            .trim()
            .parse::<i32>()
            .map_err(|e| OrmError::decode("server_version_num", e.to_string()))?;
        let caps = Self::negotiate(version);
        tracing::debug!(
            target: "pgreturning.sql",
            server_version_num = version,
            ?caps,
            "negotiated capabilities"
        );
        Ok(caps)
    }

    pub(crate) fn require_returning(&self) -> OrmResult<()> {
        if self.supports_returning {
            Ok(())
        } else {
            Err(OrmError::validation(
                "the connected server does not support RETURNING",
            ))
        }
    }
}
