//! Error taxonomy shared by every layer of Domain Ledger.
//!
//! Lookups that find nothing are not errors: they return `Option` or an
//! empty collection. Only the variants below ever travel up to a caller.

use uuid::Uuid;

/// Errors surfaced by stores, the version service, the indexer and search.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Another writer already stored this `(logical key, version)` pair.
    ///
    /// Callers may retry the whole read-compute-write sequence.
    #[error("version conflict: {key} already has version {version}")]
    Conflict { key: String, version: i64 },

    /// Rejected input: blank text handed to an embedder, or a draft that
    /// fails structural validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Embedding generation or vector storage failed for one aggregate.
    ///
    /// The write path logs and swallows this; the durable record is already
    /// committed when indexing runs.
    #[error("indexing failed for {identifier}: {source}")]
    Indexing {
        identifier: Uuid,
        #[source]
        source: Box<LedgerError>,
    },

    /// Storage unreachable, model load failure, HTTP failure, ...
    #[error(transparent)]
    Infrastructure(anyhow::Error),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }
}

/// Recovers a `LedgerError` that was carried inside an `anyhow::Error`;
/// anything else is an infrastructure failure.
impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<LedgerError>() {
            Ok(inner) => inner,
            Err(other) => LedgerError::Infrastructure(other),
        }
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
