//! Error types for cache operations

use crate::{Capabilities, EntityKind, ShardId, Snowflake};
use std::time::Duration;
use thiserror::Error;

/// Failures reported through a retrieval.
///
/// A plain cache miss is not an error: synchronous reads return `None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Retrieval timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("{kind} {id:?} does not exist")]
    RemoteNotFound {
        kind: EntityKind,
        id: Option<Snowflake>,
    },

    #[error("Transport failure: {reason}")]
    RemoteFailure { reason: String },

    #[error("Retrieval was cancelled")]
    Cancelled,

    #[error("Shard {shard} cannot guarantee a current {kind} cache without {required:?}")]
    StaleCapabilityDenied {
        shard: ShardId,
        kind: EntityKind,
        required: Capabilities,
    },

    #[error("Batch of {requested} ids exceeds the maximum of {max}")]
    BatchTooLarge { requested: usize, max: usize },

    #[error("Invalid prefix: {reason}")]
    InvalidPrefix { reason: String },

    #[error("Limit {limit} must be between 1 and {max}")]
    InvalidLimit { limit: usize, max: usize },

    #[error("Shard {shard} is not connected")]
    ShardUnavailable { shard: ShardId },
}

/// Errors returned by the transport collaborator's fetch primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The remote side authoritatively reports the entity does not exist.
    #[error("Entity not found")]
    NotFound,

    #[error("Request failed: {reason}")]
    Failure { reason: String },
}

impl TransportError {
    /// Convert into a retrieval error for a lookup of `kind`/`id`.
    pub fn into_retrieval(self, kind: EntityKind, id: Option<Snowflake>) -> RetrievalError {
        match self {
            TransportError::NotFound => RetrievalError::RemoteNotFound { kind, id },
            TransportError::Failure { reason } => RetrievalError::RemoteFailure { reason },
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all cache errors.
#[derive(Debug, Clone, Error)]
pub enum ShardCacheError {
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for cache operations.
pub type ShardCacheResult<T> = Result<T, ShardCacheError>;

// =============================================================================
// TESTS
// =============================================================================
