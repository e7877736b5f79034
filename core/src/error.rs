//! Error types for the offline layer.
//!
//! `LinkError` is what transports produce and what the discard predicate classifies. The other
//! enums are what callers of the client see.

use offgrid_proto::GraphQLError;
use thiserror::Error;

/// Status codes at or above this are treated as permanent rejections.
pub const ERROR_STATUS_CODE: u16 = 400;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss: {0}")]
    Miss(String),
    #[error("invalid write: {0}")]
    InvalidWrite(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self { StorageError::Backend(Box::new(err)) }
}

/// Failure reported by a link in the chain.
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// The request reached the server and the response carried GraphQL errors.
    #[error("graphql errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),
    #[error("network error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Network { status: Option<u16>, message: String },
    /// Explicitly flagged by the transport as not worth retrying.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl LinkError {
    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self { LinkError::Network { status, message: message.into() } }

    pub fn graphql_errors(&self) -> &[GraphQLError] {
        match self {
            LinkError::GraphQL(errors) => errors,
            _ => &[],
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            LinkError::Network { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_permanent(&self) -> bool { matches!(self, LinkError::Permanent(_)) }
}

fn join_messages(errors: &[GraphQLError]) -> String { errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ") }

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Link(#[from] LinkError),
    /// Replay failed permanently and the mutation was removed from the outbox.
    #[error("mutation discarded: {0}")]
    Discarded(LinkError),
    /// The outbox entry went away without settling, e.g. the store was reset.
    #[error("mutation dropped before it settled")]
    Dropped,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("an online link is required unless a custom link chain is supplied")]
    MissingOnlineLink,
}
