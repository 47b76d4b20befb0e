//! Error types for the export/import pipeline.

use std::path::PathBuf;

use crate::types::{CollectionId, TokenId};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("Malformed ledger response for {field}: {cause}")]
    Malformed { field: String, cause: String },

    #[error("Unknown collection {0}")]
    UnknownCollection(CollectionId),

    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Collection {0} not found on the source ledger")]
    CollectionNotFound(CollectionId),

    #[error(
        "Collection {collection}: destination would assign token {actual} but {expected} was expected; local state and ledger have diverged"
    )]
    Divergence {
        collection: CollectionId,
        expected: TokenId,
        actual: TokenId,
    },

    #[error(
        "Collection {collection}: minted token ids {created:?} do not match requested ids {requested:?}"
    )]
    Verification {
        collection: CollectionId,
        requested: Vec<TokenId>,
        created: Vec<TokenId>,
    },

    #[error(
        "Collection {collection}: token log {path} is not from a completed export of the current snapshot; rerun export"
    )]
    IncompleteExport {
        collection: CollectionId,
        path: PathBuf,
    },

    #[error(
        "Collection {collection}: destination refused to burn placeholder #{token}; rerun import to retry"
    )]
    PlaceholderNotBurned {
        collection: CollectionId,
        token: TokenId,
    },

    #[error("Collection {collection}: refusing to persist a state that drops {what}")]
    StateRegression {
        collection: CollectionId,
        what: String,
    },

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot decode {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Failure to decode an opaque token payload. Never fatal to an export.
#[derive(Debug, thiserror::Error)]
#[error("Cannot decode token payload: {0}")]
pub struct DecodeError(pub String);
