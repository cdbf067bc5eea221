//! Error types for the schema registry

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Failed to load schema source {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("Unknown field kind '{kind}' on field '{field}'")]
    UnknownKind { field: String, kind: String },

    #[error("Shard key must name at least one field")]
    EmptyShardKey,

    #[error("Invalid shard direction: {0}")]
    InvalidDirection(String),

    #[error("Cluster operation failed: {0}")]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by a [`crate::client::ClusterClient`] backend.
///
/// These are always recoverable from the provisioner's point of view: the
/// failing operation is recorded and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("namespace {0} not found")]
    NamespaceNotFound(String),

    #[error("collection {0} already exists")]
    CollectionExists(String),

    #[error("index {name} already exists on {collection}")]
    IndexExists { collection: String, name: String },

    #[error("index {name} on {collection} has the same key as existing index {existing}")]
    IndexOptionsConflict { collection: String, name: String, existing: String },

    #[error("unique index {key} on {collection} is not prefixed by shard key {shard_key}")]
    UniqueIndexNotShardPrefixed { collection: String, key: String, shard_key: String },

    #[error("{namespace} is already sharded")]
    AlreadySharded { namespace: String },

    #[error("split point {point} is already a chunk boundary of {namespace}")]
    ChunkBoundary { namespace: String, point: String },

    #[error("invalid split point {point}: {reason}")]
    InvalidSplitPoint { point: String, reason: String },

    #[error("{operation} failed: {message}")]
    Command { operation: String, message: String },
}
