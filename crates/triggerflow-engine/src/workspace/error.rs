//! Workspace error types.

use thiserror::Error;

use crate::errors::{EventSourceError, ParserError, StorageError, TriggerCodecError};

/// Fatal errors from bootstrapping or running a [`Workspace`](super::Workspace).
///
/// Everything recoverable (a bad stored trigger, a failed checkpoint write,
/// a failing condition) is logged where it happens and never surfaces here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkspaceError {
    /// The workspace has no entry in the workspace registry.
    #[error("workspace '{workspace}' is not registered")]
    UnknownWorkspace { workspace: String },
    /// No storage constructor is registered under the configured name.
    #[error("unknown storage backend '{backend}'")]
    UnknownBackend { backend: String },
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// A stored global context entry is not valid JSON.
    #[error("malformed global context entry '{key}': {source}")]
    GlobalContext {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored event source descriptor could not be decoded.
    #[error("malformed event source '{name}': {message}")]
    EventSourceDescriptor { name: String, message: String },
    /// An event source names a class with no registered constructor.
    #[error("event source '{name}' has unknown class '{class}'")]
    UnknownEventSourceClass { name: String, class: String },
    /// An event source constructor failed.
    #[error("event source error: {0}")]
    EventSource(#[from] EventSourceError),
    /// A context parser rejected a trigger during contextualization.
    #[error("failed to contextualize trigger '{trigger_id}': {source}")]
    Contextualize {
        trigger_id: String,
        #[source]
        source: ParserError,
    },
    /// A trigger record could not be encoded.
    #[error("trigger codec error: {0}")]
    Codec(#[from] TriggerCodecError),
    /// [`Workspace::run`](super::Workspace::run) was called twice.
    #[error("workspace is already running")]
    AlreadyRunning,
    /// An error during workspace construction.
    #[error("build error: {message}")]
    Build { message: String },
}
