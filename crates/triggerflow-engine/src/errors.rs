//! Error types for all triggerflow contract operations.

use thiserror::Error;

/// Errors from [`Storage`](super::traits::Storage) backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key: {key}")]
    InvalidKey { key: String },
    #[error("storage backend config error: {message}")]
    Config { message: String },
    #[error("storage error: {message}")]
    Store { message: String },
}

/// Errors from [`EventSource`](super::traits::EventSource) adapters.
#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("event source config error: {message}")]
    Config { message: String },
    #[error("event source runtime error: {message}")]
    Runtime { message: String },
}

/// Errors from context parsers run during contextualization.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("parser '{parser}' rejected trigger context: {message}")]
    Invalid { parser: String, message: String },
}

/// Errors raised while evaluating a trigger's condition or action.
///
/// Any of these moves the trigger's processor to
/// [`ProcessorState::Terminated`](crate::processor::ProcessorState::Terminated).
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger config error: {message}")]
    Config { message: String },
    #[error("trigger runtime error: {message}")]
    Runtime { message: String },
}

/// Errors decoding or encoding a stored trigger record.
#[derive(Debug, Error)]
pub enum TriggerCodecError {
    #[error("malformed trigger JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid trigger record: {message}")]
    Invalid { message: String },
    #[error("unknown {kind} function '{name}'")]
    UnknownFunction { kind: &'static str, name: String },
}
