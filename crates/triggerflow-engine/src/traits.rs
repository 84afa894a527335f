//! Plugin trait interfaces for the trigger engine.
//!
//! Every pluggable component is an async trait shared as `Arc<dyn Trait>`.
//! Default implementations live in [`defaults`](crate::defaults) and
//! [`functions`](crate::functions). Adding a method to any trait requires a
//! default implementation to keep existing backends compiling.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::context::TriggerContext;
use super::errors::*;
use super::types::Event;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Key/value-per-collection durable store, scoped by workspace.
///
/// Values are serialized JSON documents. The engine reads whole collections
/// at bootstrap and on cache refresh, and writes single items when
/// checkpointing.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Every item stored in `collection` for `workspace`, keyed by item id.
    ///
    /// An absent collection yields an empty map, never an error.
    async fn get(
        &self,
        workspace: &str,
        collection: &str,
    ) -> Result<HashMap<String, String>, StorageError>;

    /// Insert or replace one item.
    async fn put(
        &self,
        workspace: &str,
        collection: &str,
        id: &str,
        value: &str,
    ) -> Result<(), StorageError>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str {
        "storage"
    }
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

/// A producer that pushes events into the workspace sink.
///
/// Adapters are constructed with the workspace name, a clone of the sink
/// sender and their own JSON parameters (see
/// [`EventSourceInit`](crate::registry::EventSourceInit)).
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Name this source was registered under in the workspace.
    fn name(&self) -> &str;

    /// Push events into the sink until `shutdown` fires or the sink closes.
    async fn start_consuming(
        &self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventSourceError>;

    /// Acknowledge every event delivered so far.
    ///
    /// Called by the checkpoint coordinator, never by trigger processors.
    async fn commit_events(&self) -> Result<(), EventSourceError>;
}

// ---------------------------------------------------------------------------
// Condition / Action
// ---------------------------------------------------------------------------

/// Decides whether a trigger fires for an event.
///
/// Implementations may mutate `ctx.raw`; the mutated context is persisted at
/// the next checkpoint after the trigger fires.
#[async_trait]
pub trait Condition: Send + Sync {
    async fn evaluate(&self, ctx: &mut TriggerContext, event: &Event)
        -> Result<bool, TriggerError>;
}

/// Runs when a trigger's condition holds.
#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &mut TriggerContext, event: &Event) -> Result<(), TriggerError>;
}
