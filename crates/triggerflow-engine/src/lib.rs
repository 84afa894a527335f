//! Triggerflow: a workspace-scoped, event-driven trigger engine.
//!
//! A [`Workspace`] consumes events from its event sources, routes each one by
//! `(subject, type)` to the triggers that declared interest in it, evaluates
//! each trigger's condition and, when it holds, fires the trigger's action.
//! Fired triggers are checkpointed to storage asynchronously.
//!
//! Storage backends, event sources, conditions, actions and their context
//! parsers are all pluggable through [`Registries`].

pub mod admin;
pub(crate) mod cache;
pub(crate) mod checkpoint;
pub mod context;
pub mod defaults;
pub(crate) mod dispatcher;
pub mod errors;
pub mod functions;
pub mod index;
pub mod processor;
pub(crate) mod reconcile;
pub mod registry;
pub mod stats;
#[cfg(test)]
pub mod testing;
pub mod traits;
pub mod trigger;
pub mod types;
pub mod workspace;

// Re-export public types at the crate level.

// cache / index
pub use cache::TriggerCache;
pub use index::ActivationIndex;

// context
pub use context::{GlobalContext, TriggerContext};

// defaults
pub use defaults::{
    FileEventSource, FileStorage, InMemoryEventHub, InMemoryEventSource, InMemoryStorage,
};

// errors
pub use errors::{EventSourceError, ParserError, StorageError, TriggerCodecError, TriggerError};

// functions
pub use functions::{CounterThreshold, DataMatch, EmitEventAction, PassAction, TrueCondition};

// processor
pub use processor::{ProcessorState, TriggerHandle};

// reconcile
pub use reconcile::ReconcileReport;

// registry
pub use registry::{
    ContextParser, EventSourceConstructor, EventSourceInit, NamedRegistry, Registries,
    StorageConstructor,
};

// stats
pub use stats::{StatsSnapshot, WorkspaceStats};

// traits
pub use traits::{Action, Condition, EventSource, Storage};

// trigger
pub use trigger::Trigger;

// types
pub use types::{
    collections, marshal_trigger, unmarshal_trigger, ActivationEvent, Event,
    EventSourceDescriptor, FunctionRef, TriggerRecord, ENGINE_EVENT_SOURCE, REGISTRY_WORKSPACE,
};

// workspace
pub use workspace::{
    BackendSpec, ShutdownHandle, Workspace, WorkspaceBuilder, WorkspaceConfig, WorkspaceError,
};
