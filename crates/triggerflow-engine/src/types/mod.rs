//! Core data types: events, trigger records, event source descriptors and
//! storage collection names.

mod event;
mod source;
mod trigger;

pub use event::{Event, ENGINE_EVENT_SOURCE};
pub use source::EventSourceDescriptor;
pub use trigger::{
    marshal_trigger, unmarshal_trigger, ActivationEvent, FunctionRef, TriggerRecord,
};

/// Storage workspace that holds the list of registered workspaces.
pub const REGISTRY_WORKSPACE: &str = "triggerflow";

/// Collection names read and written by the engine.
pub mod collections {
    /// Under [`REGISTRY_WORKSPACE`](super::REGISTRY_WORKSPACE): one item per workspace.
    pub const WORKSPACES: &str = "workspaces";
    pub const GLOBAL_CONTEXT: &str = "global_context";
    pub const EVENT_SOURCES: &str = "event_sources";
    pub const TRIGGERS: &str = "triggers";
}
