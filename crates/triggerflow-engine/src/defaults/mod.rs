//! Default storage backends and event sources.
//!
//! These let a workspace run with no external services. Each is registered
//! by name and can be replaced or joined by others through [`Registries`].

pub mod file_source;
pub mod file_storage;
pub mod in_memory_source;
pub mod in_memory_storage;
pub use file_source::{FileEventSource, FILE_EVENT_SOURCE};
pub use file_storage::FileStorage;
pub use in_memory_source::{InMemoryEventHub, InMemoryEventSource, MEMORY_EVENT_SOURCE};
pub use in_memory_storage::InMemoryStorage;

use std::sync::Arc;

use crate::errors::StorageError;
use crate::registry::Registries;
use crate::traits::{EventSource, Storage};

/// Register the `memory` and `file` storage backends and the `file` event
/// source.
///
/// The `memory` event source needs a shared hub and is registered separately
/// through [`InMemoryEventHub::register`].
pub fn register_defaults(registries: &mut Registries) {
    registries
        .register_storage("memory", |_params| async {
            Ok::<_, StorageError>(Arc::new(InMemoryStorage::new()) as Arc<dyn Storage>)
        })
        .register_storage("file", |params| async move {
            let storage = FileStorage::from_params(params)?;
            Ok::<_, StorageError>(Arc::new(storage) as Arc<dyn Storage>)
        })
        .register_event_source(FILE_EVENT_SOURCE, |init| {
            Ok(Arc::new(FileEventSource::new(init)?) as Arc<dyn EventSource>)
        });
}
