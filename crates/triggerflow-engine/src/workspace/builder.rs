//! Workspace builder: bootstraps one workspace from storage.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::config::{BackendSpec, WorkspaceConfig};
use super::error::WorkspaceError;
use super::{Runtime, Workspace};
use crate::cache::TriggerCache;
use crate::context::{GlobalContext, WorkspaceShared};
use crate::dispatcher::Dispatcher;
use crate::reconcile::Reconciler;
use crate::registry::{EventSourceInit, Registries};
use crate::stats::WorkspaceStats;
use crate::traits::{EventSource, Storage};
use crate::types::{collections, Event, EventSourceDescriptor, REGISTRY_WORKSPACE};

/// Builder for a [`Workspace`].
///
/// Storage comes either from [`storage`](Self::storage) directly or from a
/// registered backend named by [`backend`](Self::backend). Registries default
/// to [`Registries::with_defaults`].
pub struct WorkspaceBuilder {
    name: String,
    registries: Option<Registries>,
    storage: Option<Arc<dyn Storage>>,
    backend: Option<BackendSpec>,
    config: WorkspaceConfig,
}

impl WorkspaceBuilder {
    pub(super) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registries: None,
            storage: None,
            backend: None,
            config: WorkspaceConfig::default(),
        }
    }

    /// Set the registries consulted during bootstrap and reconciliation.
    pub fn registries(mut self, registries: Registries) -> Self {
        self.registries = Some(registries);
        self
    }

    /// Use an already constructed storage backend. Takes precedence over
    /// [`backend`](Self::backend).
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Construct storage through the registered backend named in `spec`.
    pub fn backend(mut self, spec: BackendSpec) -> Self {
        self.backend = Some(spec);
        self
    }

    pub fn config(mut self, config: WorkspaceConfig) -> Self {
        self.config = config;
        self
    }

    /// Bootstrap the workspace.
    ///
    /// Resolves storage, checks the workspace is registered, loads the global
    /// context, starts every stored event source and admits every stored
    /// trigger. Any failure here is fatal and returned as an error.
    pub async fn build(self) -> Result<Workspace, WorkspaceError> {
        let registries = Arc::new(self.registries.unwrap_or_else(Registries::with_defaults));
        let name: Arc<str> = Arc::from(self.name.as_str());

        // 1. Storage.
        let storage = match (self.storage, self.backend) {
            (Some(storage), _) => storage,
            (None, Some(spec)) => {
                let constructor = registries.storage_backend(&spec.backend).ok_or_else(|| {
                    WorkspaceError::UnknownBackend {
                        backend: spec.backend.clone(),
                    }
                })?;
                constructor(spec.parameters).await?
            }
            (None, None) => {
                return Err(WorkspaceError::Build {
                    message: "no storage or storage backend configured".into(),
                })
            }
        };

        // 2. The workspace must be registered.
        let registered = storage
            .get(REGISTRY_WORKSPACE, collections::WORKSPACES)
            .await?;
        if !registered.contains_key(&*name) {
            return Err(WorkspaceError::UnknownWorkspace {
                workspace: name.to_string(),
            });
        }

        // 3. Global context.
        let global = load_global_context(storage.as_ref(), &name).await?;

        // 4. Channels.
        let (sink_tx, sink_rx) = mpsc::channel::<Event>(self.config.sink_capacity.max(1));
        let (checkpoint_tx, checkpoint_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let dispatcher_shutdown = shutdown_tx.subscribe();

        // 5. Event sources.
        let event_sources =
            Arc::new(create_event_sources(storage.as_ref(), &registries, &name, &sink_tx).await?);
        let sources = start_event_sources(&event_sources, &shutdown_tx);

        // 6. Initial trigger load.
        let stats = Arc::new(WorkspaceStats::default());
        let shared = WorkspaceShared {
            workspace: Arc::clone(&name),
            sink: sink_tx.clone(),
            event_sources: Arc::clone(&event_sources),
            cache: Arc::new(RwLock::new(TriggerCache::new())),
            global,
        };
        let mut reconciler = Reconciler::new(
            Arc::clone(&storage),
            Arc::clone(&registries),
            shared.clone(),
            checkpoint_tx,
            Arc::clone(&stats),
        );
        if let Err(e) = reconciler.reconcile().await {
            let _ = shutdown_tx.send(());
            shared.cache.write().clear();
            return Err(e);
        }

        let dispatcher = Dispatcher::new(
            sink_tx,
            sink_rx,
            Arc::clone(&shared.cache),
            reconciler,
            self.config.max_routing_retries,
            self.config.routing_retry_backoff(),
            Arc::clone(&stats),
        );

        tracing::info!(
            workspace = %name,
            storage = %storage.name(),
            event_sources = event_sources.len(),
            triggers = shared.cache.read().len(),
            "workspace bootstrapped"
        );

        Ok(Workspace {
            name,
            config: self.config,
            storage,
            shared,
            stats,
            shutdown_tx,
            runtime: Mutex::new(Some(Runtime {
                dispatcher,
                dispatcher_shutdown,
                checkpoints: checkpoint_rx,
                sources,
            })),
        })
    }
}

async fn load_global_context(
    storage: &dyn Storage,
    workspace: &str,
) -> Result<GlobalContext, WorkspaceError> {
    let stored = storage.get(workspace, collections::GLOBAL_CONTEXT).await?;
    let mut entries = HashMap::with_capacity(stored.len());
    for (key, raw) in stored {
        let value: Value = serde_json::from_str(&raw)
            .map_err(|source| WorkspaceError::GlobalContext {
                key: key.clone(),
                source,
            })?;
        entries.insert(key, value);
    }
    Ok(GlobalContext::from_entries(entries))
}

async fn create_event_sources(
    storage: &dyn Storage,
    registries: &Registries,
    workspace: &str,
    sink: &mpsc::Sender<Event>,
) -> Result<HashMap<String, Arc<dyn EventSource>>, WorkspaceError> {
    let stored = storage.get(workspace, collections::EVENT_SOURCES).await?;
    let mut ids: Vec<&String> = stored.keys().collect();
    ids.sort();

    let mut sources = HashMap::with_capacity(ids.len());
    for id in ids {
        let mut descriptor: EventSourceDescriptor = serde_json::from_str(&stored[id])
            .map_err(|e| WorkspaceError::EventSourceDescriptor {
                name: id.clone(),
                message: e.to_string(),
            })?;
        if descriptor.name.is_empty() {
            descriptor.name = id.clone();
        }

        let constructor = registries.event_source(&descriptor.class).ok_or_else(|| {
            WorkspaceError::UnknownEventSourceClass {
                name: descriptor.name.clone(),
                class: descriptor.class.clone(),
            }
        })?;
        let source = constructor(EventSourceInit {
            workspace: workspace.to_string(),
            name: descriptor.name.clone(),
            sink: sink.clone(),
            parameters: descriptor.parameters,
        })?;
        tracing::debug!(
            source = %descriptor.name,
            class = %descriptor.class,
            "event source created"
        );
        sources.insert(descriptor.name, source);
    }
    Ok(sources)
}

fn start_event_sources(
    sources: &HashMap<String, Arc<dyn EventSource>>,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    sources
        .values()
        .map(|source| {
            let source = Arc::clone(source);
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                if let Err(e) = source.start_consuming(shutdown_rx).await {
                    tracing::error!(source = %source.name(), error = %e, "event source failed");
                }
            })
        })
        .collect()
}
