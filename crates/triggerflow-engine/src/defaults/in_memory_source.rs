//! In-memory event source fed by a process-local broadcast hub.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::errors::EventSourceError;
use crate::registry::{EventSourceInit, Registries};
use crate::traits::EventSource;
use crate::types::Event;

const BROADCAST_CAPACITY: usize = 1000;

/// Event source class registered by [`InMemoryEventHub::register`].
pub const MEMORY_EVENT_SOURCE: &str = "memory";

/// Per-topic `tokio::sync::broadcast` channels.
///
/// Events only reach sources that were subscribed when they were published
/// (standard broadcast semantics). Cheaply cloneable.
#[derive(Clone, Default)]
pub struct InMemoryEventHub {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
}

impl InMemoryEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `event` on `topic`, returning how many sources received it.
    pub fn publish(&self, topic: &str, event: Event) -> usize {
        match self.topics.read().get(topic) {
            // No subscribers is not an error.
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Register the `memory` event-source class, bound to this hub.
    ///
    /// Sources take parameters `{"topic": "..."}`; the topic defaults to the
    /// source's name.
    pub fn register(&self, registries: &mut Registries) {
        let hub = self.clone();
        registries.register_event_source(MEMORY_EVENT_SOURCE, move |init| {
            Ok(Arc::new(InMemoryEventSource::new(&hub, init)?) as Arc<dyn EventSource>)
        });
    }
}

impl std::fmt::Debug for InMemoryEventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut topics: Vec<String> = self.topics.read().keys().cloned().collect();
        topics.sort();
        f.debug_struct("InMemoryEventHub")
            .field("topics", &topics)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct InMemorySourceParams {
    topic: Option<String>,
}

/// Forwards every event published on one hub topic into the workspace sink.
///
/// Subscribes at construction, so events published before
/// [`start_consuming`](EventSource::start_consuming) runs are not lost.
pub struct InMemoryEventSource {
    name: String,
    topic: String,
    sink: mpsc::Sender<Event>,
    receiver: Mutex<Option<broadcast::Receiver<Event>>>,
    delivered: AtomicU64,
    committed: AtomicU64,
}

impl InMemoryEventSource {
    pub fn new(hub: &InMemoryEventHub, init: EventSourceInit) -> Result<Self, EventSourceError> {
        let params: InMemorySourceParams = if init.parameters.is_null() {
            InMemorySourceParams::default()
        } else {
            serde_json::from_value(init.parameters).map_err(|e| EventSourceError::Config {
                message: format!("memory event source parameters: {e}"),
            })?
        };
        let topic = params.topic.unwrap_or_else(|| init.name.clone());
        Ok(Self {
            receiver: Mutex::new(Some(hub.subscribe(&topic))),
            name: init.name,
            topic,
            sink: init.sink,
            delivered: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Events forwarded into the sink so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Events acknowledged by the last commit.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_consuming(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventSourceError> {
        let mut rx = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| EventSourceError::Runtime {
                message: format!("event source '{}' is already consuming", self.name),
            })?;

        loop {
            let event = tokio::select! {
                _ = shutdown.recv() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            source = %self.name,
                            skipped,
                            "event source lagged, events lost"
                        );
                        continue;
                    }
                },
            };

            tokio::select! {
                _ = shutdown.recv() => break,
                sent = self.sink.send(event) => {
                    if sent.is_err() {
                        break;
                    }
                    self.delivered.fetch_add(1, Ordering::AcqRel);
                }
            }
        }

        tracing::debug!(source = %self.name, "memory event source stopped");
        Ok(())
    }

    async fn commit_events(&self) -> Result<(), EventSourceError> {
        self.committed.store(self.delivered(), Ordering::Release);
        Ok(())
    }
}
