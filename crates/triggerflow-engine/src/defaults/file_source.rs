//! Event source that tails a JSON-lines file.
//!
//! Each line of `{path}` is one [`Event`]. The byte offset of the last
//! committed line is kept beside it in `{path}.offset`, so a restarted worker
//! resumes after the last checkpoint and replays anything delivered but not
//! yet committed.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{broadcast, mpsc};

use crate::errors::EventSourceError;
use crate::registry::EventSourceInit;
use crate::traits::EventSource;
use crate::types::Event;

pub const FILE_EVENT_SOURCE: &str = "file";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Deserialize)]
struct FileSourceParams {
    path: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

pub struct FileEventSource {
    name: String,
    workspace: String,
    path: PathBuf,
    offset_path: PathBuf,
    poll_interval: Duration,
    sink: mpsc::Sender<Event>,
    /// Byte offset just past the last line forwarded into the sink.
    delivered: AtomicU64,
}

impl FileEventSource {
    /// Build from `{"path": "...", "poll_interval_ms": 500}`.
    pub fn new(init: EventSourceInit) -> Result<Self, EventSourceError> {
        let params: FileSourceParams =
            serde_json::from_value(init.parameters).map_err(|e| EventSourceError::Config {
                message: format!("file event source parameters: {e}"),
            })?;

        let mut offset_path = params.path.clone().into_os_string();
        offset_path.push(".offset");
        let offset_path = PathBuf::from(offset_path);
        let committed = read_offset(&offset_path)?;

        Ok(Self {
            name: init.name,
            workspace: init.workspace,
            path: params.path,
            offset_path,
            poll_interval: Duration::from_millis(params.poll_interval_ms.max(1)),
            sink: init.sink,
            delivered: AtomicU64::new(committed),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delivered_offset(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Read complete lines past the delivered offset and forward them.
    ///
    /// Returns `false` once the sink is closed.
    async fn poll_once(&self) -> Result<bool, EventSourceError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(runtime(&self.path, e)),
        };

        let start = self.delivered_offset();
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| runtime(&self.path, e))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| runtime(&self.path, e))?;

        let mut offset = start;
        // A trailing fragment without a newline is still being written.
        for line in buf.split_inclusive(|b| *b == b'\n') {
            if line.last() != Some(&b'\n') {
                break;
            }
            let line_start = offset;
            offset += line.len() as u64;

            let text = String::from_utf8_lossy(line);
            let text = text.trim();
            if text.is_empty() {
                self.delivered.store(offset, Ordering::Release);
                continue;
            }
            match serde_json::from_str::<Event>(text) {
                Ok(event) => {
                    if self.sink.send(event).await.is_err() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        source = %self.name,
                        offset = line_start,
                        error = %e,
                        "skipping malformed event line"
                    );
                }
            }
            self.delivered.store(offset, Ordering::Release);
        }
        Ok(true)
    }
}

fn runtime(path: &Path, e: std::io::Error) -> EventSourceError {
    EventSourceError::Runtime {
        message: format!("{}: {e}", path.display()),
    }
}

fn read_offset(path: &Path) -> Result<u64, EventSourceError> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse().map_err(|e| EventSourceError::Config {
            message: format!("corrupt offset file {}: {e}", path.display()),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(EventSourceError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        }),
    }
}

#[async_trait]
impl EventSource for FileEventSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_consuming(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), EventSourceError> {
        tracing::info!(
            workspace = %self.workspace,
            source = %self.name,
            path = %self.path.display(),
            offset = self.delivered_offset(),
            "tailing event file"
        );
        loop {
            let open = tokio::select! {
                _ = shutdown.recv() => break,
                polled = self.poll_once() => polled?,
            };
            if !open {
                break;
            }
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        Ok(())
    }

    async fn commit_events(&self) -> Result<(), EventSourceError> {
        let offset = self.delivered_offset();
        let temp_path = self.offset_path.with_extension("offset.tmp");
        tokio::fs::write(&temp_path, offset.to_string())
            .await
            .map_err(|e| runtime(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.offset_path)
            .await
            .map_err(|e| runtime(&self.offset_path, e))
    }
}
