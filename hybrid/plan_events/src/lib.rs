#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Search event publishing: node expansions, refinements, repairs and outcomes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};

/// Event emitted by a planning run, encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEvent {
    /// Unique identifier.
    pub id: String,
    /// Component producing the event.
    pub source: String,
    /// Event type (e.g., `search.ll.repaired`).
    pub event_type: String,
    /// Planning run the event belongs to.
    pub run_id: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PlanEvent {
    /// Returns true when the event type sits under `prefix` (e.g. `search.ll`).
    #[must_use]
    pub fn is_under(&self, prefix: &str) -> bool {
        self.event_type == prefix
            || self
                .event_type
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event.
    async fn publish(&self, event: PlanEvent) -> Result<()>;
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver for events published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<PlanEvent>>;
}

/// In-memory broadcast bus retaining a bounded backlog.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<PlanEvent>,
    capacity: usize,
    backlog: Arc<Mutex<VecDeque<PlanEvent>>>,
}

impl MemoryEventBus {
    /// Creates a new bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Snapshot of recent events retained in memory.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PlanEvent> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events of one run, in publication order.
    #[must_use]
    pub fn run(&self, run_id: &str) -> Vec<PlanEvent> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.run_id == run_id)
            .cloned()
            .collect()
    }
}

/// File-backed publisher appending JSON lines.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: PlanEvent) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            if backlog.len() == self.capacity {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }
        // No receivers is not an error for a bus used mostly for snapshots.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<PlanEvent>> {
        Ok(self.sender.subscribe())
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: PlanEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
