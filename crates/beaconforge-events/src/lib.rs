//! Event bus for the beaconforge pipeline.
//!
//! The runner reports every per-file transition through an [`EventBus`] that
//! callers inject, so observers (the CLI summary, tests) see structured
//! events without relying on a process-global logger. Internally the bus uses
//! `tokio::broadcast` with a bounded replay buffer; when the buffer overflows
//! the oldest events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed pipeline events. Paths are carried as display strings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted {
        run_id: Uuid,
        files: Vec<String>,
    },
    UploadStarted {
        run_id: Uuid,
        path: String,
    },
    Staged {
        run_id: Uuid,
        path: String,
        bytes: u64,
    },
    UploadFailed {
        run_id: Uuid,
        path: String,
        message: String,
    },
    FinalizeStarted {
        run_id: Uuid,
        path: String,
    },
    Finalized {
        run_id: Uuid,
        path: String,
        destination: String,
    },
    FinalizeFailed {
        run_id: Uuid,
        path: String,
        message: String,
    },
    ArtifactDiscarded {
        run_id: Uuid,
        path: String,
    },
    RunCompleted {
        run_id: Uuid,
        finalized: usize,
        failed: usize,
    },
}

impl Event {
    /// Machine-friendly discriminator for log filtering.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::UploadStarted { .. } => "upload_started",
            Self::Staged { .. } => "staged",
            Self::UploadFailed { .. } => "upload_failed",
            Self::FinalizeStarted { .. } => "finalize_started",
            Self::Finalized { .. } => "finalized",
            Self::FinalizeFailed { .. } => "finalize_failed",
            Self::ArtifactDiscarded { .. } => "artifact_discarded",
            Self::RunCompleted { .. } => "run_completed",
        }
    }

    /// Run the event belongs to.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::UploadStarted { run_id, .. }
            | Self::Staged { run_id, .. }
            | Self::UploadFailed { run_id, .. }
            | Self::FinalizeStarted { run_id, .. }
            | Self::Finalized { run_id, .. }
            | Self::FinalizeFailed { run_id, .. }
            | Self::ArtifactDiscarded { run_id, .. }
            | Self::RunCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, so dropped events affect both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No subscribers is not an error; the replay buffer still holds the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.recent(Some(since)).into_iter().collect()
        });
        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Snapshot of buffered events newer than `since_id` (all buffered events
    /// when `None`).
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn recent(&self, since_id: Option<EventId>) -> Vec<EventEnvelope> {
        let since = since_id.unwrap_or(0);
        let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
        buffer
            .iter()
            .filter(|item| item.id > since)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
