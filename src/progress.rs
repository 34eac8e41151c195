//! Broadcast channel carrying progress events to live observers.
//!
//! Producers never block: an event emitted while nobody listens is simply
//! dropped, and an observer that falls more than the channel capacity
//! behind skips the events it missed.

use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ProgressEvent, ProgressKind};

/// Per-observer buffer before a slow observer starts losing events.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new observer. It receives only events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Observer as a stream, skipping over lagged gaps.
    pub fn stream(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static + use<> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|res| match res {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(name: "progress.observer.lagged", skipped, "Observer lagged, events dropped");
                None
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, event: ProgressEvent) {
        // Err only means there are no observers right now.
        let _ = self.tx.send(event);
    }

    /// Reporter that stamps events with a task id and component name.
    pub fn reporter(&self, task_id: Uuid, agent: impl Into<String>) -> ProgressReporter {
        ProgressReporter {
            hub: self.clone(),
            task_id: Some(task_id),
            agent: agent.into(),
        }
    }
}

/// Handle handed to producers (orchestrator, agents) for one task.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    hub: ProgressHub,
    task_id: Option<Uuid>,
    agent: String,
}

impl ProgressReporter {
    /// Same task, different originating component.
    pub fn for_agent(&self, agent: impl Into<String>) -> Self {
        Self {
            hub: self.hub.clone(),
            task_id: self.task_id,
            agent: agent.into(),
        }
    }

    /// Reporter attached to a private hub nobody listens to.
    pub fn detached(agent: impl Into<String>) -> Self {
        Self {
            hub: ProgressHub::new(1),
            task_id: None,
            agent: agent.into(),
        }
    }

    pub fn emit(&self, kind: ProgressKind, message: impl Into<String>) {
        self.hub.emit(ProgressEvent {
            task_id: self.task_id,
            agent: self.agent.clone(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn start(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Start, message);
    }

    pub fn thinking(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Thinking, message);
    }

    pub fn action(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Action, message);
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Complete, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ProgressKind::Error, message);
    }
}
