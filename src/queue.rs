//! Outbound event queue consumed by the dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

/// An outbound event produced by the application and fanned out to rooms.
///
/// Scope ids select the destination rooms; producers set whichever scopes
/// the event kind addresses. The payload reaches clients verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event kind, e.g. `documents.update`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Opaque payload forwarded to clients unchanged.
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// Event with no scopes yet. Attach scopes with the `for_*` helpers.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            team_id: None,
            user_id: None,
            collection_id: None,
            payload,
        }
    }

    pub fn for_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }
}

/// Source of outbound events.
///
/// Backed by the application's durable work queue in production and an
/// in-memory channel in tests.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Next event to deliver. `None` once the queue has closed.
    async fn dequeue(&self) -> Option<Event>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests and single-process deployments)
// ---------------------------------------------------------------------------

pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<Event>,
    rx: Mutex<mpsc::UnboundedReceiver<Event>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Push an event onto the queue.
    pub fn enqueue(&self, event: Event) {
        // send() only fails once the receiver half is gone.
        let _ = self.tx.send(event);
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn dequeue(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }
}
