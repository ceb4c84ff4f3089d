//! Cross-process broadcast bus.
//!
//! Every server process publishes room messages to the bus and relays what
//! it receives into its own `RoomMembership`. `InProcessBus` wraps a single
//! `tokio::sync::broadcast` channel; a clustered deployment swaps in an
//! adapter over a shared transport behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::BusError;

use super::rooms::RoomMembership;

/// Capacity of the broadcast channel. Relays that fall behind skip messages
/// (RecvError::Lagged).
const BUS_CAPACITY: usize = 4096;

/// A message addressed to one room, replicated to every process.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    /// Destination room name (e.g. `team-42`).
    pub room: String,
    /// The producing event's kind (e.g. `documents.update`).
    pub name: String,
    /// Payload forwarded to clients verbatim.
    pub data: Value,
}

/// Shared publish/subscribe transport between all server processes.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    /// Publish a room message to the fleet.
    async fn publish(&self, message: RoomMessage) -> Result<(), BusError>;

    /// Subscribe to the replicated stream. Each process subscribes once and
    /// relays into its `RoomMembership`.
    fn subscribe(&self) -> broadcast::Receiver<Arc<RoomMessage>>;
}

// ---------------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------------

/// Bus over a single in-process broadcast channel. Tests share one instance
/// between several server instances to model a fleet.
pub struct InProcessBus {
    sender: broadcast::Sender<Arc<RoomMessage>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }
}

#[async_trait]
impl BroadcastBus for InProcessBus {
    async fn publish(&self, message: RoomMessage) -> Result<(), BusError> {
        // send() returns Err if there are no receivers; that's fine.
        let _ = self.sender.send(Arc::new(message));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<RoomMessage>> {
        self.sender.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Forward bus messages into the local membership until the bus dies.
///
/// Lagging is tolerated: skipped messages are logged and delivery continues.
/// A closed subscription means this process can no longer see fleet traffic;
/// the returned error is fatal and the caller is expected to exit.
///
/// Callers subscribe before spawning the relay task; messages sent before
/// the subscription exists are not replayed.
pub async fn run_relay(
    mut rx: broadcast::Receiver<Arc<RoomMessage>>,
    rooms: Arc<RoomMembership>,
) -> BusError {
    loop {
        match rx.recv().await {
            Ok(message) => {
                let delivered = rooms.deliver(message.clone());
                tracing::trace!(
                    room = %message.room,
                    name = %message.name,
                    delivered,
                    "relayed room message"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "relay lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => {
                return BusError::fatal("broadcast bus subscription closed");
            }
        }
    }
}
