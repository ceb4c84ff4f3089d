//! Drains the work queue and fans events out to the bus, one message per
//! target room.

use std::sync::Arc;

use crate::error::BusError;
use crate::gateway::bus::{BroadcastBus, RoomMessage};
use crate::gateway::rooms::Room;
use crate::queue::{Event, EventQueue};

/// Expands an event's scope fields into the rooms that should receive it.
pub fn rooms_for(event: &Event) -> Vec<Room> {
    let mut rooms = Vec::new();
    if let Some(team_id) = &event.team_id {
        rooms.push(Room::team(team_id));
    }
    if let Some(user_id) = &event.user_id {
        rooms.push(Room::user(user_id));
    }
    if let Some(collection_id) = &event.collection_id {
        rooms.push(Room::collection(collection_id));
    }
    rooms
}

/// Dispatcher loop. Returns `Ok` when the queue closes and `Err` when the
/// bus reports a fatal publish failure; transient failures drop the event
/// and keep the loop alive.
pub async fn run(queue: Arc<dyn EventQueue>, bus: Arc<dyn BroadcastBus>) -> Result<(), BusError> {
    while let Some(event) = queue.dequeue().await {
        let rooms = rooms_for(&event);
        if rooms.is_empty() {
            tracing::debug!(name = %event.name, "event has no audience");
            continue;
        }

        for room in rooms {
            let message = RoomMessage {
                room: room.name(),
                name: event.name.clone(),
                data: event.payload.clone(),
            };
            if let Err(err) = bus.publish(message).await {
                if err.is_fatal() {
                    tracing::error!(%err, "bus publish failed");
                    return Err(err);
                }
                tracing::warn!(%err, name = %event.name, "publish failed; event dropped");
            }
        }
    }
    Ok(())
}
