//! WebSocket gateway: connection lifecycle, rooms, and the fleet bus relay.

pub mod bus;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod server;
pub mod session;
