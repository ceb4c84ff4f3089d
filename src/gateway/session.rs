//! Per-connection session state.

use crate::identity::Principal;

use super::rooms::Room;

/// Generate an opaque connection id (`ws_` prefixed).
pub fn generate_connection_id() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = [0u8; 16];
    rand::thread_rng().fill(&mut buf[..]);
    format!("ws_{}", URL_SAFE_NO_PAD.encode(buf))
}

/// State for a single authenticated connection.
pub struct Session {
    /// Connection identifier, unique per process lifetime.
    pub connection_id: String,
    /// The authenticated user.
    pub principal: Principal,
}

impl Session {
    pub fn new(connection_id: String, principal: Principal) -> Self {
        Self {
            connection_id,
            principal,
        }
    }

    /// Rooms every connection joins at authentication time.
    pub fn base_rooms(&self) -> [Room; 2] {
        [
            Room::team(&self.principal.team_id),
            Room::user(&self.principal.id),
        ]
    }
}
