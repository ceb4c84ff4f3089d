//! Wire-format messages exchanged with clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// First message of the handshake, carrying the API token.
    Authentication { token: String },
    /// Request to join a collection room.
    #[serde(rename_all = "camelCase")]
    Join { collection_id: String },
    /// Request to leave a collection room.
    #[serde(rename_all = "camelCase")]
    Leave { collection_id: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A message sent to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Acknowledges a successful handshake.
    Authenticated { data: bool },
    /// Rejects the handshake; the connection closes right after.
    Unauthorized { message: String },
    /// A fleet broadcast delivered to a joined room.
    Event { name: String, data: Value },
}

impl ServerMessage {
    pub fn authenticated() -> Self {
        ServerMessage::Authenticated { data: true }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ServerMessage::Unauthorized {
            message: message.into(),
        }
    }

    pub fn event(name: impl Into<String>, data: Value) -> Self {
        ServerMessage::Event {
            name: name.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_authentication() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"authentication","token":"tok_1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Authentication {
                token: "tok_1".to_string()
            }
        );
    }

    #[test]
    fn parses_join_and_leave_with_camel_case_field() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join","collectionId":"c1"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::Join {
                collection_id: "c1".to_string()
            }
        );

        let leave: ClientMessage =
            serde_json::from_str(r#"{"type":"leave","collectionId":"c1"}"#).unwrap();
        assert_eq!(
            leave,
            ClientMessage::Leave {
                collection_id: "c1".to_string()
            }
        );
    }

    #[test]
    fn serializes_server_messages() {
        assert_eq!(
            serde_json::to_value(ServerMessage::authenticated()).unwrap(),
            serde_json::json!({ "type": "authenticated", "data": true })
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::unauthorized("Invalid or expired token")).unwrap(),
            serde_json::json!({ "type": "unauthorized", "message": "Invalid or expired token" })
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::event(
                "documents.update",
                serde_json::json!({ "id": "d1" })
            ))
            .unwrap(),
            serde_json::json!({
                "type": "event",
                "name": "documents.update",
                "data": { "id": "d1" }
            })
        );
    }
}
