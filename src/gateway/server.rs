//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::error::AuthError;
use crate::AppState;

use super::bus::RoomMessage;
use super::protocol::{ClientMessage, ServerMessage};
use super::rooms::Room;
use super::session::{generate_connection_id, Session};

/// Application-level close code sent on any handshake failure.
const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Deadline for receiving the authentication message after connect.
const AUTH_TIMEOUT_MS: u64 = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/realtime", get(ws_upgrade))
        .fallback(unclaimed_path)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Any path the gateway does not claim. With the collaboration service in
/// the same process its upgrade handler owns the rest of the path space, so
/// unmatched paths are ordinary 404s; without it they are bad requests.
async fn unclaimed_path(State(state): State<AppState>) -> Response {
    if state.config.collaboration_enabled() {
        StatusCode::NOT_FOUND.into_response()
    } else {
        (StatusCode::BAD_REQUEST, "Bad Request").into_response()
    }
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = generate_connection_id();
    let sockets = state.metrics.connection_opened();
    tracing::debug!(%connection_id, sockets, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: wait for the authentication message within the deadline.
    // Anything else the client sends before authenticating is dropped.
    let token_result = time::timeout(Duration::from_millis(AUTH_TIMEOUT_MS), async {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(?e, "ws read error during authentication");
                    return Err("read error");
                }
            };

            let text = match msg {
                Message::Text(t) => t,
                Message::Close(_) => return Err("client closed"),
                Message::Ping(_) | Message::Pong(_) => continue,
                _ => continue,
            };

            match serde_json::from_str(&text) {
                Ok(ClientMessage::Authentication { token }) => return Ok(token),
                Ok(_) => {
                    tracing::debug!(%connection_id, "dropping pre-authentication message");
                }
                Err(_) => {
                    tracing::debug!(%connection_id, "dropping unparseable pre-authentication frame");
                }
            }
        }
        Err("connection closed before authentication")
    })
    .await;

    let token = match token_result {
        Ok(Ok(token)) => token,
        Ok(Err(reason)) => {
            tracing::debug!(%connection_id, %reason, "handshake failed");
            state.metrics.connection_closed();
            return;
        }
        Err(_timeout) => {
            tracing::debug!(%connection_id, "authentication deadline passed");
            let _ = send_close(&mut ws_tx, CLOSE_UNAUTHORIZED, "unauthorized").await;
            state.metrics.connection_closed();
            return;
        }
    };

    // Step 2: resolve the token, load the accessible collections, and record
    // the connection fleet-wide.
    let (session, collections) = match authenticate(&state, &connection_id, &token).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(%connection_id, %err, "authentication rejected");
            let reply = serde_json::to_string(&ServerMessage::unauthorized(err.message)).unwrap();
            let _ = ws_tx.send(Message::Text(reply.into())).await;
            let _ = send_close(&mut ws_tx, CLOSE_UNAUTHORIZED, "unauthorized").await;
            state.metrics.connection_closed();
            return;
        }
    };

    // Step 3: join the scope rooms before acking so no broadcast slips past
    // a client that already saw `authenticated`.
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    state.rooms.register(&session.connection_id, out_tx);
    for room in session.base_rooms() {
        state.rooms.join(&session.connection_id, &room);
    }
    for collection_id in &collections {
        state
            .rooms
            .join(&session.connection_id, &Room::collection(collection_id));
    }

    tracing::debug!(
        connection_id = %session.connection_id,
        user_id = %session.principal.id,
        team_id = %session.principal.team_id,
        collections = collections.len(),
        "client authenticated"
    );

    let ack = serde_json::to_string(&ServerMessage::authenticated()).unwrap();
    if ws_tx.send(Message::Text(ack.into())).await.is_ok() {
        run_session(&state, &session, ws_tx, ws_rx, out_rx).await;
    }

    // Step 4: tear down. Room memberships drop with the registration.
    state.rooms.deregister(&session.connection_id);
    if let Err(err) = state.registry.deregister(&session.connection_id).await {
        tracing::warn!(
            connection_id = %session.connection_id,
            %err,
            "registry cleanup failed"
        );
    }
    let sockets = state.metrics.connection_closed();
    tracing::debug!(connection_id = %session.connection_id, sockets, "client disconnected");
}

/// Resolves the token to a principal, loads the accessible collections, and
/// records the connection in the shared registry. Any failure rejects the
/// handshake.
async fn authenticate(
    state: &AppState,
    connection_id: &str,
    token: &str,
) -> Result<(Session, Vec<String>), AuthError> {
    let principal = state.identity.resolve_token(token).await?;
    let collections = state.identity.collection_ids(&principal.id).await?;
    state.registry.register(connection_id, &principal.id).await?;
    Ok((Session::new(connection_id.to_string(), principal), collections))
}

/// Main connection loop: handle join/leave requests and forward room
/// deliveries until either side goes away.
async fn run_session(
    state: &AppState,
    session: &Session,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut out_rx: mpsc::UnboundedReceiver<Arc<RoomMessage>>,
) {
    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str(&text) {
                            Ok(ClientMessage::Join { collection_id }) => {
                                handle_join(state, session, &collection_id).await;
                            }
                            Ok(ClientMessage::Leave { collection_id }) => {
                                handle_leave(state, session, &collection_id);
                            }
                            Ok(ClientMessage::Authentication { .. }) => {
                                // Only the first authentication counts.
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    "ignoring repeat authentication"
                                );
                            }
                            Err(_) => {
                                tracing::debug!(
                                    connection_id = %session.connection_id,
                                    "dropping unparseable frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // A room this connection belongs to received a broadcast.
            delivery = out_rx.recv() => {
                match delivery {
                    Some(message) => {
                        let event = ServerMessage::event(message.name.clone(), message.data.clone());
                        let json = serde_json::to_string(&event).unwrap();
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Membership entry gone; the connection is being torn down.
                    None => break,
                }
            }
        }
    }
}

/// Joins a collection room after re-checking read access. Denials and failed
/// checks leave the membership untouched and send nothing back.
async fn handle_join(state: &AppState, session: &Session, collection_id: &str) {
    match state
        .identity
        .can_read_collection(&session.principal.id, collection_id)
        .await
    {
        Ok(true) => {
            state
                .rooms
                .join(&session.connection_id, &Room::collection(collection_id));
            state.metrics.join_granted();
            tracing::debug!(
                connection_id = %session.connection_id,
                %collection_id,
                "joined collection room"
            );
        }
        Ok(false) => {
            tracing::debug!(
                connection_id = %session.connection_id,
                %collection_id,
                "join denied"
            );
        }
        Err(err) => {
            tracing::warn!(
                connection_id = %session.connection_id,
                %collection_id,
                %err,
                "read check failed; join dropped"
            );
        }
    }
}

/// Leaves a collection room. Always honored, even when the client never
/// joined the room in the first place.
fn handle_leave(state: &AppState, session: &Session, collection_id: &str) {
    state
        .rooms
        .leave(&session.connection_id, &Room::collection(collection_id));
    state.metrics.leave_recorded();
    tracing::debug!(
        connection_id = %session.connection_id,
        %collection_id,
        "left collection room"
    );
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::{service, Config};
    use crate::error::AuthError;
    use crate::gateway::registry::ConnectionRegistry;
    use crate::gateway::rooms::RoomMembership;
    use crate::identity::{IdentityProvider, Principal};
    use crate::metrics::RealtimeMetrics;
    use crate::store::MemoryStore;
    use crate::AppState;

    struct NoIdentity;

    #[async_trait::async_trait]
    impl IdentityProvider for NoIdentity {
        async fn resolve_token(&self, _token: &str) -> Result<Principal, AuthError> {
            Err(AuthError::new("Invalid or expired token"))
        }

        async fn collection_ids(&self, _user_id: &str) -> Result<Vec<String>, AuthError> {
            Ok(Vec::new())
        }

        async fn can_read_collection(
            &self,
            _user_id: &str,
            _collection_id: &str,
        ) -> Result<bool, AuthError> {
            Ok(false)
        }
    }

    fn test_state(services: &[&str]) -> AppState {
        let config = Arc::new(Config {
            api_url: "http://127.0.0.1:0".to_string(),
            services: services.iter().map(|s| s.to_string()).collect(),
            port: 0,
        });
        AppState {
            config,
            identity: Arc::new(NoIdentity),
            registry: Arc::new(ConnectionRegistry::new(Arc::new(MemoryStore::new()))),
            rooms: Arc::new(RoomMembership::new()),
            metrics: Arc::new(RealtimeMetrics::new()),
        }
    }

    #[tokio::test]
    async fn unclaimed_paths_are_bad_requests_without_collaboration() {
        let app = super::router().with_state(test_state(&[service::WEBSOCKETS]));

        let response = app
            .oneshot(
                Request::get("/collaboration/doc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unclaimed_paths_are_not_found_with_collaboration() {
        let app = super::router().with_state(test_state(&[
            service::WEBSOCKETS,
            service::COLLABORATION,
        ]));

        let response = app
            .oneshot(
                Request::get("/collaboration/doc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
