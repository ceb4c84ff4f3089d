use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_api::config::Config;
use realtime_api::dispatcher;
use realtime_api::gateway::bus::{self, BroadcastBus, InProcessBus};
use realtime_api::gateway::registry::ConnectionRegistry;
use realtime_api::gateway::rooms::RoomMembership;
use realtime_api::identity::HttpIdentityProvider;
use realtime_api::metrics::RealtimeMetrics;
use realtime_api::queue::{EventQueue, MemoryQueue};
use realtime_api::store::{KeyValueStore, MemoryStore};
use realtime_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory store, bus, and queue for a single-process deployment. A
    // clustered fleet swaps these for the Redis-backed implementations.
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let bus: Arc<dyn BroadcastBus> = Arc::new(InProcessBus::new());
    let queue: Arc<dyn EventQueue> = Arc::new(MemoryQueue::new());

    let identity = Arc::new(HttpIdentityProvider::new(&config.api_url));
    let rooms = Arc::new(RoomMembership::new());
    let metrics = Arc::new(RealtimeMetrics::new());

    tracing::info!(api_url = %config.api_url, services = ?config.services, "realtime-api configured");

    let state = AppState {
        config: Arc::new(config),
        identity,
        registry: Arc::new(ConnectionRegistry::new(store)),
        rooms: rooms.clone(),
        metrics: metrics.clone(),
    };

    // Subscribe before anything can publish so the relay misses nothing.
    let bus_rx = bus.subscribe();
    let relay = tokio::spawn(bus::run_relay(bus_rx, rooms));
    let dispatch = tokio::spawn(dispatcher::run(queue, bus));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    tokio::select! {
        result = server => {
            result.expect("server error");
        }
        err = relay => {
            match err {
                Ok(err) => tracing::error!(%err, "broadcast bus lost; exiting"),
                Err(err) => tracing::error!(%err, "relay task panicked"),
            }
            std::process::exit(1);
        }
        result = dispatch => {
            match result {
                Ok(Ok(())) => tracing::info!("work queue closed; dispatcher stopped"),
                Ok(Err(err)) => {
                    tracing::error!(%err, "dispatcher failed; exiting");
                    std::process::exit(1);
                }
                Err(err) => {
                    tracing::error!(%err, "dispatcher task panicked");
                    std::process::exit(1);
                }
            }
        }
    }

    metrics.reset_sockets();
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
