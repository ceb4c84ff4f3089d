pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod metrics;
pub mod queue;
pub mod routes;
pub mod store;

use std::sync::Arc;

use config::Config;
use gateway::registry::ConnectionRegistry;
use gateway::rooms::RoomMembership;
use identity::IdentityProvider;
use metrics::RealtimeMetrics;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: Arc<dyn IdentityProvider>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomMembership>,
    pub metrics: Arc<RealtimeMetrics>,
}
