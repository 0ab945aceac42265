//! WebSocket server handler using Axum.

use crate::client::SessionRegistry;
use crate::config::{OriginPolicy, SessionTimings};
use crate::router::ChatRouter;
use crate::session;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{header::ORIGIN, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chat_store::{RoomDirectory, UserDirectory};
use futures::StreamExt;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

/// Shared application state.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub users: Arc<dyn UserDirectory>,
    pub router: ChatRouter,
    pub timings: SessionTimings,
    pub origins: OriginPolicy,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomDirectory>,
        timings: SessionTimings,
        origins: OriginPolicy,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = ChatRouter::new(registry.clone(), rooms);
        Self {
            registry,
            users,
            router,
            timings,
            origins,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    sessions: usize,
}

/// Create the WebSocket router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        sessions: state.registry.session_count(),
    })
}

/// WebSocket upgrade handler. Refuses origins outside the allow-list.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if !state.origins.allows(origin) {
        warn!("Rejected WebSocket upgrade from origin {:?}", origin);
        counter!("gateway_origin_rejections_total").increment(1);
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }
    debug!("Upgrading WebSocket from origin {:?}", origin);

    ws.max_message_size(state.timings.max_message_size)
        .on_upgrade(move |socket| {
            let (sink, stream) = socket.split();
            session::run_session(state, sink, stream)
        })
}
