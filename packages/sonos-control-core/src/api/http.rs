//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::events::Delivery;
use crate::protocol_constants::{DEFAULT_KEEPALIVE_SECS, SERVICE_ID, STATIC_MOUNT};

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.static_dir());

    // Speakers fetch announcements without an Origin header; CORS only
    // matters for browser dashboards reading /events.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(event_stream))
        .nest_service(STATIC_MOUNT, static_files)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe with the number of known speakers.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let speakers = state.registry.snapshot().len();
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "speakers": speakers,
    }))
}

/// Server-sent event stream of broadcaster messages.
///
/// Each message is sent as an event named after its kind with the JSON
/// message as data. A comment line is sent whenever nothing arrived within
/// the keepalive interval. Closing the connection drops the subscription.
async fn event_stream(State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.events.subscribe();
    log::info!("[Server] Event stream opened (subscriber {})", subscription.id());

    let stream = sse_events(
        subscription.into_stream(Duration::from_secs(DEFAULT_KEEPALIVE_SECS)),
    );
    let mut response = Sse::new(stream).into_response();
    // Disables proxy buffering so events arrive as they are sent.
    response
        .headers_mut()
        .insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}

fn sse_events(
    deliveries: impl Stream<Item = Delivery> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    deliveries.map(|delivery| {
        let event = match delivery {
            Delivery::Message(message) => {
                let name = message.event.clone();
                Event::default()
                    .event(&name)
                    .json_data(&message)
                    .unwrap_or_else(|e| {
                        log::warn!("[Server] Could not encode {} event: {}", name, e);
                        Event::default().comment("dropped")
                    })
            }
            Delivery::Keepalive => Event::default().comment("keepalive"),
        };
        Ok(event)
    })
}
