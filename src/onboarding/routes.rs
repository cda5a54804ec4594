//! HTTP surface: gateway event ingestion and session status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};

use crate::events::Event;

use super::manager::OnboardingManager;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
    /// Bearer token required on event ingestion, if set.
    pub events_secret: Option<SecretString>,
}

/// POST /api/events
///
/// Accepts one gateway event from the relay and publishes it on the bus.
async fn post_event(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    Json(event): Json<Event>,
) -> impl IntoResponse {
    if let Some(secret) = &state.events_secret {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(secret.expose_secret()) {
            tracing::warn!("Rejected event with missing or wrong bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"error": "unauthorized"})),
            );
        }
    }

    let kind = format!("{:?}", event.kind());
    tracing::debug!(kind = %kind, actor = %event.actor(), "Event received");
    state.manager.events().publish(event);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"accepted": true, "kind": kind})),
    )
}

/// GET /api/onboarding/sessions
async fn get_sessions(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.manager.sessions().await)
}

/// GET /health
async fn health(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    let registry = state.manager.registry();
    Json(serde_json::json!({
        "status": "ok",
        "sessions": registry.sessions().await.len(),
        "watched": registry.watched_count().await,
    }))
}

/// Build the onboarding HTTP routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/events", post(post_event))
        .route("/api/onboarding/sessions", get(get_sessions))
        .route("/health", get(health))
        .with_state(state)
}
