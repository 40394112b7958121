use crate::generator::ResponseGenerator;
use crate::middleware::{auth_middleware, AuthConfig};
use crate::ws_record::record_handler;
use crate::ws_replay::{chat_handler, resume_handler};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_mw,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use resumer_core::ResumerError;
use resumer_session::{EntryStore, ResponseResumer};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub resumer: Arc<ResponseResumer>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub entries: Arc<dyn EntryStore>,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(
        resumer: Arc<ResponseResumer>,
        generator: Arc<dyn ResponseGenerator>,
        entries: Arc<dyn EntryStore>,
    ) -> Router {
        Self::build_with_middleware(resumer, generator, entries, AuthConfig::default())
    }

    /// Build the gateway with API-key auth on every route but `/health`.
    pub fn build_with_middleware(
        resumer: Arc<ResponseResumer>,
        generator: Arc<dyn ResponseGenerator>,
        entries: Arc<dyn EntryStore>,
        auth_config: AuthConfig,
    ) -> Router {
        let state = Arc::new(AppState {
            resumer,
            generator,
            entries,
        });

        let api = Router::new()
            .route("/v1/responses/enabled", get(enabled_handler))
            .route("/v1/responses/check", post(check_handler))
            .route("/v1/responses/record", get(record_handler))
            .route(
                "/v1/conversations/{id}/in-progress",
                get(in_progress_handler),
            )
            .route("/v1/conversations/{id}/cancel", post(cancel_handler))
            .route("/v1/conversations/{id}/resume", get(resume_handler))
            .route("/v1/conversations/{id}/chat", get(chat_handler))
            .with_state(state);

        let api = if auth_config.is_enabled() {
            api.layer(axum_mw::from_fn_with_state(
                Arc::new(auth_config),
                auth_middleware,
            ))
        } else {
            api
        };

        Router::new().route("/health", get(health_handler)).merge(api)
    }
}

/// HTTP status and JSON body for an engine error.
pub(crate) fn error_response(error: &ResumerError) -> (StatusCode, String) {
    let status = match error {
        ResumerError::ResumeNotFound { .. } | ResumerError::NotRecording { .. } => {
            StatusCode::NOT_FOUND
        }
        ResumerError::Conflict { .. } => StatusCode::CONFLICT,
        ResumerError::SubscriberLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        ResumerError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        serde_json::json!({"error": error.to_string()}).to_string(),
    )
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "resumer"}))
}

async fn enabled_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({"enabled": state.resumer.is_enabled()}))
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    conversation_ids: Vec<Uuid>,
}

async fn check_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckRequest>,
) -> impl IntoResponse {
    let recordings = state.resumer.check_recordings(&body.conversation_ids);
    Json(serde_json::json!({"recordings": recordings}))
}

async fn in_progress_handler(
    Path(conversation_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "in_progress": state.resumer.has_response_in_progress(conversation_id)
    }))
}

async fn cancel_handler(
    Path(conversation_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.resumer.request_cancel(conversation_id) {
        Ok(()) => {
            info!(conversation_id = %conversation_id, "Cancel accepted");
            (
                StatusCode::ACCEPTED,
                serde_json::json!({"status": "cancel_requested"}).to_string(),
            )
        }
        Err(e) => {
            warn!(conversation_id = %conversation_id, error = %e, "Cancel rejected");
            error_response(&e)
        }
    }
}
