use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::router::AppState;
use crate::auth::AuthError;
use crate::dispatch::DispatchError;

/// Header Gitee uses to carry the webhook password.
pub const TOKEN_HEADER: &str = "X-Gitee-Token";

pub const SYNC_ACCEPTED: &str = "Received sync request, processing...";

/// Single-line plain-text response, newline-terminated.
pub fn text_response(status: StatusCode, message: &str) -> Response {
    (status, format!("{}\n", message)).into_response()
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::NotWhitelisted { .. } => StatusCode::FORBIDDEN,
            DispatchError::Auth(AuthError::Unauthorized | AuthError::ReloadDisabled) => {
                StatusCode::UNAUTHORIZED
            }
            DispatchError::Auth(_) => StatusCode::FORBIDDEN,
            DispatchError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Parse(_)
            | DispatchError::InvalidReloadUrl { .. }
            | DispatchError::Reload(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }
        text_response(status, &self.to_string())
    }
}

pub async fn sync_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match state.dispatcher.handle_sync_event(&body) {
        Ok(accepted) => {
            tracing::debug!(
                source = %accepted.source,
                targets = accepted.targets,
                job = accepted.job_id.as_deref().unwrap_or("-"),
                "Sync accepted"
            );
            text_response(StatusCode::OK, SYNC_ACCEPTED)
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadQuery {
    pub token: Option<String>,
}

pub async fn update_whitelist_handler(
    State(state): State<AppState>,
    Query(query): Query<ReloadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = query.token.or_else(|| {
        headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    match state
        .dispatcher
        .handle_reload_event(&body, token.as_deref())
        .await
    {
        Ok(count) => text_response(
            StatusCode::OK,
            &format!("Whitelist updated: {} repositories", count),
        ),
        Err(e) => e.into_response(),
    }
}

pub async fn health_handler() -> Response {
    text_response(StatusCode::OK, "ok")
}
