use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::USER_AGENT;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use super::handler::{self, text_response};
use crate::auth::AuthorizationGate;
use crate::dispatch::SyncDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthorizationGate>,
    pub dispatcher: Arc<SyncDispatcher>,
}

/// Build the axum router with all gau endpoints. Every route, including
/// unknown paths, sits behind the origin check.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(handler::sync_handler))
        .route("/update_whitelist", post(handler::update_whitelist_handler))
        .route("/health", get(handler::health_handler))
        .layer(middleware::from_fn_with_state(state.clone(), audit_and_gate))
        .with_state(state)
}

/// Logs every request, then rejects callers that are not on the allow-list.
async fn audit_and_gate(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let origin = remote.ip();
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info!(
        method = %request.method(),
        path = %request.uri().path(),
        %origin,
        user_agent,
        "Request"
    );

    if let Err(e) = state.gate.check_origin(origin) {
        tracing::warn!(%origin, "Rejected request: {}", e);
        return text_response(StatusCode::FORBIDDEN, &e.to_string());
    }

    next.run(request).await
}
