//! HTTP transport: shared state and router.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::{
    AccessTokenClaims, AuthCodeStore, TokenIssuer, TokenValidator, handlers,
    middleware::require_bearer,
};
use crate::config::{OAuthConfig, defaults};

/// Shared state for HTTP handlers.
#[derive(Debug)]
pub struct HttpState {
    pub config: OAuthConfig,
    pub codes: AuthCodeStore,
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
}

impl HttpState {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            codes: AuthCodeStore::new(config.auth_code_ttl),
            issuer: TokenIssuer::new(&config),
            validator: TokenValidator::new(&config),
            config,
        }
    }
}

/// Create the HTTP router.
///
/// `api` is mounted under `/api` behind bearer token validation; its handlers
/// can read the caller's [`AccessTokenClaims`] from the request extensions.
pub fn create_router(config: OAuthConfig, api: Router) -> Router {
    let state = Arc::new(HttpState::new(config));

    // Start background cleanup task
    state.codes.start_cleanup_task();

    let protected = api.route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .route("/.well-known/oauth-authorization-server", get(handlers::handle_auth_server_metadata))
        .route("/.well-known/oauth-protected-resource", get(handlers::handle_protected_resource))
        .route(defaults::AUTHORIZATION_PATH, get(handlers::handle_authorize))
        .route(defaults::TOKEN_PATH, post(handlers::handle_token))
        .with_state(state)
        .nest("/api", protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The protected API shipped with the binary.
pub fn default_api() -> Router {
    Router::new().route("/me", get(whoami))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pkce-auth-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /api/me`: echo the validated token's principal.
async fn whoami(Extension(claims): Extension<AccessTokenClaims>) -> impl IntoResponse {
    Json(serde_json::json!({
        "sub": claims.sub,
        "client_id": claims.client_id,
        "scope": claims.scope,
        "exp": claims.exp
    }))
}
