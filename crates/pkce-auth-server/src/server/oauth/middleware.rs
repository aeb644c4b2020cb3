//! Bearer token enforcement for protected routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::error::OAuthError;
use crate::server::transport::HttpState;

/// Reject requests without a valid `Authorization: Bearer` token.
///
/// On success the decoded [`AccessTokenClaims`](super::token::AccessTokenClaims)
/// are placed in the request extensions for downstream handlers.
pub async fn require_bearer(
    State(state): State<Arc<HttpState>>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Response {
    // Missing header and non-Bearer schemes both land here
    let TypedHeader(Authorization(bearer)) = match bearer {
        Ok(header) => header,
        Err(rejection) => {
            tracing::debug!(reason = %rejection, "Rejected authorization header");
            return unauthorized(&state);
        }
    };

    match state.validator.validate(bearer.token()) {
        Ok(claims) => {
            tracing::debug!(client_id = %claims.client_id, sub = %claims.sub, "Accepted bearer token");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(_) => unauthorized(&state),
    }
}

fn unauthorized(state: &HttpState) -> Response {
    let mut response = OAuthError::Unauthorized.into_response();
    let challenge = format!(
        "Bearer resource_metadata=\"{}\"",
        state.config.resource_metadata_url()
    );
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
    }
    response
}
