//! OAuth 2.1 endpoint handlers.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7636: PKCE (S256 only)
//! - OAuth 2.1 Authorization Code Grant

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use url::Url;

use super::pkce::CodeChallengeMethod;
use super::types::{
    AuthorizationServerMetadata, AuthorizeQuery, ProtectedResourceMetadata, TokenRequest,
    TokenResponse,
};
use crate::config::defaults;
use crate::error::{OAuthError, OAuthResult};
use crate::server::transport::HttpState;

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(ProtectedResourceMetadata {
        resource: state.config.issuer.clone(),
        authorization_servers: vec![state.config.issuer.clone()],
        bearer_methods_supported: vec!["header".to_owned()],
        scopes_supported: state.config.scopes_supported.clone(),
    })
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
///
/// Describes the OAuth endpoints and capabilities.
pub async fn handle_auth_server_metadata(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(AuthorizationServerMetadata {
        issuer: state.config.issuer.clone(),
        authorization_endpoint: state.config.authorization_endpoint(),
        token_endpoint: state.config.token_endpoint(),
        response_types_supported: vec!["code".to_owned()],
        grant_types_supported: vec!["authorization_code".to_owned()],
        code_challenge_methods_supported: vec![CodeChallengeMethod::S256.to_string()],
        scopes_supported: state.config.scopes_supported.clone(),
    })
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// `GET /oauth/authorize`
///
/// Auto-approve the authorization request. There is no login or consent step:
/// any request from the configured client carrying an S256 challenge gets a
/// code. Request-shape errors answer 400 JSON and never redirect.
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    query: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Response {
    let result = match query {
        Ok(Query(query)) => authorize(&state, query).await,
        Err(rejection) => Err(OAuthError::invalid_request(rejection.body_text())),
    };

    match result {
        Ok(location) => {
            let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
            response.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(err) => {
            tracing::info!(error = %err, "Rejected authorization request");
            err.into_response()
        }
    }
}

async fn authorize(state: &HttpState, query: AuthorizeQuery) -> OAuthResult<String> {
    let response_type = required(query.response_type.as_deref(), "response_type")?;
    if response_type != "code" {
        return Err(OAuthError::UnsupportedResponseType(response_type.to_owned()));
    }

    let client_id = required(query.client_id.as_deref(), "client_id")?;
    if client_id != state.config.default_client_id {
        return Err(OAuthError::InvalidClient(client_id.to_owned()));
    }

    let redirect_uri = required(query.redirect_uri.as_deref(), "redirect_uri")?;
    let mut location = Url::parse(redirect_uri)
        .map_err(|_| OAuthError::invalid_request("redirect_uri must be an absolute URL"))?;

    let code_challenge = required(query.code_challenge.as_deref(), "code_challenge")?;

    // RFC 7636 §4.3: an absent method means "plain"
    let method = query.code_challenge_method.as_deref().unwrap_or("plain");
    method.parse::<CodeChallengeMethod>()?;

    let scope = query.scope.as_deref().filter(|s| !s.is_empty()).unwrap_or(defaults::SCOPE);

    let code = state.codes.issue(client_id, redirect_uri, code_challenge, method, scope).await?;

    tracing::info!(client_id = %client_id, scope = %scope, "Auto-approved authorization");

    {
        let mut pairs = location.query_pairs_mut();
        pairs.append_pair("code", &code);
        if let Some(ref oauth_state) = query.state {
            pairs.append_pair("state", oauth_state);
        }
    }

    Ok(location.into())
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /oauth/token`
///
/// Exchange an authorization code and its PKCE verifier for an access token.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let result = match form {
        Ok(Form(form)) => exchange(&state, &form).await,
        Err(rejection) => Err(OAuthError::invalid_request(rejection.body_text())),
    };

    match result {
        Ok(body) => token_success(body),
        Err(err) => {
            tracing::info!(error = %err, "Rejected token request");
            err.into_response()
        }
    }
}

async fn exchange(state: &HttpState, form: &TokenRequest) -> OAuthResult<TokenResponse> {
    match form.grant_type.as_str() {
        "authorization_code" => {}
        "" => return Err(OAuthError::invalid_request("Missing grant_type")),
        other => return Err(OAuthError::UnsupportedGrantType(other.to_owned())),
    }

    let code = required(form.code.as_deref(), "code")?;
    let client_id = required(form.client_id.as_deref(), "client_id")?;
    let redirect_uri = required(form.redirect_uri.as_deref(), "redirect_uri")?;
    let code_verifier = required(form.code_verifier.as_deref(), "code_verifier")?;

    let record = state.codes.redeem(code, client_id, redirect_uri, code_verifier).await?;
    let issued = state.issuer.issue(&record.subject, &record.client_id, &record.scope)?;

    tracing::info!(client_id = %record.client_id, "Issued access token");

    Ok(issued.into_response(record.scope))
}

/// Build a token response with required cache headers (RFC 6749 §5.1).
fn token_success(body: TokenResponse) -> Response {
    let mut response = Json(body).into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn required<'a>(value: Option<&'a str>, name: &str) -> OAuthResult<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| OAuthError::invalid_request(format!("Missing {name}")))
}
