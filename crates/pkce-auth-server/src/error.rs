//! Error types for the PKCE authorization server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! [`OAuthError`] is the server-side taxonomy and renders itself as the OAuth
//! `{error, error_description?}` JSON body; [`ClientError`] covers the flow client.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::server::oauth::types::ErrorBody;

/// The operating system's secure random source could not be read.
#[derive(thiserror::Error, Debug)]
#[error("Secure random source unavailable: {0}")]
pub struct EntropyError(#[from] rand::Error);

/// Errors surfaced by the authorization server endpoints.
#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    /// Malformed or missing request parameter. Never redirected.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `response_type` other than `code`.
    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// `client_id` is not known to this server.
    #[error("Unknown client: {0}")]
    InvalidClient(String),

    /// PKCE method other than `S256`.
    #[error("Unsupported code challenge method: {0}")]
    UnsupportedChallengeMethod(String),

    /// Code missing, expired, mismatched or failing PKCE. Deliberately undifferentiated.
    #[error("Invalid grant")]
    InvalidGrant,

    /// `grant_type` other than `authorization_code`.
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Bearer token failed validation at a protected resource.
    #[error("Unauthorized")]
    Unauthorized,

    /// Random source failure while minting a code.
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// Token signing failed.
    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl OAuthError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    /// Create an unsupported challenge method error.
    #[must_use]
    pub fn unsupported_challenge_method(method: impl Into<String>) -> Self {
        Self::UnsupportedChallengeMethod(method.into())
    }

    /// The RFC 6749 error code placed in the `error` field.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedChallengeMethod(_) => "invalid_request",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::Unauthorized => "invalid_token",
            Self::Entropy(_) | Self::Signing(_) => "server_error",
        }
    }

    /// Human readable `error_description`, if this error may carry one.
    ///
    /// Grant and token failures never describe which check failed.
    #[must_use]
    pub fn description(&self) -> Option<String> {
        match self {
            Self::InvalidRequest(description) => Some(description.clone()),
            Self::UnsupportedResponseType(_) => Some("response_type must be 'code'".to_owned()),
            Self::InvalidClient(_) => Some("unknown client_id".to_owned()),
            Self::UnsupportedChallengeMethod(_) => {
                Some("code_challenge_method must be 'S256'".to_owned())
            }
            Self::UnsupportedGrantType(_) => {
                Some("grant_type must be 'authorization_code'".to_owned())
            }
            Self::InvalidGrant | Self::Unauthorized | Self::Entropy(_) | Self::Signing(_) => None,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Entropy(_) | Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Returns true for failures caused by the caller rather than the server.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Entropy(_) | Self::Signing(_))
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if !self.is_client_error() {
            tracing::error!(error = %self, "Authorization server failure");
        }

        let body = ErrorBody { error: self.error_code(), error_description: self.description() };
        let mut response = (self.status_code(), Json(body)).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if matches!(self, Self::Unauthorized) {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Errors from the flow client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// A URL could not be parsed or built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Form body could not be encoded
    #[error("Failed to encode form: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    /// JSON parsing error
    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// PKCE material could not be generated
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// The server answered with an OAuth error body
    #[error("OAuth error ({status}): {error}")]
    OAuth {
        /// HTTP status code
        status: u16,
        /// RFC 6749 error code
        error: String,
        /// Optional error description
        description: Option<String>,
    },

    /// The authorization endpoint did not redirect back with a code
    #[error("Invalid authorization redirect: {0}")]
    InvalidRedirect(String),

    /// The discovery document does not describe a usable server
    #[error("Unusable discovery document: {0}")]
    Discovery(String),

    /// The `state` echoed by the server does not match the one sent
    #[error("State mismatch in authorization response")]
    StateMismatch,

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ClientError {
    /// Create an invalid redirect error.
    #[must_use]
    pub fn invalid_redirect(message: impl Into<String>) -> Self {
        Self::InvalidRedirect(message.into())
    }

    /// The OAuth error code, if the server returned one.
    #[must_use]
    pub fn oauth_error(&self) -> Option<&str> {
        match self {
            Self::OAuth { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Result type alias for server operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
