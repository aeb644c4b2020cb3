//! HS256 access tokens.
//!
//! Tokens are stateless: everything needed to accept one is in its claims
//! and the shared signing key. There is no token table and no revocation.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::types::TokenResponse;
use crate::config::OAuthConfig;
use crate::error::{OAuthError, OAuthResult};

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// A freshly signed token and its lifetime in seconds.
#[derive(Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

impl IssuedToken {
    /// Build the token endpoint response body.
    #[must_use]
    pub fn into_response(self, scope: impl Into<String>) -> TokenResponse {
        TokenResponse {
            access_token: self.access_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.expires_in,
            scope: Some(scope.into()),
        }
    }
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken").field("expires_in", &self.expires_in).finish_non_exhaustive()
    }
}

/// Mints access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
    issuer: String,
    audience: String,
    ttl_secs: u64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl_secs: config.access_token_ttl.as_secs(),
        }
    }

    /// Sign a token for `subject` issued now.
    pub fn issue(&self, subject: &str, client_id: &str, scope: &str) -> OAuthResult<IssuedToken> {
        self.issue_at(subject, client_id, scope, Utc::now())
    }

    /// Sign a token with an explicit issue time.
    pub fn issue_at(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        issued_at: DateTime<Utc>,
    ) -> OAuthResult<IssuedToken> {
        let iat = issued_at.timestamp();
        let claims = AccessTokenClaims {
            sub: subject.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX)),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| OAuthError::Signing(e.to_string()))?;

        Ok(IssuedToken { access_token, expires_in: self.ttl_secs })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

/// Accepts or rejects bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    #[must_use]
    pub fn new(config: &OAuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self { key: DecodingKey::from_secret(config.signing_key.as_bytes()), validation }
    }

    /// Verify signature, issuer, audience and expiry.
    ///
    /// Every failure is `Unauthorized`; the cause is only logged.
    pub fn validate(&self, token: &str) -> OAuthResult<AccessTokenClaims> {
        decode::<AccessTokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected access token");
                OAuthError::Unauthorized
            })
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").finish_non_exhaustive()
    }
}
