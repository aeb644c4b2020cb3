//! In-memory authorization code store.
//!
//! Codes are single-use: redemption removes the record under the lock before
//! any check runs, so a code is gone whether the exchange succeeds or not and
//! two concurrent redeemers can never both see it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::pkce::{self, CodeChallengeMethod};
use super::types::AuthorizationCode;
use crate::config::defaults;
use crate::error::{OAuthError, OAuthResult};

/// Cleanup interval: 1 minute.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Pending authorization codes keyed by code value.
#[derive(Clone)]
pub struct AuthCodeStore {
    codes: Arc<Mutex<HashMap<String, AuthorizationCode>>>,
    ttl: TimeDelta,
}

impl AuthCodeStore {
    /// Create a store whose codes live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Arc::new(Mutex::new(HashMap::new())),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Record an approved authorization request and return its code.
    pub async fn issue(
        &self,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
        code_challenge_method: &str,
        scope: &str,
    ) -> OAuthResult<String> {
        let method: CodeChallengeMethod = code_challenge_method.parse()?;

        loop {
            let code = pkce::random_urlsafe()?;
            let mut codes = self.codes.lock().await;
            if codes.contains_key(&code) {
                continue;
            }

            codes.insert(
                code.clone(),
                AuthorizationCode {
                    code: code.clone(),
                    client_id: client_id.to_owned(),
                    redirect_uri: redirect_uri.to_owned(),
                    code_challenge: code_challenge.to_owned(),
                    code_challenge_method: method,
                    scope: scope.to_owned(),
                    subject: defaults::SUBJECT.to_owned(),
                    expires_at: self.expiry_from(Utc::now()),
                },
            );
            return Ok(code);
        }
    }

    /// Consume a code for the `(client_id, redirect_uri)` that requested it.
    ///
    /// Every failure is `InvalidGrant`; the code is removed either way.
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> OAuthResult<AuthorizationCode> {
        let record = self.codes.lock().await.remove(code).ok_or(OAuthError::InvalidGrant)?;

        if record.is_expired_at(Utc::now()) {
            tracing::debug!(client_id = %record.client_id, "Rejected expired authorization code");
            return Err(OAuthError::InvalidGrant);
        }

        if record.client_id != client_id || record.redirect_uri != redirect_uri {
            tracing::debug!(client_id = %client_id, "Rejected code for mismatched client or redirect_uri");
            return Err(OAuthError::InvalidGrant);
        }

        if !pkce::verify(
            &record.code_challenge,
            record.code_challenge_method.as_str(),
            code_verifier,
        ) {
            tracing::debug!(client_id = %client_id, "Rejected code with failing PKCE verifier");
            return Err(OAuthError::InvalidGrant);
        }

        Ok(record)
    }

    /// Drop every expired code. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut codes = self.codes.lock().await;
        let before = codes.len();
        codes.retain(|_, code| !code.is_expired_at(now));
        let removed = before - codes.len();
        if removed > 0 {
            tracing::debug!(count = removed, "Cleaned up expired authorization codes");
        }
        removed
    }

    /// Start background cleanup task for expired codes.
    pub fn start_cleanup_task(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                store.purge_expired().await;
            }
        })
    }

    /// Number of codes awaiting exchange.
    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }

    /// True when no code is pending.
    pub async fn is_empty(&self) -> bool {
        self.codes.lock().await.is_empty()
    }
}

impl Default for AuthCodeStore {
    fn default() -> Self {
        Self::new(defaults::AUTH_CODE_TTL)
    }
}

impl std::fmt::Debug for AuthCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCodeStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
