//! Client side of the authorization code flow.
//!
//! Walks discovery → PKCE → authorize → token exchange → protected call
//! against a running server. The authorize step is auto-approved server-side,
//! so the redirect is read straight from the `Location` header.

use std::time::Duration;

use reqwest::{Client, StatusCode, header, redirect};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;
use url::Url;

use super::pkce::{CodeChallengeMethod, PkcePair};
use super::types::{AuthorizationServerMetadata, ErrorResponse, TokenRequest, TokenResponse};
use crate::config::defaults;
use crate::error::{ClientError, ClientResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth 2.1 PKCE client for a single server and client id.
#[derive(Clone)]
pub struct OAuthClient {
    /// Never follows redirects and never retries: codes are single-use.
    http: Client,
    /// Retrying client for idempotent metadata reads.
    discovery: ClientWithMiddleware,
    base_url: Url,
    client_id: String,
}

impl OAuthClient {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, client_id: impl Into<String>) -> ClientResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;

        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(5))
            .build_with_max_retries(3);
        let discovery = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { http, discovery, base_url, client_id: client_id.into() })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Fetch `/.well-known/oauth-authorization-server`.
    pub async fn discover(&self) -> ClientResult<AuthorizationServerMetadata> {
        let url = self.base_url.join("/.well-known/oauth-authorization-server")?;
        let response = self.discovery.get(url).send().await?;
        read_json(response).await
    }

    /// Build the authorization request URL.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
        scope: &str,
    ) -> ClientResult<Url> {
        let mut url = self.base_url.join(defaults::AUTHORIZATION_PATH)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", CodeChallengeMethod::S256.as_str());
        Ok(url)
    }

    /// Visit the authorization URL and return the code from the redirect.
    ///
    /// Fails with [`ClientError::StateMismatch`] if the echoed `state` differs.
    pub async fn authorize(&self, authorization_url: Url, expected_state: &str) -> ClientResult<String> {
        let response = self.http.get(authorization_url).send().await?;

        if !response.status().is_redirection() {
            return Err(error_from(response).await);
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ClientError::invalid_redirect("missing Location header"))?;
        let location = Url::parse(location)?;

        let mut code = None;
        let mut state = None;
        for (key, value) in location.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        if state.as_deref() != Some(expected_state) {
            return Err(ClientError::StateMismatch);
        }
        code.filter(|c| !c.is_empty())
            .ok_or_else(|| ClientError::invalid_redirect("redirect carries no code"))
    }

    /// Exchange an authorization code and verifier for an access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> ClientResult<TokenResponse> {
        let form = TokenRequest {
            grant_type: "authorization_code".to_owned(),
            code: Some(code.to_owned()),
            redirect_uri: Some(redirect_uri.to_owned()),
            client_id: Some(self.client_id.clone()),
            code_verifier: Some(code_verifier.to_owned()),
        };
        let body = serde_urlencoded::to_string(&form)?;

        let response = self
            .http
            .post(self.base_url.join(defaults::TOKEN_PATH)?)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        read_json(response).await
    }

    /// Call a protected endpoint with a bearer token.
    pub async fn get_protected(&self, path: &str, access_token: &str) -> ClientResult<serde_json::Value> {
        let response = self
            .http
            .get(self.base_url.join(path)?)
            .bearer_auth(access_token)
            .send()
            .await?;
        read_json(response).await
    }

    /// Run the whole flow and return the issued token.
    pub async fn run_flow(&self, redirect_uri: &str, scope: &str) -> ClientResult<TokenResponse> {
        let metadata = self.discover().await?;
        tracing::info!(
            issuer = %metadata.issuer,
            authorization_endpoint = %metadata.authorization_endpoint,
            token_endpoint = %metadata.token_endpoint,
            "Discovered authorization server"
        );
        if !metadata.code_challenge_methods_supported.iter().any(|m| m == "S256") {
            return Err(ClientError::Discovery("server does not support S256".to_owned()));
        }

        let pkce = PkcePair::generate()?;
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorization_url(redirect_uri, &state, &pkce.challenge, scope)?;

        let code = self.authorize(url, &state).await?;
        tracing::info!("Received authorization code");

        let token = self.exchange_code(&code, redirect_uri, &pkce.verifier).await?;
        tracing::info!(expires_in = token.expires_in, "Obtained access token");
        Ok(token)
    }
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::from)
}

async fn error_from(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return ClientError::Http(e),
    };

    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => ClientError::OAuth {
            status: status.as_u16(),
            error: err.error,
            description: err.error_description,
        },
        Err(_) if status == StatusCode::UNAUTHORIZED => ClientError::OAuth {
            status: status.as_u16(),
            error: "invalid_token".to_owned(),
            description: None,
        },
        Err(_) => ClientError::UnexpectedStatus { status: status.as_u16(), message: body },
    }
}
