//! Configuration for the PKCE authorization server.

use std::fmt;
use std::time::Duration;

use anyhow::Context;

/// Protocol defaults.
pub mod defaults {
    use std::time::Duration;

    /// Issuer, also the base URL advertised in discovery documents.
    pub const ISSUER: &str = "http://localhost:8000";

    /// Audience expected in access tokens.
    pub const AUDIENCE: &str = "mcp-api";

    /// Access token lifetime (60 minutes).
    pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

    /// Authorization code lifetime (10 minutes).
    pub const AUTH_CODE_TTL: Duration = Duration::from_secs(10 * 60);

    /// Clock drift tolerated when checking `exp`.
    pub const CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);

    /// The single client this server recognises.
    pub const CLIENT_ID: &str = "mcp-sample-client";

    /// Redirect URI used by the bundled flow client.
    pub const REDIRECT_URI: &str = "http://localhost:8080/callback";

    /// Scope granted when the request names none.
    pub const SCOPE: &str = "openid profile";

    /// Scopes advertised in discovery.
    pub const SCOPES_SUPPORTED: &[&str] = &["openid", "profile"];

    /// Authorization endpoint path.
    pub const AUTHORIZATION_PATH: &str = "/oauth/authorize";

    /// Token endpoint path.
    pub const TOKEN_PATH: &str = "/oauth/token";

    /// Subject recorded on every code; there is no login step.
    pub const SUBJECT: &str = "demo-user";

    /// Minimum HS256 key length in bytes.
    pub const MIN_SIGNING_KEY_LEN: usize = 32;
}

/// HMAC signing secret. Never printed.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Wrap a secret, rejecting keys shorter than 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the key is too short for HS256.
    pub fn new(secret: impl Into<Vec<u8>>) -> anyhow::Result<Self> {
        let secret = secret.into();
        anyhow::ensure!(
            secret.len() >= defaults::MIN_SIGNING_KEY_LEN,
            "signing key must be at least {} bytes, got {}",
            defaults::MIN_SIGNING_KEY_LEN,
            secret.len()
        );
        Ok(Self(secret))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey([redacted])")
    }
}

/// OAuth configuration, immutable once the server starts.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Shared HS256 secret.
    pub signing_key: SigningKey,

    /// `iss` claim and base URL for endpoint announcements.
    pub issuer: String,

    /// `aud` claim.
    pub audience: String,

    /// Access token lifetime.
    pub access_token_ttl: Duration,

    /// Authorization code lifetime.
    pub auth_code_ttl: Duration,

    /// Leeway applied to `exp` during validation.
    pub clock_skew: Duration,

    /// The client allowed to request authorization.
    pub default_client_id: String,

    /// Scopes advertised in discovery.
    pub scopes_supported: Vec<String>,
}

impl OAuthConfig {
    /// Create a configuration with the given key and protocol defaults.
    #[must_use]
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            issuer: defaults::ISSUER.to_string(),
            audience: defaults::AUDIENCE.to_string(),
            access_token_ttl: defaults::ACCESS_TOKEN_TTL,
            auth_code_ttl: defaults::AUTH_CODE_TTL,
            clock_skew: defaults::CLOCK_SKEW,
            default_client_id: defaults::CLIENT_ID.to_string(),
            scopes_supported: defaults::SCOPES_SUPPORTED.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Override the issuer. Trailing slashes are dropped.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Override the access token lifetime.
    #[must_use]
    pub const fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Override the authorization code lifetime.
    #[must_use]
    pub const fn with_auth_code_ttl(mut self, ttl: Duration) -> Self {
        self.auth_code_ttl = ttl;
        self
    }

    /// Override the accepted client.
    #[must_use]
    pub fn with_default_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.default_client_id = client_id.into();
        self
    }

    /// Absolute URL of the authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        format!("{}{}", self.issuer, defaults::AUTHORIZATION_PATH)
    }

    /// Absolute URL of the token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}{}", self.issuer, defaults::TOKEN_PATH)
    }

    /// Absolute URL of the protected resource metadata document.
    #[must_use]
    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.issuer)
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,

    /// OAuth settings.
    pub oauth: OAuthConfig,
}

impl Config {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(port: u16, oauth: OAuthConfig) -> Self {
        Self { port, oauth }
    }

    /// Create a configuration for tests with a fixed key.
    #[must_use]
    pub fn for_testing(issuer: &str) -> Self {
        let key = SigningKey(b"test-signing-key-0123456789abcdef0123456789".to_vec());
        Self { port: 0, oauth: OAuthConfig::new(key).with_issuer(issuer) }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if `OAUTH_SIGNING_KEY` is missing or too short, or a
    /// numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = std::env::var("OAUTH_SIGNING_KEY")
            .context("OAUTH_SIGNING_KEY must be set")?;
        let mut oauth = OAuthConfig::new(SigningKey::new(secret)?);

        if let Ok(issuer) = std::env::var("OAUTH_ISSUER") {
            oauth = oauth.with_issuer(issuer);
        }
        if let Ok(audience) = std::env::var("OAUTH_AUDIENCE") {
            oauth = oauth.with_audience(audience);
        }
        if let Ok(client_id) = std::env::var("OAUTH_DEFAULT_CLIENT_ID") {
            oauth = oauth.with_default_client_id(client_id);
        }
        if let Some(minutes) = env_minutes("OAUTH_ACCESS_TOKEN_TTL_MINUTES")? {
            oauth = oauth.with_access_token_ttl(minutes);
        }
        if let Some(minutes) = env_minutes("OAUTH_AUTH_CODE_TTL_MINUTES")? {
            oauth = oauth.with_auth_code_ttl(minutes);
        }

        let port = match std::env::var("PORT") {
            Ok(port) => port.parse().context("PORT must be a port number")?,
            Err(_) => 8000,
        };

        Ok(Self::new(port, oauth))
    }
}

fn env_minutes(name: &str) -> anyhow::Result<Option<Duration>> {
    std::env::var(name).ok().map(|raw| parse_minutes(name, &raw)).transpose()
}

/// Parse a lifetime in whole minutes. Seconds must fit an `i64` JWT timestamp.
fn parse_minutes(name: &str, raw: &str) -> anyhow::Result<Duration> {
    let minutes = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{name} must be a whole number of minutes"))?;
    let secs = minutes
        .checked_mul(60)
        .filter(|secs| i64::try_from(*secs).is_ok())
        .with_context(|| format!("{name} is too large: {minutes} minutes"))?;
    Ok(Duration::from_secs(secs))
}
