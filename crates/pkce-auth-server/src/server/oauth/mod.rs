//! OAuth 2.1 authorization server with mandatory PKCE.
//!
//! Every authorization request from the configured client is auto-approved;
//! the protocol checks live in code redemption and token validation.
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7636: PKCE (S256 only)
//! - RFC 6749 / OAuth 2.1: Authorization Code Grant
//! - RFC 7519: JWT access tokens (HS256)

pub mod client;
pub mod handlers;
pub mod middleware;
pub mod pkce;
pub mod store;
pub mod token;
pub mod types;

pub use client::OAuthClient;
pub use pkce::PkcePair;
pub use store::AuthCodeStore;
pub use token::{AccessTokenClaims, TokenIssuer, TokenValidator};
