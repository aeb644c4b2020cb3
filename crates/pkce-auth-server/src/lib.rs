//! PKCE Authorization Server
//!
//! An OAuth 2.1 authorization server with mandatory PKCE (S256) that mints
//! HS256 JWT access tokens and guards an API behind bearer authorization.
//!
//! # Features
//!
//! - **Single-use codes**: redemption removes the code before any check runs
//! - **Stateless tokens**: signature, `iss`, `aud` and `exp` carry all validity
//! - **Discovery**: RFC 8414 and RFC 9728 metadata documents
//! - **Flow client**: drives discovery, authorize and token exchange end to end
//!
//! # Example
//!
//! ```no_run
//! use pkce_auth_server::{config::Config, server::AuthServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     AuthServer::new(config).run_http().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;

pub use config::{Config, OAuthConfig, SigningKey};
pub use error::{ClientError, OAuthError};
pub use server::AuthServer;
