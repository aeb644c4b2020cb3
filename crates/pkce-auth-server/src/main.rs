//! PKCE Authorization Server - Entry Point
//!
//! `serve` runs the authorization server; `login` drives the full
//! authorization code flow against a running server.

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pkce_auth_server::{
    config::{Config, defaults},
    server::{AuthServer, oauth::OAuthClient, oauth::pkce},
};

#[derive(Parser, Debug)]
#[command(name = "pkce-auth-server")]
#[command(about = "OAuth 2.1 authorization server with mandatory PKCE")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the authorization server
    ///
    /// Settings come from OAUTH_* environment variables (or `.env`).
    Serve {
        /// HTTP server port
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Issuer and public base URL (e.g., https://auth.example.com)
        #[arg(long, env = "OAUTH_ISSUER")]
        issuer: Option<String>,
    },

    /// Run discovery, authorize and token exchange, then call `/api/me`
    Login {
        /// Base URL of the authorization server
        #[arg(long, default_value = defaults::ISSUER)]
        base_url: String,

        /// Client identifier
        #[arg(long, default_value = defaults::CLIENT_ID)]
        client_id: String,

        /// Redirect URI registered for the client
        #[arg(long, default_value = defaults::REDIRECT_URI)]
        redirect_uri: String,

        /// Requested scope
        #[arg(long, default_value = defaults::SCOPE)]
        scope: String,
    },
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    // Without a secure random source no code or verifier can be minted
    if let Err(e) = pkce::random_urlsafe() {
        tracing::error!(error = %e, "Secure random source unavailable");
        return Err(e.into());
    }

    match cli.command {
        Command::Serve { port, issuer } => {
            let mut config = Config::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(issuer) = issuer {
                config.oauth = config.oauth.with_issuer(issuer);
            }

            tracing::info!(version = env!("CARGO_PKG_VERSION"), port = config.port, "Starting PKCE authorization server");
            AuthServer::new(config).run_http().await?;
        }
        Command::Login { base_url, client_id, redirect_uri, scope } => {
            let client = OAuthClient::new(&base_url, client_id)?;
            let token = client.run_flow(&redirect_uri, &scope).await?;
            let me = client.get_protected("/api/me", &token.access_token).await?;

            tracing::info!(scope = ?token.scope, "Authorization code flow complete");
            println!("{}", serde_json::to_string_pretty(&me)?);
        }
    }

    Ok(())
}
