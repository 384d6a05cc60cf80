//! Smart Buddy API server binary.
//!
//! Usage:
//!   buddy-api --config buddy.toml
//!   buddy-api --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `BUDDY_API_KEY` - bearer token required by every endpoint but `/health`
//! - `BUDDY_BIND_ADDR` - bind address (default: 127.0.0.1)
//! - `BUDDY_CORS_ORIGINS` - allowed CORS origins, comma-separated
//! - `OPENAI_API_KEY` / `GOOGLE_API_KEY` - LLM credentials

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use buddy_api::{serve, ApiKey, AppState};
use buddy_coordinator::BuddyConfig;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "buddy-api", version, about = "Smart Buddy chat server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Address to bind
    #[arg(short, long, env = "BUDDY_BIND_ADDR", default_value = "127.0.0.1")]
    bind: String,

    /// Allowed CORS origins, comma-separated
    #[arg(long, env = "BUDDY_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,buddy_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.bind == "0.0.0.0" {
        warn!(
            "Binding to 0.0.0.0 exposes the API on every interface. \
             Set BUDDY_API_KEY and keep a firewall in front of it."
        );
    }

    let config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            BuddyConfig::from_file(path)?
        }
        None => {
            info!("Using default configuration");
            let mut config = BuddyConfig::default();
            config.resolve_api_keys();
            config
        }
    };

    let mut state = AppState::from_config(&config)
        .await
        .context("failed to build Smart Buddy context")?;

    match ApiKey::from_env() {
        Some(key) => {
            state = state.with_api_key(key);
            info!("API key authentication enabled");
        }
        None => warn!(
            "BUDDY_API_KEY not set; the API runs without authentication. \
             Fine for local development, not for anything reachable by others."
        ),
    }

    let state = Arc::new(state);
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("invalid bind address")?;
    serve(state.clone(), addr, args.cors_origins).await?;

    state.context().shutdown().await;
    Ok(())
}
