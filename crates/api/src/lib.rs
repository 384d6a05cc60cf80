//! HTTP API for Smart Buddy.
//!
//! # Endpoints
//!
//! - `GET /health` - liveness, version, uptime (never needs auth)
//! - `POST /chat`, `POST /api/v1/chat` - run one chat turn
//! - `GET /metrics` - observability snapshot
//! - `GET /api/v1/events?limit=N` - recent sink events, newest first
//! - `GET /api/v1/records/{namespace}/{user_id}` - list a namespace
//! - `GET /api/v1/tasks/{user_id}`, `GET /api/v1/events/{user_id}` - shortcuts
//! - `DELETE /api/v1/records/{namespace}/{user_id}/{key}` - explicit deletion
//!
//! ```text
//! HTTP client
//!    │  bearer auth (optional)
//!    ▼
//! ┌─────────────────┐
//! │   axum Router   │
//! └────────┬────────┘
//!          │ tokio::spawn per turn
//!          ▼
//!   buddy_coordinator::Router ──▶ agents, memory, sink
//! ```

pub mod auth;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{ApiKey, API_KEY_ENV};
pub use state::AppState;

fn cors_layer(origins: Option<Vec<String>>) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        Some(origins) if !origins.iter().any(|o| o == "*") => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring unparseable CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(parsed)
        }
        _ => base.allow_origin(Any),
    }
}

/// Build the HTTP router. `cors_origins` of `None` or containing `*` allows
/// any origin.
pub fn create_router(state: Arc<AppState>, cors_origins: Option<Vec<String>>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/chat", post(routes::chat))
        .route("/api/v1/chat", post(routes::chat))
        .route("/metrics", get(routes::metrics))
        .route("/api/v1/events", get(routes::recent_events))
        .route("/api/v1/events/{user_id}", get(routes::list_events))
        .route("/api/v1/tasks/{user_id}", get(routes::list_tasks))
        .route("/api/v1/records/{namespace}/{user_id}", get(routes::list_records))
        .route(
            "/api/v1/records/{namespace}/{user_id}/{key}",
            delete(routes::delete_record),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Serve until the process is stopped or Ctrl-C arrives.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    cors_origins: Option<Vec<String>>,
) -> anyhow::Result<()> {
    let router = create_router(state, cors_origins);

    info!(%addr, "Starting Smart Buddy API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;
    Ok(())
}
