//! HTTP server for deskd.

use crate::config::DeskConfig;
use crate::middleware::{self, RateLimiter};
use crate::{auth, routes};
use anyhow::Result;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use desk_common::{IdempotencyCache, TicketStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<TicketStore>,
    pub idempotency: IdempotencyCache,
    pub config: DeskConfig,
    pub start_time: Instant,
}

pub type AppStateArc = Arc<AppState>;

impl AppState {
    pub fn new(store: TicketStore, config: DeskConfig) -> Self {
        let ttl = Duration::from_secs(config.limits.idempotency_ttl_secs);
        Self {
            store: Arc::new(store),
            idempotency: IdempotencyCache::new(ttl),
            config,
            start_time: Instant::now(),
        }
    }
}

/// Assemble the full router with middleware stack
pub fn build_router(state: AppStateArc) -> Router {
    // Everything except health sits behind principal resolution
    let api = Router::new()
        .merge(routes::ticket_routes())
        .merge(routes::user_routes())
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth));

    let rate_limiting = state.config.limits.rate_limiting;
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let mut app = Router::new()
        .merge(routes::health_routes())
        .merge(api)
        .fallback(routes::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(middleware::body_size_limit))
        .layer(CorsLayer::permissive());

    if rate_limiting {
        app = app.layer(from_fn_with_state(
            RateLimiter::new(),
            middleware::rate_limit_middleware,
        ));
    }

    app
}

/// Run the HTTP server until shutdown
pub async fn run(state: AppStateArc) -> Result<()> {
    let addr = state.config.server.bind.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
