//! Request middleware: body size cap and rate limiting.

use crate::auth::mask_token;
use crate::error::raw_error_body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Maximum body size: 64 KiB
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Burst tier: 20 requests in 10 seconds
pub const RATE_LIMIT_BURST_REQUESTS: usize = 20;
pub const RATE_LIMIT_BURST_WINDOW: Duration = Duration::from_secs(10);

/// Sustained tier: 60 requests per minute
pub const RATE_LIMIT_SUSTAINED_REQUESTS: usize = 60;
pub const RATE_LIMIT_SUSTAINED_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by peer IP and by auth token
#[derive(Clone, Default)]
pub struct RateLimiter {
    peer_requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    token_requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and record a request for `peer_addr`
    pub async fn check_peer_rate_limit(&self, peer_addr: &str) -> bool {
        let mut requests = self.peer_requests.write().await;
        Self::check_window(requests.entry(peer_addr.to_string()).or_default(), || {
            warn!("Peer rate limit exceeded for {}", peer_addr);
        })
    }

    /// Check and record a request for `token`
    pub async fn check_token_rate_limit(&self, token: &str) -> bool {
        let mut requests = self.token_requests.write().await;
        Self::check_window(requests.entry(token.to_string()).or_default(), || {
            warn!("Token rate limit exceeded for {}", mask_token(token));
        })
    }

    fn check_window(timestamps: &mut Vec<Instant>, log_violation: impl Fn()) -> bool {
        let now = Instant::now();

        let burst = timestamps
            .iter()
            .filter(|&&ts| now.duration_since(ts) < RATE_LIMIT_BURST_WINDOW)
            .count();
        if burst >= RATE_LIMIT_BURST_REQUESTS {
            log_violation();
            return false;
        }

        let sustained = timestamps
            .iter()
            .filter(|&&ts| now.duration_since(ts) < RATE_LIMIT_SUSTAINED_WINDOW)
            .count();
        if sustained >= RATE_LIMIT_SUSTAINED_REQUESTS {
            log_violation();
            return false;
        }

        timestamps.retain(|&ts| now.duration_since(ts) < RATE_LIMIT_SUSTAINED_WINDOW);
        timestamps.push(now);
        true
    }

    /// Drop stale entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        for map in [&self.peer_requests, &self.token_requests] {
            let mut requests = map.write().await;
            requests.retain(|_, timestamps| {
                timestamps.retain(|&ts| now.duration_since(ts) < RATE_LIMIT_SUSTAINED_WINDOW);
                !timestamps.is_empty()
            });
        }
        debug!("Rate limiter cleanup done");
    }
}

/// Per-peer and per-token rate limiting, 429 on violation
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer_addr = extract_peer_addr(&request);

    if !limiter.check_peer_rate_limit(&peer_addr).await {
        return rate_limited_response();
    }

    if let Some(token) = bearer_token(&request) {
        if !limiter.check_token_rate_limit(&token).await {
            return rate_limited_response();
        }
    }

    next.run(request).await
}

fn rate_limited_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(raw_error_body(
            "RATE_LIMIT",
            "Too many requests, please try again later.",
        )),
    )
        .into_response()
}

/// Reject requests whose declared body exceeds `MAX_BODY_SIZE`
pub async fn body_size_limit(request: Request, next: Next) -> Response {
    if let Some(length) = request
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > MAX_BODY_SIZE {
            warn!("Request body too large: {} bytes (max {})", length, MAX_BODY_SIZE);
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(raw_error_body("PAYLOAD_TOO_LARGE", "Request body too large")),
            )
                .into_response();
        }
    }
    next.run(request).await
}

/// Peer address from X-Forwarded-For, falling back to a shared bucket
fn extract_peer_addr(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }
    "unknown".to_string()
}

fn bearer_token(request: &Request) -> Option<String> {
    let auth = request.headers().get("authorization")?.to_str().ok()?;
    Some(
        auth.strip_prefix("Bearer ")
            .unwrap_or(auth)
            .trim()
            .to_string(),
    )
    .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peer_burst_limit() {
        let limiter = RateLimiter::new();

        for i in 1..=RATE_LIMIT_BURST_REQUESTS {
            assert!(
                limiter.check_peer_rate_limit("127.0.0.1").await,
                "request {} should be within the burst limit",
                i
            );
        }
        assert!(!limiter.check_peer_rate_limit("127.0.0.1").await);

        // Another peer is unaffected
        assert!(limiter.check_peer_rate_limit("127.0.0.2").await);
    }

    #[tokio::test]
    async fn test_token_burst_limit() {
        let limiter = RateLimiter::new();

        for _ in 0..RATE_LIMIT_BURST_REQUESTS {
            assert!(limiter.check_token_rate_limit("tok-1").await);
        }
        assert!(!limiter.check_token_rate_limit("tok-1").await);
        assert!(limiter.check_token_rate_limit("tok-2").await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent() {
        let limiter = RateLimiter::new();
        for i in 0..5 {
            limiter
                .check_peer_rate_limit(&format!("10.0.0.{}", i))
                .await;
        }
        limiter.cleanup().await;
        assert_eq!(limiter.peer_requests.read().await.len(), 5);
    }
}
