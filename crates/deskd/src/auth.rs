//! Principal resolution middleware.
//!
//! Token issuance lives in the external auth system; this layer only
//! resolves `Authorization: Bearer <token>` against the provisioned
//! token table and attaches the resulting [`Principal`] to the request.

use crate::error::ApiError;
use crate::server::AppStateArc;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use desk_common::model::Principal;
use desk_common::DeskError;
use tracing::warn;

/// Resolve the caller or reject with 401
pub async fn require_auth(
    State(state): State<AppStateArc>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_auth_token(&request).ok_or(ApiError(DeskError::Unauthorized))?;

    let user = state
        .store
        .user_for_token(&token)
        .map_err(ApiError)?
        .ok_or_else(|| {
            warn!("Rejected unknown token: {}", mask_token(&token));
            ApiError(DeskError::Unauthorized)
        })?;

    request
        .extensions_mut()
        .insert(Principal::new(user.id, user.role));
    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header.
///
/// Supports "Bearer <token>" and a plain token value.
fn extract_auth_token(request: &Request) -> Option<String> {
    let auth_header = request.headers().get("authorization")?;
    let auth_str = auth_header.to_str().ok()?;

    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Mask a token for logging (show first 8 chars only)
pub fn mask_token(token: &str) -> String {
    if token.len() > 8 {
        format!("{}...", &token[..8])
    } else {
        "***".to_string()
    }
}
