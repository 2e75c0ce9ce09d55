//! API routes for deskd.

use crate::error::{raw_error_body, ApiError};
use crate::server::AppStateArc;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use desk_common::idempotency::{Begin, CachedResponse};
use desk_common::model::{
    CommentView, ListQuery, NewComment, NewTicket, Principal, TicketPatch, TicketView, UserSummary,
};
use desk_common::{tickets, DeskError};
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Header carrying the client-generated idempotency key
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// ============================================================================
// Ticket Routes
// ============================================================================

pub fn ticket_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/tickets", post(create_ticket).get(list_tickets))
        .route("/v1/tickets/:id", get(get_ticket).patch(update_ticket))
        .route(
            "/v1/tickets/:id/comments",
            post(add_comment).get(list_comments),
        )
}

/// Create a ticket, honoring the idempotency key if one is supplied.
///
/// A committed key replays the recorded response without touching the
/// store; a key still in flight is rejected; failures release the key so
/// a retry can run.
async fn create_ticket(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(req): Json<NewTicket>,
) -> Result<Response, ApiError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from);

    if let Some(key) = &idempotency_key {
        match state.idempotency.begin(key) {
            Begin::Replay(cached) => {
                info!("Replaying idempotent create for {}", crate::auth::mask_token(key));
                let status =
                    StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
                return Ok((status, Json(cached.body)).into_response());
            }
            Begin::InFlight => return Err(ApiError(DeskError::DuplicateRequest)),
            Begin::Fresh => {}
        }
    }

    match tickets::create_ticket(&state.store, &principal, &req) {
        Ok(ticket) => {
            let body = json!({
                "message": "Ticket created successfully",
                "ticket": ticket,
            });
            if let Some(key) = &idempotency_key {
                state.idempotency.commit(
                    key,
                    CachedResponse {
                        status: StatusCode::CREATED.as_u16(),
                        body: body.clone(),
                    },
                );
            }
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        Err(err) => {
            if let Some(key) = &idempotency_key {
                state.idempotency.abandon(key);
            }
            Err(ApiError(err))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total: i64,
    limit: i64,
    offset: i64,
    has_more: bool,
}

#[derive(Serialize)]
struct ListTicketsResponse {
    tickets: Vec<TicketView>,
    pagination: Pagination,
}

async fn list_tickets(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let page = tickets::list_tickets(&state.store, &principal, &query)?;
    Ok(Json(ListTicketsResponse {
        tickets: page.items,
        pagination: Pagination {
            total: page.total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.has_more,
        },
    }))
}

#[derive(Serialize)]
struct TicketResponse {
    ticket: TicketView,
}

async fn get_ticket(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = tickets::get_ticket(&state.store, &principal, &id)?;
    Ok(Json(TicketResponse { ticket }))
}

#[derive(Serialize)]
struct UpdateTicketResponse {
    message: &'static str,
    ticket: TicketView,
}

async fn update_ticket(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(patch): Json<TicketPatch>,
) -> Result<Json<UpdateTicketResponse>, ApiError> {
    let ticket = tickets::update_ticket(&state.store, &principal, &id, patch)?;
    Ok(Json(UpdateTicketResponse {
        message: "Ticket updated successfully",
        ticket,
    }))
}

#[derive(Serialize)]
struct CommentResponse {
    message: &'static str,
    comment: CommentView,
}

async fn add_comment(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let comment = tickets::add_comment(&state.store, &principal, &id, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "Comment added successfully",
            comment,
        }),
    ))
}

#[derive(Serialize)]
struct CommentsResponse {
    comments: Vec<CommentView>,
}

async fn list_comments(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let comments = tickets::list_comments(&state.store, &principal, &id)?;
    Ok(Json(CommentsResponse { comments }))
}

// ============================================================================
// User Routes
// ============================================================================

pub fn user_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/users", get(list_users))
}

#[derive(Serialize)]
struct UsersResponse {
    users: Vec<UserSummary>,
}

/// Assignment dropdown: agents and admins only
async fn list_users(
    State(state): State<AppStateArc>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = tickets::assignable_users(&state.store, &principal)?;
    Ok(Json(UsersResponse { users }))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    database: &'static str,
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    let database = if state.store.ping() {
        "connected"
    } else {
        "unavailable"
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database,
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(raw_error_body("NOT_FOUND", "Route not found")),
    )
        .into_response()
}
