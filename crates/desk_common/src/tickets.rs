//! Ticket operations: the engine behind the HTTP surface.
//!
//! Every operation takes the resolved [`Principal`] and runs the full
//! gate sequence itself (permission check, version precheck, assignee
//! resolution, versioned write), so callers cannot skip a step.

use crate::access;
use crate::error::DeskError;
use crate::model::{
    CommentView, ListQuery, NewComment, NewTicket, Principal, TicketPage, TicketPatch, TicketView,
    UserSummary,
};
use crate::store::TicketStore;
use tracing::info;

/// Create a ticket on behalf of the principal.
///
/// The SLA deadline is set server-side at creation + 48h; the ticket
/// starts at version 0, unassigned, status open.
pub fn create_ticket(
    store: &TicketStore,
    principal: &Principal,
    req: &NewTicket,
) -> Result<TicketView, DeskError> {
    req.validate()?;

    let ticket = store.create_ticket(&principal.user_id, req)?;
    info!("Ticket {} created by {}", ticket.id, principal.user_id);

    store
        .get_ticket_view(&ticket.id)?
        .ok_or_else(|| DeskError::Internal("created ticket vanished".to_string()))
}

/// Fetch one ticket, enforcing read scope
pub fn get_ticket(
    store: &TicketStore,
    principal: &Principal,
    ticket_id: &str,
) -> Result<TicketView, DeskError> {
    let ticket = store
        .get_ticket(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))?;

    if !access::can_read(principal, &ticket) {
        return Err(DeskError::forbidden());
    }

    store
        .get_ticket_view(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))
}

/// Version-checked update.
///
/// Load, precheck the expected version, strip fields the role may never
/// set, gate the rest, resolve the assignee, then apply the patch and the
/// version increment as one indivisible write. A concurrent writer racing
/// on the same starting version loses with `VersionConflict`.
pub fn update_ticket(
    store: &TicketStore,
    principal: &Principal,
    ticket_id: &str,
    patch: TicketPatch,
) -> Result<TicketView, DeskError> {
    patch.validate()?;

    let ticket = store
        .get_ticket(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))?;

    if let Some(expected) = patch.version {
        if expected != ticket.version {
            return Err(DeskError::VersionConflict);
        }
    }

    let patch = access::strip_patch(principal, patch);
    access::authorize_update(principal, &ticket, &patch)?;

    let assignment = patch.assignment();
    if let Some(target) = &assignment {
        if !access::can_assign(principal) {
            return Err(DeskError::Forbidden(
                "only admins can assign tickets".to_string(),
            ));
        }
        if let Some(assignee_id) = target {
            let assignee = store
                .get_user(assignee_id)?
                .ok_or(DeskError::InvalidAssignee)?;
            if !assignee.role.is_assignable() {
                return Err(DeskError::InvalidAssignee);
            }
        }
    }

    // The write re-checks the version it loaded; losing the race between
    // the load above and this statement still surfaces as a conflict.
    let applied =
        store.apply_versioned_patch(ticket_id, ticket.version, &patch, assignment)?;
    if !applied {
        return Err(DeskError::VersionConflict);
    }

    info!(
        "Ticket {} updated by {} (version {} -> {})",
        ticket_id,
        principal.user_id,
        ticket.version,
        ticket.version + 1
    );

    store
        .get_ticket_view(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))
}

/// Scoped, searched, paginated listing.
///
/// The search text matches title, description, or any comment on the
/// ticket; matching runs before pagination so `total` reflects the whole
/// matching set.
pub fn list_tickets(
    store: &TicketStore,
    principal: &Principal,
    query: &ListQuery,
) -> Result<TicketPage, DeskError> {
    let scope = access::scope(principal);
    let limit = query.limit();
    let offset = query.offset();

    let (items, total) = store.list_tickets(&scope, query.search(), limit, offset)?;

    Ok(TicketPage {
        items,
        total,
        limit,
        offset,
        has_more: offset + limit < total,
    })
}

/// Append a comment; requires read access to the ticket
pub fn add_comment(
    store: &TicketStore,
    principal: &Principal,
    ticket_id: &str,
    req: &NewComment,
) -> Result<CommentView, DeskError> {
    req.validate()?;

    let ticket = store
        .get_ticket(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))?;

    if !access::can_comment(principal, &ticket) {
        return Err(DeskError::forbidden());
    }

    let comment = store.insert_comment(ticket_id, &principal.user_id, &req.text)?;
    let author = store
        .get_user(&principal.user_id)?
        .ok_or_else(|| DeskError::Internal("comment author missing".to_string()))?;

    Ok(CommentView {
        id: comment.id,
        ticket_id: comment.ticket_id,
        author: author.summary(),
        text: comment.text,
        created_at: comment.created_at,
    })
}

/// All comments on a ticket, ascending by creation time
pub fn list_comments(
    store: &TicketStore,
    principal: &Principal,
    ticket_id: &str,
) -> Result<Vec<CommentView>, DeskError> {
    let ticket = store
        .get_ticket(ticket_id)?
        .ok_or_else(|| DeskError::NotFound("ticket".to_string()))?;

    if !access::can_read(principal, &ticket) {
        return Err(DeskError::forbidden());
    }

    store.comments_for_ticket(ticket_id)
}

/// Agents and admins eligible for assignment; agent/admin callers only
pub fn assignable_users(
    store: &TicketStore,
    principal: &Principal,
) -> Result<Vec<UserSummary>, DeskError> {
    if !access::can_list_users(principal) {
        return Err(DeskError::Forbidden("insufficient permissions".to_string()));
    }
    store.assignable_users()
}
