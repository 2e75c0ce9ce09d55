//! Role-scoped permission resolver.
//!
//! Pure decision functions over `(Principal, Ticket)` pairs. Every rule is
//! an explicit allow; anything unmatched denies. The one deliberate
//! leniency is the user-role field strip on update patches: extraneous
//! fields are dropped and the request continues with what remains.

use crate::error::DeskError;
use crate::model::{Principal, Role, Ticket, TicketPatch};

/// Listing scope for a principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Agents and admins see the full ticket pool
    All,
    /// Users see only tickets they created
    CreatedBy(String),
}

/// Tickets visible to this principal when listing
pub fn scope(principal: &Principal) -> Scope {
    match principal.role {
        Role::Admin | Role::Agent => Scope::All,
        Role::User => Scope::CreatedBy(principal.user_id.clone()),
    }
}

/// Whether the principal may read this ticket (and its comments)
pub fn can_read(principal: &Principal, ticket: &Ticket) -> bool {
    match principal.role {
        Role::Admin | Role::Agent => true,
        Role::User => ticket.created_by == principal.user_id,
    }
}

/// Commenting requires the same visibility as reading
pub fn can_comment(principal: &Principal, ticket: &Ticket) -> bool {
    can_read(principal, ticket)
}

/// Whether the principal may touch the `assignedTo` field at all
pub fn can_assign(principal: &Principal) -> bool {
    principal.role == Role::Admin
}

/// Whether the principal may list assignable users
pub fn can_list_users(principal: &Principal) -> bool {
    matches!(principal.role, Role::Admin | Role::Agent)
}

/// Drop patch fields the principal's role may never set.
///
/// Users are limited to `title` and `description`; anything else in their
/// patch is silently discarded rather than failing the request. Agent and
/// admin patches pass through untouched and are judged by
/// [`authorize_update`].
pub fn strip_patch(principal: &Principal, mut patch: TicketPatch) -> TicketPatch {
    if principal.role == Role::User {
        patch.status = None;
        patch.assigned_to = None;
    }
    patch
}

/// Gate the versioned update path for the fields present in `patch`.
///
/// Expects the patch to have gone through [`strip_patch`] first, so a
/// user-role patch only carries fields users may set.
pub fn authorize_update(
    principal: &Principal,
    ticket: &Ticket,
    patch: &TicketPatch,
) -> Result<(), DeskError> {
    match principal.role {
        Role::Admin => Ok(()),
        Role::Agent => {
            if patch.assigned_to.is_some() {
                return Err(DeskError::Forbidden(
                    "only admins can assign tickets".to_string(),
                ));
            }
            // An agent may not edit a ticket claimed by someone else.
            match &ticket.assigned_to {
                Some(owner) if owner != &principal.user_id => Err(DeskError::forbidden()),
                _ => Ok(()),
            }
        }
        Role::User => {
            if ticket.created_by != principal.user_id {
                return Err(DeskError::forbidden());
            }
            if patch.assigned_to.is_some() || patch.status.is_some() {
                // Unreachable after strip_patch; deny rather than assume.
                return Err(DeskError::forbidden());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TicketStatus;
    use chrono::Utc;

    fn ticket(created_by: &str, assigned_to: Option<&str>) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: "t-1".into(),
            title: "vpn down".into(),
            description: "cannot connect since this morning".into(),
            status: TicketStatus::Open,
            created_by: created_by.into(),
            assigned_to: assigned_to.map(String::from),
            sla_deadline: now + chrono::Duration::hours(48),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn principal(id: &str, role: Role) -> Principal {
        Principal::new(id, role)
    }

    #[test]
    fn test_read_scope_by_role() {
        let t = ticket("u-1", None);
        assert!(can_read(&principal("a-1", Role::Admin), &t));
        assert!(can_read(&principal("g-1", Role::Agent), &t));
        assert!(can_read(&principal("u-1", Role::User), &t));
        assert!(!can_read(&principal("u-2", Role::User), &t));
    }

    #[test]
    fn test_listing_scope() {
        assert_eq!(scope(&principal("g-1", Role::Agent)), Scope::All);
        assert_eq!(scope(&principal("a-1", Role::Admin)), Scope::All);
        assert_eq!(
            scope(&principal("u-1", Role::User)),
            Scope::CreatedBy("u-1".into())
        );
    }

    #[test]
    fn test_user_patch_is_stripped() {
        let patch = TicketPatch {
            title: Some("new title".into()),
            status: Some(TicketStatus::Closed),
            assigned_to: Some(Some("g-1".into())),
            ..Default::default()
        };
        let stripped = strip_patch(&principal("u-1", Role::User), patch);
        assert_eq!(stripped.title.as_deref(), Some("new title"));
        assert!(stripped.status.is_none());
        assert!(stripped.assigned_to.is_none());
    }

    #[test]
    fn test_agent_patch_is_not_stripped() {
        let patch = TicketPatch {
            status: Some(TicketStatus::InProgress),
            ..Default::default()
        };
        let kept = strip_patch(&principal("g-1", Role::Agent), patch);
        assert_eq!(kept.status, Some(TicketStatus::InProgress));
    }

    #[test]
    fn test_agent_update_claim_rules() {
        let agent = principal("g-1", Role::Agent);
        let patch = TicketPatch {
            status: Some(TicketStatus::InProgress),
            ..Default::default()
        };

        // Unassigned: allowed
        assert!(authorize_update(&agent, &ticket("u-1", None), &patch).is_ok());
        // Assigned to self: allowed
        assert!(authorize_update(&agent, &ticket("u-1", Some("g-1")), &patch).is_ok());
        // Claimed by another agent: denied
        assert!(matches!(
            authorize_update(&agent, &ticket("u-1", Some("g-2")), &patch),
            Err(DeskError::Forbidden(_))
        ));
    }

    #[test]
    fn test_agent_cannot_assign() {
        let agent = principal("g-1", Role::Agent);
        let patch = TicketPatch {
            assigned_to: Some(Some("g-1".into())),
            ..Default::default()
        };
        assert!(matches!(
            authorize_update(&agent, &ticket("u-1", None), &patch),
            Err(DeskError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_bypasses_claim() {
        let admin = principal("a-1", Role::Admin);
        let patch = TicketPatch {
            assigned_to: Some(Some("g-2".into())),
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        assert!(authorize_update(&admin, &ticket("u-1", Some("g-1")), &patch).is_ok());
    }

    #[test]
    fn test_user_update_own_ticket_only() {
        let user = principal("u-1", Role::User);
        let patch = TicketPatch {
            title: Some("better title".into()),
            ..Default::default()
        };
        assert!(authorize_update(&user, &ticket("u-1", None), &patch).is_ok());
        assert!(matches!(
            authorize_update(&user, &ticket("u-2", None), &patch),
            Err(DeskError::Forbidden(_))
        ));
    }

    #[test]
    fn test_assign_and_user_listing_rights() {
        assert!(can_assign(&principal("a-1", Role::Admin)));
        assert!(!can_assign(&principal("g-1", Role::Agent)));
        assert!(!can_assign(&principal("u-1", Role::User)));

        assert!(can_list_users(&principal("g-1", Role::Agent)));
        assert!(can_list_users(&principal("a-1", Role::Admin)));
        assert!(!can_list_users(&principal("u-1", Role::User)));
    }
}
