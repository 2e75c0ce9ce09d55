//! Data model for tickets, comments and principals.
//!
//! Tickets carry a monotonic `version` counter used for optimistic
//! concurrency and an `sla_deadline` fixed at creation time. Wire views
//! resolve creator/assignee/author ids into `{id, name, email}` summaries
//! so responses never expose raw foreign keys.

use crate::error::DeskError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum ticket title length
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum ticket description length
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Maximum comment text length
pub const MAX_COMMENT_LEN: usize = 1000;

/// Page size cap for listings
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Default page size when the caller does not supply one
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Hours until a fresh ticket's SLA deadline
pub const SLA_HOURS: i64 = 48;

/// Role attached to every principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user: sees and edits only self-created tickets
    User,
    /// Support agent: works the full ticket pool
    Agent,
    /// Administrator: no restrictions
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Whether a ticket may be assigned to a user holding this role
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Agent | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Filed, nobody working it yet
    #[default]
    Open,
    /// An agent is on it
    InProgress,
    /// Resolved or abandoned
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller identity, resolved by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// A registered user. Provisioned externally; referenced by tickets and
/// comments, never embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Identity summary carried on wire views instead of a raw foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// A stored ticket row
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    /// Creator's user id, immutable after creation
    pub created_by: String,
    /// Assigned agent/admin id, if claimed
    pub assigned_to: Option<String>,
    /// Fixed at creation: created_at + 48h, never recomputed
    pub sla_deadline: DateTime<Utc>,
    /// Optimistic-lock counter, starts at 0, +1 per successful update
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the SLA deadline has passed at `now`
    pub fn sla_breached(&self, now: DateTime<Utc>) -> bool {
        now > self.sla_deadline
    }
}

/// Wire shape of a ticket with resolved identities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_by: UserSummary,
    pub assigned_to: Option<UserSummary>,
    pub sla_deadline: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored comment row. Append-only.
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub ticket_id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Wire shape of a comment with a resolved author
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub ticket_id: String,
    pub author: UserSummary,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
}

impl NewTicket {
    pub fn validate(&self) -> Result<(), DeskError> {
        require_text("title", &self.title, MAX_TITLE_LEN)?;
        require_text("description", &self.description, MAX_DESCRIPTION_LEN)?;
        Ok(())
    }

    /// SLA deadline for a ticket created at `created_at`
    pub fn sla_deadline(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::hours(SLA_HOURS)
    }
}

/// Request body for adding a comment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub text: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), DeskError> {
        require_text("text", &self.text, MAX_COMMENT_LEN)?;
        Ok(())
    }
}

/// Patch body for the versioned update path.
///
/// Absent fields are untouched. `assignedTo` distinguishes absent from an
/// explicit null: `Some(None)` (or an empty string) clears the assignment.
/// `version` is the caller's expected version; omitting it skips the
/// optimistic-lock precheck.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<String>>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl TicketPatch {
    /// Whether the patch touches no fields at all (a bare version bump)
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assigned_to.is_none()
    }

    /// Normalized assignment target: `None` if untouched,
    /// `Some(None)` to clear, `Some(Some(id))` to assign.
    pub fn assignment(&self) -> Option<Option<&str>> {
        self.assigned_to.as_ref().map(|target| {
            target
                .as_deref()
                .filter(|id| !id.is_empty())
        })
    }

    pub fn validate(&self) -> Result<(), DeskError> {
        if let Some(title) = &self.title {
            require_text("title", title, MAX_TITLE_LEN)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description, MAX_DESCRIPTION_LEN)?;
        }
        Ok(())
    }
}

/// Distinguishes a missing JSON field from an explicit `null`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Listing parameters after clamping
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub q: Option<String>,
}

impl ListQuery {
    /// Effective limit: defaults to 10, capped at 100, never below 1
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// Effective offset: never negative
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Search text, if non-empty
    pub fn search(&self) -> Option<&str> {
        self.q.as_deref().filter(|q| !q.trim().is_empty())
    }
}

/// One page of a ticket listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPage {
    pub items: Vec<TicketView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

fn require_text(field: &'static str, value: &str, max_len: usize) -> Result<(), DeskError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DeskError::Validation {
            field: field.to_string(),
            message: format!("{field} must not be empty"),
        });
    }
    if value.chars().count() > max_len {
        return Err(DeskError::Validation {
            field: field.to_string(),
            message: format!("{field} must be at most {max_len} characters"),
        });
    }
    Ok(())
}
