//! SQLite-backed ticket store.
//!
//! Owns the schema and every query the engine needs: principal lookup,
//! ticket create/load, the version-checked patch write, comment append,
//! and the combined scope + text-search listing. Timestamps are stored as
//! fixed-width RFC 3339 text so lexicographic ordering matches time order.

use crate::access::Scope;
use crate::error::DeskError;
use crate::model::{
    Comment, NewTicket, Role, Ticket, TicketPatch, TicketStatus, TicketView, User, UserSummary,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Bound on waiting for a locked database before surfacing `Timeout`
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ticket store backed by SQLite
pub struct TicketStore {
    conn: Arc<Mutex<Connection>>,
}

impl TicketStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Provisioned by the external auth system; resolved per request
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                issued_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                created_by TEXT NOT NULL REFERENCES users(id),
                assigned_to TEXT REFERENCES users(id),
                sla_deadline TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                ticket_id TEXT NOT NULL REFERENCES tickets(id),
                author TEXT NOT NULL REFERENCES users(id),
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tickets_created_by ON tickets(created_by)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id)",
            [],
        )?;

        Ok(())
    }

    /// Cheap liveness probe for health reporting
    pub fn ping(&self) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    // ------------------------------------------------------------------
    // Users and principals
    // ------------------------------------------------------------------

    /// Insert a user (provisioning/test path; user management is external)
    pub fn insert_user(&self, user: &User) -> Result<(), DeskError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, display_name, role) VALUES (?, ?, ?, ?)",
            params![&user.id, &user.email, &user.display_name, user.role.as_str()],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, email, display_name, role FROM users WHERE id = ?",
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Register a bearer token for a user (provisioning/test path)
    pub fn insert_token(&self, token: &str, user_id: &str) -> Result<(), DeskError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_tokens (token, user_id, issued_at) VALUES (?, ?, ?)",
            params![token, user_id, ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Resolve a bearer token to its user, if the token is known
    pub fn user_for_token(&self, token: &str) -> Result<Option<User>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                r#"
                SELECT u.id, u.email, u.display_name, u.role
                FROM auth_tokens t JOIN users u ON u.id = t.user_id
                WHERE t.token = ?
                "#,
                params![token],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Agents and admins, sorted by name, for the assignment dropdown
    pub fn assignable_users(&self) -> Result<Vec<UserSummary>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, display_name, email FROM users
            WHERE role IN ('agent', 'admin')
            ORDER BY display_name ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    /// Insert a fresh ticket at version 0 with the server-side SLA deadline
    pub fn create_ticket(&self, creator_id: &str, req: &NewTicket) -> Result<Ticket, DeskError> {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            status: TicketStatus::Open,
            created_by: creator_id.to_string(),
            assigned_to: None,
            sla_deadline: NewTicket::sla_deadline(now),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO tickets
                (id, title, description, status, created_by, assigned_to,
                 sla_deadline, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                &ticket.id,
                &ticket.title,
                &ticket.description,
                ticket.status.as_str(),
                &ticket.created_by,
                &ticket.assigned_to,
                ts(ticket.sla_deadline),
                ticket.version,
                ts(ticket.created_at),
                ts(ticket.updated_at),
            ],
        )?;
        Ok(ticket)
    }

    pub fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let ticket = conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?"),
                params![id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    /// Load a ticket with creator/assignee resolved
    pub fn get_ticket_view(&self, id: &str) -> Result<Option<TicketView>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let view = conn
            .query_row(
                &format!("{TICKET_VIEW_SELECT} WHERE t.id = ?"),
                params![id],
                ticket_view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    /// Apply `patch` iff the stored version still equals `expected_version`.
    ///
    /// The field writes and the version increment ride one UPDATE guarded
    /// by `version = ?`, so the compare and the increment are indivisible
    /// at the storage layer. Returns false when a concurrent writer got
    /// there first (zero rows matched).
    pub fn apply_versioned_patch(
        &self,
        id: &str,
        expected_version: i64,
        patch: &TicketPatch,
        assignment: Option<Option<&str>>,
    ) -> Result<bool, DeskError> {
        let mut sets = String::from("version = version + 1, updated_at = ?");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(ts(Utc::now()))];

        if let Some(title) = &patch.title {
            sets.push_str(", title = ?");
            values.push(Box::new(title.trim().to_string()));
        }
        if let Some(description) = &patch.description {
            sets.push_str(", description = ?");
            values.push(Box::new(description.trim().to_string()));
        }
        if let Some(status) = patch.status {
            sets.push_str(", status = ?");
            values.push(Box::new(status.as_str().to_string()));
        }
        if let Some(target) = assignment {
            sets.push_str(", assigned_to = ?");
            values.push(Box::new(target.map(String::from)));
        }

        values.push(Box::new(id.to_string()));
        values.push(Box::new(expected_version));

        let sql = format!("UPDATE tickets SET {sets} WHERE id = ? AND version = ?");
        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(&sql, value_refs.as_slice())?;
        Ok(affected == 1)
    }

    // ------------------------------------------------------------------
    // Listing and search
    // ------------------------------------------------------------------

    /// Scoped, optionally text-filtered page of tickets, newest first.
    ///
    /// The text predicate matches title, description, or any comment on the
    /// ticket, case-insensitively. `total` counts the full matching set
    /// before offset/limit are applied.
    pub fn list_tickets(
        &self,
        scope: &Scope,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<TicketView>, i64), DeskError> {
        let mut filters = String::from(" WHERE 1=1");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Scope::CreatedBy(user_id) = scope {
            filters.push_str(" AND t.created_by = ?");
            values.push(Box::new(user_id.clone()));
        }

        if let Some(needle) = search {
            filters.push_str(
                r#" AND (
                    instr(lower(t.title), lower(?)) > 0
                    OR instr(lower(t.description), lower(?)) > 0
                    OR EXISTS (
                        SELECT 1 FROM comments cm
                        WHERE cm.ticket_id = t.id
                          AND instr(lower(cm.text), lower(?)) > 0
                    )
                )"#,
            );
            for _ in 0..3 {
                values.push(Box::new(needle.to_string()));
            }
        }

        let conn = self.conn.lock().unwrap();

        let count_sql = format!("SELECT COUNT(*) FROM tickets t{filters}");
        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let total: i64 = conn.query_row(&count_sql, value_refs.as_slice(), |row| row.get(0))?;

        let page_sql = format!(
            "{TICKET_VIEW_SELECT}{filters} ORDER BY t.created_at DESC LIMIT ? OFFSET ?"
        );
        values.push(Box::new(limit));
        values.push(Box::new(offset));
        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt.query_map(value_refs.as_slice(), ticket_view_from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok((items, total))
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// Append a comment. Comments are never updated or deleted.
    pub fn insert_comment(
        &self,
        ticket_id: &str,
        author_id: &str,
        text: &str,
    ) -> Result<Comment, DeskError> {
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket_id.to_string(),
            author: author_id.to_string(),
            text: text.trim().to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO comments (id, ticket_id, author, text, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                &comment.id,
                &comment.ticket_id,
                &comment.author,
                &comment.text,
                ts(comment.created_at),
            ],
        )?;
        Ok(comment)
    }

    /// All comments on a ticket, ascending by creation time, authors resolved
    pub fn comments_for_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Vec<crate::model::CommentView>, DeskError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.ticket_id, c.text, c.created_at,
                   u.id, u.display_name, u.email
            FROM comments c JOIN users u ON u.id = c.author
            WHERE c.ticket_id = ?
            ORDER BY c.created_at ASC
            "#,
        )?;
        let rows = stmt.query_map(params![ticket_id], |row| {
            Ok(crate::model::CommentView {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                text: row.get(2)?,
                created_at: parse_ts(&row.get::<_, String>(3)?),
                author: UserSummary {
                    id: row.get(4)?,
                    name: row.get(5)?,
                    email: row.get(6)?,
                },
            })
        })?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }
}

const TICKET_COLUMNS: &str = "id, title, description, status, created_by, assigned_to, \
                              sla_deadline, version, created_at, updated_at";

const TICKET_VIEW_SELECT: &str = r#"
    SELECT t.id, t.title, t.description, t.status, t.sla_deadline,
           t.version, t.created_at, t.updated_at,
           c.id, c.display_name, c.email,
           a.id, a.display_name, a.email
    FROM tickets t
    JOIN users c ON c.id = t.created_by
    LEFT JOIN users a ON a.id = t.assigned_to
"#;

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: Role::parse(&row.get::<_, String>(3)?).unwrap_or(Role::User),
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: TicketStatus::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        created_by: row.get(4)?,
        assigned_to: row.get(5)?,
        sla_deadline: parse_ts(&row.get::<_, String>(6)?),
        version: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

fn ticket_view_from_row(row: &Row<'_>) -> rusqlite::Result<TicketView> {
    let assigned_to = match row.get::<_, Option<String>>(11)? {
        Some(id) => Some(UserSummary {
            id,
            name: row.get(12)?,
            email: row.get(13)?,
        }),
        None => None,
    };
    Ok(TicketView {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: TicketStatus::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        sla_deadline: parse_ts(&row.get::<_, String>(4)?),
        version: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
        created_by: UserSummary {
            id: row.get(8)?,
            name: row.get(9)?,
            email: row.get(10)?,
        },
        assigned_to,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap_or_else(|_| Utc::now().into())
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, TicketStore) {
        let dir = TempDir::new().unwrap();
        let store = TicketStore::open(&dir.path().join("desk.db")).unwrap();
        (dir, store)
    }

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            display_name: id.to_string(),
            role,
        }
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("desk.db");
        drop(TicketStore::open(&path).unwrap());
        // Reopening must not fail on existing tables
        drop(TicketStore::open(&path).unwrap());
    }

    #[test]
    fn test_token_resolution() {
        let (_dir, store) = store();
        store.insert_user(&user("u-1", Role::User)).unwrap();
        store.insert_token("tok-1", "u-1").unwrap();

        let resolved = store.user_for_token("tok-1").unwrap().unwrap();
        assert_eq!(resolved.id, "u-1");
        assert_eq!(resolved.role, Role::User);
        assert!(store.user_for_token("tok-unknown").unwrap().is_none());
    }

    #[test]
    fn test_versioned_patch_single_winner() {
        let (_dir, store) = store();
        store.insert_user(&user("u-1", Role::User)).unwrap();
        let ticket = store
            .create_ticket(
                "u-1",
                &NewTicket {
                    title: "t".into(),
                    description: "d".into(),
                },
            )
            .unwrap();
        assert_eq!(ticket.version, 0);

        let patch = TicketPatch {
            status: Some(TicketStatus::InProgress),
            ..Default::default()
        };

        // First writer against version 0 wins
        assert!(store
            .apply_versioned_patch(&ticket.id, 0, &patch, None)
            .unwrap());
        // Second writer against the same stale version loses
        assert!(!store
            .apply_versioned_patch(&ticket.id, 0, &patch, None)
            .unwrap());

        let stored = store.get_ticket(&ticket.id).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, TicketStatus::InProgress);
    }

    #[test]
    fn test_assignment_clear_writes_null() {
        let (_dir, store) = store();
        store.insert_user(&user("u-1", Role::User)).unwrap();
        store.insert_user(&user("g-1", Role::Agent)).unwrap();
        let ticket = store
            .create_ticket(
                "u-1",
                &NewTicket {
                    title: "t".into(),
                    description: "d".into(),
                },
            )
            .unwrap();

        let none = TicketPatch::default();
        assert!(store
            .apply_versioned_patch(&ticket.id, 0, &none, Some(Some("g-1")))
            .unwrap());
        assert_eq!(
            store.get_ticket(&ticket.id).unwrap().unwrap().assigned_to,
            Some("g-1".to_string())
        );

        assert!(store
            .apply_versioned_patch(&ticket.id, 1, &none, Some(None))
            .unwrap());
        assert_eq!(store.get_ticket(&ticket.id).unwrap().unwrap().assigned_to, None);
    }

    #[test]
    fn test_assignable_users_sorted() {
        let (_dir, store) = store();
        store.insert_user(&user("zed", Role::Agent)).unwrap();
        store.insert_user(&user("amy", Role::Admin)).unwrap();
        store.insert_user(&user("uma", Role::User)).unwrap();

        let users = store.assignable_users().unwrap();
        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["amy", "zed"]);
    }
}
