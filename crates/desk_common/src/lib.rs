//! Shared domain crate for the helpdesk service.
//!
//! Holds the data model, the error taxonomy, the role-scoped permission
//! resolver, the idempotency cache and the SQLite-backed ticket store.
//! The daemon crate (`deskd`) is a thin HTTP surface over `tickets`.

pub mod access;
pub mod error;
pub mod idempotency;
pub mod model;
pub mod store;
pub mod tickets;

pub use error::DeskError;
pub use idempotency::{Begin, CachedResponse, IdempotencyCache};
pub use model::{
    Comment, CommentView, ListQuery, NewComment, NewTicket, Principal, Role, Ticket, TicketPage,
    TicketPatch, TicketStatus, TicketView, User, UserSummary,
};
pub use store::TicketStore;
