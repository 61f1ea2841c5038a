pub mod auth;
pub mod invites;
pub mod recovery;
pub mod security;

/// List endpoints return at most this many rows, newest first.
pub const LIST_LIMIT: i64 = 100;
