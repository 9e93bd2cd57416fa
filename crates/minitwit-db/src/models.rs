//! Rows as SQLite returns them. The API layer converts these into its own
//! types; nothing here is serialized.

/// A `user` row, password hash included.
pub struct UserRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub pw_hash: String,
}

/// A visible message joined with its author's username.
pub struct FeedRow {
    pub message_id: i64,
    pub text: String,
    pub pub_date: i64,
    pub username: String,
}

/// Outcome of an attempted user insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewUser {
    Created(i64),
    UsernameTaken,
    EmailTaken,
}
