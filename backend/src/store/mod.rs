//! Persistence interfaces for users and sessions.

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

use accounts_common::{NewUser, User};

pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("User not found: {0}")]
    UserNotFound(i64),
}

/// User persistence.
pub trait UserRepository: Send + Sync {
    /// All users whose email equals `email` after normalization. Email is
    /// unique, so this holds at most one row unless the table was edited
    /// by hand.
    fn find_by_email(&self, email: &str) -> Result<Vec<User>, StoreError>;

    fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Insert a new user. Fails with [`StoreError::Conflict`] if the email is taken.
    fn create(&self, new_user: &NewUser) -> Result<User, StoreError>;

    /// Persist every mutable field of `user`.
    fn update(&self, user: &User) -> Result<(), StoreError>;
}

/// A stored session row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_key: String,
    /// Signed, encoded payload.
    #[serde(skip_serializing)]
    pub session_data: String,
    pub expire_date: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_date <= now
    }
}

/// Session persistence.
pub trait SessionStore: Send + Sync {
    /// Raw row lookup; expired rows are returned too.
    fn load(&self, session_key: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace.
    fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Returns true if a row was removed.
    fn delete(&self, session_key: &str) -> Result<bool, StoreError>;

    /// Every row, ordered by expiry (latest first).
    fn all(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Remove rows that expired before `now`. Returns the number removed.
    fn clear_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
