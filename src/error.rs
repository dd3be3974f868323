use std::fmt;

use thiserror::Error;

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Room,
    Message,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Entity::User => "user",
            Entity::Room => "room",
            Entity::Message => "message",
        })
    }
}

/// Outcomes of the chat rules. Everything except `Storage` and `Hash` is an
/// expected result the caller is meant to handle.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("not authorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{0} already exists")]
    Duplicate(Entity),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("too many failed login attempts")]
    Throttled,

    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<argon2::password_hash::Error> for ChatError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Hash(err.to_string())
    }
}

impl ChatError {
    /// Maps a uniqueness violation raised by an insert or update to
    /// `Duplicate`, for writes that lose a race with the existence check.
    pub(crate) fn from_write(err: sqlx::Error, entity: Entity) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::Duplicate(entity),
            _ => Self::Storage(err),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
