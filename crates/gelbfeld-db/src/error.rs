use std::fmt;

use rusqlite::ffi;
use thiserror::Error;

/// Coarse classification of a [`StoreError`], used by the API layer to pick a
/// status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    InvalidInput,
    ServiceUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput => "invalid_input",
            Self::ServiceUnavailable => "service_unavailable",
        };
        f.write_str(s)
    }
}

/// Every failure a store operation can report. Raw SQLite errors never leave
/// the crate except wrapped in `Unavailable`, whose display text is generic.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username already taken")]
    UsernameTaken,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("cannot send a friend request to yourself")]
    SelfRequest,

    #[error("target user not found")]
    TargetNotFound,

    #[error("an active relationship already exists between these users")]
    AlreadyActive,

    #[error("relationship not found")]
    RelationshipNotFound,

    #[error("identity not found")]
    IdentityNotFound,

    #[error("a round with this name already exists")]
    DuplicateRoundName,

    #[error("player '{0}' is already enrolled in this round")]
    DuplicatePlayer(String),

    #[error("round player not found")]
    PlayerNotFound,

    #[error("player does not belong to this round")]
    PlayerRoundMismatch,

    #[error("round not found")]
    RoundNotFound,

    #[error("not authorized")]
    NotAuthorized,

    #[error("{0}")]
    InvalidInput(String),

    /// A UNIQUE or PRIMARY KEY constraint fired. Operations translate this
    /// into their own conflict variant with [`StoreError::or_conflict`].
    #[error("unique constraint violated")]
    UniqueViolation(String),

    /// Any other constraint (foreign key, check, not null).
    #[error("constraint violated")]
    ConstraintViolation(String),

    #[error("store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(anyhow::anyhow!(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetNotFound
            | Self::RelationshipNotFound
            | Self::IdentityNotFound
            | Self::PlayerNotFound
            | Self::RoundNotFound => ErrorKind::NotFound,
            Self::UsernameTaken
            | Self::EmailTaken
            | Self::AlreadyActive
            | Self::DuplicateRoundName
            | Self::DuplicatePlayer(_)
            | Self::UniqueViolation(_) => ErrorKind::Conflict,
            Self::InvalidCredentials | Self::NotAuthorized => ErrorKind::Unauthorized,
            Self::SelfRequest
            | Self::PlayerRoundMismatch
            | Self::InvalidInput(_)
            | Self::ConstraintViolation(_) => ErrorKind::InvalidInput,
            Self::Unavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UsernameTaken => "username_taken",
            Self::EmailTaken => "email_taken",
            Self::InvalidCredentials => "invalid_credentials",
            Self::SelfRequest => "self_request",
            Self::TargetNotFound => "target_not_found",
            Self::AlreadyActive => "already_active",
            Self::RelationshipNotFound => "relationship_not_found",
            Self::IdentityNotFound => "identity_not_found",
            Self::DuplicateRoundName => "duplicate_round_name",
            Self::DuplicatePlayer(_) => "duplicate_player",
            Self::PlayerNotFound => "player_not_found",
            Self::PlayerRoundMismatch => "player_round_mismatch",
            Self::RoundNotFound => "round_not_found",
            Self::NotAuthorized => "not_authorized",
            Self::InvalidInput(_) => "invalid_input",
            Self::UniqueViolation(_) => "conflict",
            Self::ConstraintViolation(_) => "invalid_reference",
            Self::Unavailable(_) => "service_unavailable",
        }
    }

    /// Message safe to show to API clients. Constraint and store failures
    /// carry SQLite text internally; that text is never returned here.
    pub fn user_message(&self) -> String {
        match self {
            Self::UniqueViolation(_) => "resource already exists".to_string(),
            Self::ConstraintViolation(_) => "invalid reference to related resource".to_string(),
            Self::Unavailable(_) => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }

    /// Replace a raw unique violation with the operation's conflict error.
    pub fn or_conflict(self, conflict: StoreError) -> StoreError {
        match self {
            Self::UniqueViolation(_) => conflict,
            other => other,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let msg = msg.clone().unwrap_or_default();
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        StoreError::UniqueViolation(msg)
                    }
                    _ => StoreError::ConstraintViolation(msg),
                }
            }
            _ => StoreError::Unavailable(err.into()),
        }
    }
}
