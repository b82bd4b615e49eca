//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//! - Own the transactional boundary: an aggregate write and its history
//!   entries commit together or not at all.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Timestamps are stored as epoch milliseconds.
//! - Unique-index violations surface as `RepoError::Duplicate`.

pub mod attachment_repo;
pub mod history_repo;
pub mod ppa_repo;
pub mod role_repo;

use crate::db::DbError;
use crate::error::ErrorKind;
use crate::model::error::DomainError;
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("{entity} {id} was modified concurrently; expected version {expected}")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: u32,
    },
    #[error("ppa {0} already has a continuation")]
    AlreadyContinued(Uuid),
    #[error("assignment set in period {period} is already held by active ppa {occupant}")]
    AssignmentSetOccupied { period: Uuid, occupant: Uuid },
    #[error("system role `{0}` cannot be deleted")]
    SystemRole(String),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => err.kind(),
            Self::Db(_) | Self::InvalidData(_) => ErrorKind::Storage,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Duplicate { .. } => ErrorKind::Duplicate,
            Self::VersionConflict { .. }
            | Self::AlreadyContinued(_)
            | Self::AssignmentSetOccupied { .. }
            | Self::SystemRole(_) => ErrorKind::Conflict,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps unique-constraint failures to `Duplicate`; everything else passes through.
pub(crate) fn map_unique_violation(
    err: rusqlite::Error,
    entity: &'static str,
    key: &str,
) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            RepoError::Duplicate {
                entity,
                key: key.to_string(),
            }
        }
        _ => err.into(),
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean `{other}` in {column}"
        ))),
    }
}
