//! Domain rule violations raised by model constructors and mutators.

use crate::error::ErrorKind;
use crate::model::ppa::{PpaId, PpaStatus};
use thiserror::Error;
use uuid::Uuid;

/// Invariant violation detected inside the domain model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Required text field is empty after trim.
    #[error("{field} must not be blank")]
    BlankField { field: &'static str },
    /// Identifier field carries the nil UUID.
    #[error("{field} must not be nil")]
    NilId { field: &'static str },
    /// Permission code is not `module.action`.
    #[error("invalid permission code `{code}`: expected `module.action`")]
    PermissionFormat { code: String },
    /// Teacher assignment is already linked to the PPA.
    #[error("teacher assignment {0} is already linked")]
    DuplicateAssociation(Uuid),
    /// PPA is frozen in an absorbing status.
    #[error("ppa {ppa_id} is in terminal status `{status}`")]
    TerminalState { ppa_id: PpaId, status: PpaStatus },
    /// Status can only be reached through a dedicated workflow.
    #[error("status `{to}` cannot be set directly from `{from}`")]
    ForbiddenTransition { from: PpaStatus, to: PpaStatus },
    /// A continuation pointer refers back to the PPA itself.
    #[error("ppa {0} cannot continue itself")]
    SelfContinuation(PpaId),
    /// Continuation source is not completed or archived.
    #[error("ppa {ppa_id} in status `{status}` cannot be continued")]
    NotContinuable { ppa_id: PpaId, status: PpaStatus },
    /// Continuation source already has a successor.
    #[error("ppa {ppa_id} is already continued by {continued_by}")]
    AlreadyContinued { ppa_id: PpaId, continued_by: PpaId },
}

impl DomainError {
    /// Returns the caller-facing classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BlankField { .. }
            | Self::NilId { .. }
            | Self::PermissionFormat { .. }
            | Self::ForbiddenTransition { .. }
            | Self::SelfContinuation(_) => ErrorKind::Validation,
            Self::DuplicateAssociation(_) => ErrorKind::Duplicate,
            Self::TerminalState { .. } => ErrorKind::TerminalState,
            Self::NotContinuable { .. } | Self::AlreadyContinued { .. } => ErrorKind::Conflict,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Trims `value` and rejects blank input for required fields.
pub(crate) fn require_text(field: &'static str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::BlankField { field });
    }
    Ok(trimmed.to_string())
}

/// Trims optional free text; blank collapses to `None`.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

pub(crate) fn require_id(field: &'static str, id: Uuid) -> DomainResult<Uuid> {
    if id.is_nil() {
        return Err(DomainError::NilId { field });
    }
    Ok(id)
}
