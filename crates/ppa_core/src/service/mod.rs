//! Use-case services over repository and collaborator contracts.
//!
//! # Responsibility
//! - Run reference-data preconditions after aggregate validation and before
//!   any write.
//! - Turn pending aggregate changes into history entries and persist both in
//!   one repository call.
//! - Emit one `event=... module=service` line per operation outcome.
//!
//! # Invariants
//! - Services never open transactions themselves; repositories own them.
//! - Callers are expected to have checked permissions already.

pub mod attachment_service;
pub mod continuation;
pub mod ppa_service;
pub mod role_service;

use crate::collab::{ReferenceData, ReferenceDataError, StorageError};
use crate::error::ErrorKind;
use crate::model::attachment::AttachmentId;
use crate::model::error::{require_id, DomainError};
use crate::model::history::PpaHistoryEntry;
use crate::model::ppa::{AcademicPeriodId, Ppa, PpaChange, PpaId, TeacherAssignmentId, UserId};
use crate::repo::RepoError;
use log::{error, info, warn};
use std::fmt::Display;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, PpaServiceError>;

/// Service error for PPA, attachment and continuation use-cases.
#[derive(Debug, Error)]
pub enum PpaServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("ppa not found: {0}")]
    PpaNotFound(PpaId),
    #[error("attachment not found: {0}")]
    AttachmentNotFound(AttachmentId),
    #[error("academic period not found: {0}")]
    PeriodNotFound(AcademicPeriodId),
    #[error("academic period {0} is not active")]
    PeriodInactive(AcademicPeriodId),
    #[error("teacher assignment not found: {0}")]
    AssignmentNotFound(TeacherAssignmentId),
    #[error("teacher assignment {0} is not active")]
    AssignmentInactive(TeacherAssignmentId),
    #[error("continuation must target a period other than {0}")]
    SamePeriod(AcademicPeriodId),
    #[error("assignment set in period {period} is already held by active ppa {occupant}")]
    AssignmentSetOccupied {
        period: AcademicPeriodId,
        occupant: PpaId,
    },
    #[error("ppa {ppa_id} needs {required} live document(s) to complete, found {found}")]
    MissingRequiredDocuments {
        ppa_id: PpaId,
        required: u32,
        found: u64,
    },
    #[error("attachment {0} must be removed before its file can be purged")]
    AttachmentNotRemoved(AttachmentId),
    #[error(transparent)]
    Reference(#[from] ReferenceDataError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repo(RepoError),
    #[error("inconsistent state: {0}")]
    InconsistentState(&'static str),
}

impl PpaServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => err.kind(),
            Self::Repo(err) => err.kind(),
            Self::PpaNotFound(_)
            | Self::AttachmentNotFound(_)
            | Self::PeriodNotFound(_)
            | Self::AssignmentNotFound(_)
            | Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::PeriodInactive(_)
            | Self::AssignmentInactive(_)
            | Self::AssignmentSetOccupied { .. }
            | Self::MissingRequiredDocuments { .. }
            | Self::AttachmentNotRemoved(_) => ErrorKind::Conflict,
            Self::SamePeriod(_) => ErrorKind::Validation,
            Self::Reference(_) | Self::Storage(_) | Self::InconsistentState(_) => {
                ErrorKind::Storage
            }
        }
    }
}

impl From<RepoError> for PpaServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Domain(err) => Self::Domain(err),
            RepoError::AssignmentSetOccupied { period, occupant } => {
                Self::AssignmentSetOccupied { period, occupant }
            }
            other => Self::Repo(other),
        }
    }
}

/// Builds one history entry per change, stamped with the aggregate's
/// last-modified time.
pub(crate) fn history_for(
    ppa: &Ppa,
    actor_id: UserId,
    changes: &[PpaChange],
) -> Result<Vec<PpaHistoryEntry>, DomainError> {
    let at = ppa.updated_at().unwrap_or_else(|| ppa.created_at());
    changes
        .iter()
        .map(|change| PpaHistoryEntry::from_change(ppa.id(), actor_id, at, change))
        .collect()
}

/// Fails unless `period` exists and, when `require_active`, is active.
///
/// A nil id is a validation error and never reaches `reference`.
pub(crate) fn check_period<D: ReferenceData>(
    reference: &D,
    period: AcademicPeriodId,
    require_active: bool,
) -> ServiceResult<()> {
    require_id("academic period id", period)?;
    if !reference.period_exists(period)? {
        return Err(PpaServiceError::PeriodNotFound(period));
    }
    if require_active && !reference.period_is_active(period)? {
        return Err(PpaServiceError::PeriodInactive(period));
    }
    Ok(())
}

/// Fails unless every assignment exists and is active.
///
/// All ids are checked for nil before `reference` is consulted.
pub(crate) fn check_assignments<'a, D: ReferenceData>(
    reference: &D,
    assignments: impl IntoIterator<Item = &'a TeacherAssignmentId>,
) -> ServiceResult<()> {
    let assignments = assignments
        .into_iter()
        .map(|&assignment| require_id("teacher assignment id", assignment))
        .collect::<Result<Vec<_>, _>>()?;
    for assignment in assignments {
        if !reference.assignment_exists(assignment)? {
            return Err(PpaServiceError::AssignmentNotFound(assignment));
        }
        if !reference.assignment_is_active(assignment)? {
            return Err(PpaServiceError::AssignmentInactive(assignment));
        }
    }
    Ok(())
}

/// Logs the outcome of one service operation.
///
/// Rejections go to `warn`, storage faults to `error`.
pub(crate) fn log_outcome<T>(event: &str, subject: impl Display, result: &ServiceResult<T>) {
    match result {
        Ok(_) => info!("event={event} module=service status=ok id={subject}"),
        Err(err) if err.kind() == ErrorKind::Storage => error!(
            "event={event} module=service status=error id={subject} kind={} error={err}",
            err.kind()
        ),
        Err(err) => warn!(
            "event={event} module=service status=rejected id={subject} kind={}",
            err.kind()
        ),
    }
}
