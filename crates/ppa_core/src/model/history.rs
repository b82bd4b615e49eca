//! Append-only audit entries for PPA mutations.
//!
//! # Responsibility
//! - Define the thirteen audit action tags.
//! - Translate aggregate changes into display-oriented entries.
//!
//! # Invariants
//! - Entries expose no mutators; once built they are never changed.
//! - Old/new values are display text for audit, not replay input.

use crate::model::attachment::PpaAttachment;
use crate::model::error::{require_id, DomainResult};
use crate::model::ppa::{PpaChange, PpaId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type HistoryEntryId = Uuid;

/// Audit action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    UpdatedTitle,
    UpdatedGeneralObjective,
    UpdatedSpecificObjectives,
    UpdatedDescription,
    ChangedStatus,
    ChangedResponsibleTeacher,
    UpdatedAssignments,
    UpdatedStudents,
    UpdatedContinuationSettings,
    AttachmentAdded,
    AttachmentRemoved,
    ContinuationCreated,
}

impl HistoryAction {
    pub const ALL: [HistoryAction; 13] = [
        Self::Created,
        Self::UpdatedTitle,
        Self::UpdatedGeneralObjective,
        Self::UpdatedSpecificObjectives,
        Self::UpdatedDescription,
        Self::ChangedStatus,
        Self::ChangedResponsibleTeacher,
        Self::UpdatedAssignments,
        Self::UpdatedStudents,
        Self::UpdatedContinuationSettings,
        Self::AttachmentAdded,
        Self::AttachmentRemoved,
        Self::ContinuationCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::UpdatedTitle => "updated_title",
            Self::UpdatedGeneralObjective => "updated_general_objective",
            Self::UpdatedSpecificObjectives => "updated_specific_objectives",
            Self::UpdatedDescription => "updated_description",
            Self::ChangedStatus => "changed_status",
            Self::ChangedResponsibleTeacher => "changed_responsible_teacher",
            Self::UpdatedAssignments => "updated_assignments",
            Self::UpdatedStudents => "updated_students",
            Self::UpdatedContinuationSettings => "updated_continuation_settings",
            Self::AttachmentAdded => "attachment_added",
            Self::AttachmentRemoved => "attachment_removed",
            Self::ContinuationCreated => "continuation_created",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value)
    }
}

impl Display for HistoryAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpaHistoryEntry {
    id: HistoryEntryId,
    ppa_id: PpaId,
    actor_id: UserId,
    at: DateTime<Utc>,
    action: HistoryAction,
    old_value: Option<String>,
    new_value: Option<String>,
    note: Option<String>,
}

/// Persisted fields of a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntryParts {
    pub id: HistoryEntryId,
    pub ppa_id: PpaId,
    pub actor_id: UserId,
    pub at: DateTime<Utc>,
    pub action: HistoryAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub note: Option<String>,
}

impl PpaHistoryEntry {
    pub fn new(
        ppa_id: PpaId,
        actor_id: UserId,
        at: DateTime<Utc>,
        action: HistoryAction,
        old_value: Option<String>,
        new_value: Option<String>,
        note: Option<String>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            ppa_id: require_id("ppa id", ppa_id)?,
            actor_id: require_id("actor id", actor_id)?,
            at,
            action,
            old_value,
            new_value,
            note,
        })
    }

    /// Rebuilds an entry read back from storage.
    pub fn reconstruct(parts: HistoryEntryParts) -> Self {
        Self {
            id: parts.id,
            ppa_id: parts.ppa_id,
            actor_id: parts.actor_id,
            at: parts.at,
            action: parts.action,
            old_value: parts.old_value,
            new_value: parts.new_value,
            note: parts.note,
        }
    }

    /// Builds the audit entry for one aggregate change.
    pub fn from_change(
        ppa_id: PpaId,
        actor_id: UserId,
        at: DateTime<Utc>,
        change: &PpaChange,
    ) -> DomainResult<Self> {
        let (action, old_value, new_value, note) = describe_change(change);
        Self::new(ppa_id, actor_id, at, action, old_value, new_value, note)
    }

    /// Builds `AttachmentAdded` / `AttachmentRemoved` entries.
    pub fn for_attachment(
        actor_id: UserId,
        at: DateTime<Utc>,
        attachment: &PpaAttachment,
        removed: bool,
    ) -> DomainResult<Self> {
        let label = format!("{} ({})", attachment.name, attachment.kind);
        let (action, old_value, new_value) = if removed {
            (HistoryAction::AttachmentRemoved, Some(label), None)
        } else {
            (HistoryAction::AttachmentAdded, None, Some(label))
        };
        Self::new(
            attachment.ppa_id,
            actor_id,
            at,
            action,
            old_value,
            new_value,
            Some(format!("attachment_id={}", attachment.id)),
        )
    }

    pub fn id(&self) -> HistoryEntryId {
        self.id
    }

    pub fn ppa_id(&self) -> PpaId {
        self.ppa_id
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn action(&self) -> HistoryAction {
        self.action
    }

    pub fn old_value(&self) -> Option<&str> {
        self.old_value.as_deref()
    }

    pub fn new_value(&self) -> Option<&str> {
        self.new_value.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

type Described = (HistoryAction, Option<String>, Option<String>, Option<String>);

fn describe_change(change: &PpaChange) -> Described {
    match change {
        PpaChange::Created { title, status } => (
            HistoryAction::Created,
            None,
            Some(title.clone()),
            Some(format!("status={status}")),
        ),
        PpaChange::TitleUpdated { old, new } => (
            HistoryAction::UpdatedTitle,
            Some(old.clone()),
            Some(new.clone()),
            None,
        ),
        PpaChange::GeneralObjectiveUpdated { old, new } => (
            HistoryAction::UpdatedGeneralObjective,
            old.clone(),
            new.clone(),
            None,
        ),
        PpaChange::SpecificObjectivesUpdated { old, new } => (
            HistoryAction::UpdatedSpecificObjectives,
            old.clone(),
            new.clone(),
            None,
        ),
        PpaChange::DescriptionUpdated { old, new } => (
            HistoryAction::UpdatedDescription,
            old.clone(),
            new.clone(),
            None,
        ),
        PpaChange::StatusChanged { old, new } => (
            HistoryAction::ChangedStatus,
            Some(old.to_string()),
            Some(new.to_string()),
            None,
        ),
        PpaChange::ResponsibleTeacherChanged { old, new } => (
            HistoryAction::ChangedResponsibleTeacher,
            Some(old.to_string()),
            Some(new.to_string()),
            None,
        ),
        PpaChange::AssignmentsUpdated { old, new } => (
            HistoryAction::UpdatedAssignments,
            Some(json_list(old)),
            Some(json_list(new)),
            None,
        ),
        PpaChange::StudentsUpdated { old, new } => (
            HistoryAction::UpdatedStudents,
            Some(json_list(old)),
            Some(json_list(new)),
            None,
        ),
        PpaChange::ContinuationSettingsUpdated { continuation_of } => (
            HistoryAction::UpdatedContinuationSettings,
            None,
            continuation_of.map(|id| id.to_string()),
            Some("continuation_of".to_string()),
        ),
        PpaChange::ContinuationCreated {
            previous_status,
            continued_by,
        } => (
            HistoryAction::ContinuationCreated,
            Some(previous_status.to_string()),
            Some(continued_by.to_string()),
            Some("continued_by".to_string()),
        ),
    }
}

fn json_list<T: Serialize>(values: &[T]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| format!("[{} items]", values.len()))
}
