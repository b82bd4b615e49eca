//! PPA aggregate root.
//!
//! # Responsibility
//! - Own title/objectives/description, status, teacher, period, linked
//!   teacher assignments, students and continuation pointers.
//! - Enforce the status machine and field invariants.
//! - Report every effective mutation as a pending `PpaChange`.
//!
//! # Invariants
//! - Title is non-empty after trim.
//! - Assignment ids are unique and never nil.
//! - Continuation pointers never reference the PPA itself.
//! - `Archived` and `InContinuing` are absorbing: no mutator succeeds on them.
//! - A mutator that changes nothing returns `Ok(None)` and leaves
//!   `updated_at` untouched.
//!
//! # See also
//! - `model::history` turns pending changes into audit entries.

use crate::model::continuation::check_continuation_source;
use crate::model::error::{optional_text, require_id, require_text, DomainError, DomainResult};
use crate::model::now;
use crate::model::student::{normalize_student_names, student_key, PpaStudent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type PpaId = Uuid;
pub type UserId = Uuid;
pub type AcademicPeriodId = Uuid;
pub type TeacherAssignmentId = Uuid;

/// PPA life-cycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PpaStatus {
    /// Proposed, not yet started.
    Proposal,
    /// Work ongoing.
    InProgress,
    /// Work finished; may still move back or be archived.
    Completed,
    /// Terminal.
    Archived,
    /// Terminal. Set on the source record once a continuation exists.
    InContinuing,
}

impl PpaStatus {
    pub const ALL: [PpaStatus; 5] = [
        Self::Proposal,
        Self::InProgress,
        Self::Completed,
        Self::Archived,
        Self::InContinuing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::InContinuing => "in_continuing",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived | Self::InContinuing)
    }

    /// Statuses that occupy an assignment set within a period.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl Display for PpaStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending change emitted by an aggregate mutation.
///
/// The caller pairs each change with an audit entry in the same write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PpaChange {
    Created {
        title: String,
        status: PpaStatus,
    },
    TitleUpdated {
        old: String,
        new: String,
    },
    GeneralObjectiveUpdated {
        old: Option<String>,
        new: Option<String>,
    },
    SpecificObjectivesUpdated {
        old: Option<String>,
        new: Option<String>,
    },
    DescriptionUpdated {
        old: Option<String>,
        new: Option<String>,
    },
    StatusChanged {
        old: PpaStatus,
        new: PpaStatus,
    },
    ResponsibleTeacherChanged {
        old: UserId,
        new: UserId,
    },
    AssignmentsUpdated {
        old: Vec<TeacherAssignmentId>,
        new: Vec<TeacherAssignmentId>,
    },
    StudentsUpdated {
        old: Vec<String>,
        new: Vec<String>,
    },
    ContinuationSettingsUpdated {
        continuation_of: Option<PpaId>,
    },
    ContinuationCreated {
        previous_status: PpaStatus,
        continued_by: PpaId,
    },
}

/// Input for creating a new PPA.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PpaDraft {
    pub title: String,
    pub general_objective: Option<String>,
    pub specific_objectives: Option<String>,
    pub description: Option<String>,
    pub academic_period_id: AcademicPeriodId,
    pub primary_teacher_id: UserId,
    pub teacher_assignment_ids: Vec<TeacherAssignmentId>,
    pub student_names: Vec<String>,
    /// Set only by the continuation workflow.
    pub(crate) continuation_of_ppa_id: Option<PpaId>,
}

impl PpaDraft {
    pub fn new(
        title: impl Into<String>,
        academic_period_id: AcademicPeriodId,
        primary_teacher_id: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            academic_period_id,
            primary_teacher_id,
            ..Self::default()
        }
    }

    pub fn with_assignments(mut self, ids: impl IntoIterator<Item = TeacherAssignmentId>) -> Self {
        self.teacher_assignment_ids = ids.into_iter().collect();
        self
    }

    pub fn with_students<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.student_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Every persisted field, used to rebuild an aggregate from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpaParts {
    pub id: PpaId,
    pub title: String,
    pub general_objective: Option<String>,
    pub specific_objectives: Option<String>,
    pub description: Option<String>,
    pub status: PpaStatus,
    pub academic_period_id: AcademicPeriodId,
    pub primary_teacher_id: UserId,
    pub teacher_assignment_ids: Vec<TeacherAssignmentId>,
    pub students: Vec<PpaStudent>,
    pub continuation_of_ppa_id: Option<PpaId>,
    pub continued_by_ppa_id: Option<PpaId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: u32,
}

/// PPA aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ppa {
    id: PpaId,
    title: String,
    general_objective: Option<String>,
    specific_objectives: Option<String>,
    description: Option<String>,
    status: PpaStatus,
    academic_period_id: AcademicPeriodId,
    primary_teacher_id: UserId,
    teacher_assignment_ids: BTreeSet<TeacherAssignmentId>,
    students: Vec<PpaStudent>,
    continuation_of_ppa_id: Option<PpaId>,
    continued_by_ppa_id: Option<PpaId>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    version: u32,
}

impl Ppa {
    /// Creates a new PPA in `Proposal` status.
    ///
    /// Returns the aggregate and its creation changes: `Created`, followed by
    /// `ContinuationSettingsUpdated` when the draft continues another PPA.
    ///
    /// # Errors
    /// - `BlankField` when the title is blank.
    /// - `NilId` for nil period, teacher or assignment ids.
    pub fn create(draft: PpaDraft) -> DomainResult<(Self, Vec<PpaChange>)> {
        let id = Uuid::new_v4();
        let title = require_text("title", &draft.title)?;
        let academic_period_id = require_id("academic period id", draft.academic_period_id)?;
        let primary_teacher_id = require_id("primary teacher id", draft.primary_teacher_id)?;

        let mut teacher_assignment_ids = BTreeSet::new();
        for assignment_id in draft.teacher_assignment_ids {
            teacher_assignment_ids.insert(require_id("teacher assignment id", assignment_id)?);
        }

        let continuation_of_ppa_id = match draft.continuation_of_ppa_id {
            Some(source_id) => {
                let source_id = require_id("continuation source id", source_id)?;
                if source_id == id {
                    return Err(DomainError::SelfContinuation(id));
                }
                Some(source_id)
            }
            None => None,
        };

        let students = normalize_student_names(draft.student_names.as_slice())
            .into_iter()
            .map(|name| PpaStudent::new(id, name))
            .collect();

        let ppa = Self {
            id,
            title,
            general_objective: optional_text(draft.general_objective.as_deref()),
            specific_objectives: optional_text(draft.specific_objectives.as_deref()),
            description: optional_text(draft.description.as_deref()),
            status: PpaStatus::Proposal,
            academic_period_id,
            primary_teacher_id,
            teacher_assignment_ids,
            students,
            continuation_of_ppa_id,
            continued_by_ppa_id: None,
            created_at: now(),
            updated_at: None,
            version: 0,
        };

        let mut changes = vec![PpaChange::Created {
            title: ppa.title.clone(),
            status: ppa.status,
        }];
        if ppa.continuation_of_ppa_id.is_some() {
            changes.push(PpaChange::ContinuationSettingsUpdated {
                continuation_of: ppa.continuation_of_ppa_id,
            });
        }

        Ok((ppa, changes))
    }

    /// Rebuilds an aggregate from persisted fields.
    ///
    /// Applies the same invariants as `create`; persisted state that breaks
    /// them is rejected instead of masked.
    pub fn reconstruct(parts: PpaParts) -> DomainResult<Self> {
        let id = require_id("ppa id", parts.id)?;
        let title = require_text("title", &parts.title)?;
        let academic_period_id = require_id("academic period id", parts.academic_period_id)?;
        let primary_teacher_id = require_id("primary teacher id", parts.primary_teacher_id)?;

        let mut teacher_assignment_ids = BTreeSet::new();
        for assignment_id in parts.teacher_assignment_ids {
            let assignment_id = require_id("teacher assignment id", assignment_id)?;
            if !teacher_assignment_ids.insert(assignment_id) {
                return Err(DomainError::DuplicateAssociation(assignment_id));
            }
        }

        for pointer in [parts.continuation_of_ppa_id, parts.continued_by_ppa_id]
            .into_iter()
            .flatten()
        {
            if pointer == id {
                return Err(DomainError::SelfContinuation(id));
            }
        }

        Ok(Self {
            id,
            title,
            general_objective: optional_text(parts.general_objective.as_deref()),
            specific_objectives: optional_text(parts.specific_objectives.as_deref()),
            description: optional_text(parts.description.as_deref()),
            status: parts.status,
            academic_period_id,
            primary_teacher_id,
            teacher_assignment_ids,
            students: parts.students,
            continuation_of_ppa_id: parts.continuation_of_ppa_id,
            continued_by_ppa_id: parts.continued_by_ppa_id,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        })
    }

    pub fn id(&self) -> PpaId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn general_objective(&self) -> Option<&str> {
        self.general_objective.as_deref()
    }

    pub fn specific_objectives(&self) -> Option<&str> {
        self.specific_objectives.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> PpaStatus {
        self.status
    }

    pub fn academic_period_id(&self) -> AcademicPeriodId {
        self.academic_period_id
    }

    pub fn primary_teacher_id(&self) -> UserId {
        self.primary_teacher_id
    }

    pub fn teacher_assignment_ids(&self) -> &BTreeSet<TeacherAssignmentId> {
        &self.teacher_assignment_ids
    }

    pub fn students(&self) -> &[PpaStudent] {
        &self.students
    }

    pub fn continuation_of_ppa_id(&self) -> Option<PpaId> {
        self.continuation_of_ppa_id
    }

    pub fn continued_by_ppa_id(&self) -> Option<PpaId> {
        self.continued_by_ppa_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Optimistic concurrency token as last loaded or saved.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Records the version assigned by a successful save.
    pub fn mark_persisted(&mut self, version: u32) {
        self.version = version;
    }

    /// Changes the life-cycle status.
    ///
    /// # Errors
    /// - `TerminalState` when the current status is `Archived` or
    ///   `InContinuing`, whatever `new_status` is (the terminal check runs
    ///   before the same-status no-op).
    /// - `ForbiddenTransition` for `InContinuing`, which only the
    ///   continuation workflow may set.
    pub fn change_status(&mut self, new_status: PpaStatus) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        if new_status == PpaStatus::InContinuing {
            return Err(DomainError::ForbiddenTransition {
                from: self.status,
                to: new_status,
            });
        }
        if new_status == self.status {
            return Ok(None);
        }

        let old = self.status;
        self.status = new_status;
        self.touch();
        Ok(Some(PpaChange::StatusChanged {
            old,
            new: new_status,
        }))
    }

    pub fn update_title(&mut self, title: &str) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let title = require_text("title", title)?;
        if title == self.title {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.title, title);
        self.touch();
        Ok(Some(PpaChange::TitleUpdated {
            old,
            new: self.title.clone(),
        }))
    }

    pub fn update_general_objective(
        &mut self,
        value: Option<&str>,
    ) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let value = optional_text(value);
        if value == self.general_objective {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.general_objective, value);
        self.touch();
        Ok(Some(PpaChange::GeneralObjectiveUpdated {
            old,
            new: self.general_objective.clone(),
        }))
    }

    pub fn update_specific_objectives(
        &mut self,
        value: Option<&str>,
    ) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let value = optional_text(value);
        if value == self.specific_objectives {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.specific_objectives, value);
        self.touch();
        Ok(Some(PpaChange::SpecificObjectivesUpdated {
            old,
            new: self.specific_objectives.clone(),
        }))
    }

    pub fn update_description(&mut self, value: Option<&str>) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let value = optional_text(value);
        if value == self.description {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.description, value);
        self.touch();
        Ok(Some(PpaChange::DescriptionUpdated {
            old,
            new: self.description.clone(),
        }))
    }

    pub fn change_primary_teacher(&mut self, teacher_id: UserId) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let teacher_id = require_id("primary teacher id", teacher_id)?;
        if teacher_id == self.primary_teacher_id {
            return Ok(None);
        }
        let old = std::mem::replace(&mut self.primary_teacher_id, teacher_id);
        self.touch();
        Ok(Some(PpaChange::ResponsibleTeacherChanged {
            old,
            new: teacher_id,
        }))
    }

    /// Links one teacher assignment.
    ///
    /// # Errors
    /// - `NilId` for a nil id.
    /// - `DuplicateAssociation` when the id is already linked.
    pub fn attach_teacher_assignment(
        &mut self,
        assignment_id: TeacherAssignmentId,
    ) -> DomainResult<PpaChange> {
        self.ensure_mutable()?;
        let assignment_id = require_id("teacher assignment id", assignment_id)?;
        if self.teacher_assignment_ids.contains(&assignment_id) {
            return Err(DomainError::DuplicateAssociation(assignment_id));
        }
        let old = self.assignment_list();
        self.teacher_assignment_ids.insert(assignment_id);
        self.touch();
        Ok(PpaChange::AssignmentsUpdated {
            old,
            new: self.assignment_list(),
        })
    }

    /// Unlinks one teacher assignment; absent ids are a no-op.
    pub fn remove_teacher_assignment(
        &mut self,
        assignment_id: TeacherAssignmentId,
    ) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        if !self.teacher_assignment_ids.contains(&assignment_id) {
            return Ok(None);
        }
        let old = self.assignment_list();
        self.teacher_assignment_ids.remove(&assignment_id);
        self.touch();
        Ok(Some(PpaChange::AssignmentsUpdated {
            old,
            new: self.assignment_list(),
        }))
    }

    /// Replaces the student list.
    ///
    /// Names are trimmed and deduplicated case-insensitively. Students whose
    /// name survives keep their id. Same set (ignoring case and order) is a
    /// no-op.
    pub fn set_students<S: AsRef<str>>(&mut self, names: &[S]) -> DomainResult<Option<PpaChange>> {
        self.ensure_mutable()?;
        let normalized = normalize_student_names(names);

        let current_keys: BTreeSet<String> =
            self.students.iter().map(PpaStudent::dedupe_key).collect();
        let next_keys: BTreeSet<String> = normalized.iter().map(|name| student_key(name)).collect();
        if current_keys == next_keys {
            return Ok(None);
        }

        let old = self.student_names();
        let ppa_id = self.id;
        let mut previous = std::mem::take(&mut self.students);
        self.students = normalized
            .into_iter()
            .map(|name| {
                let key = student_key(&name);
                match previous.iter().position(|student| student.dedupe_key() == key) {
                    Some(index) => {
                        let mut kept = previous.swap_remove(index);
                        kept.name = name;
                        kept
                    }
                    None => PpaStudent::new(ppa_id, name),
                }
            })
            .collect();
        self.touch();

        Ok(Some(PpaChange::StudentsUpdated {
            old,
            new: self.student_names(),
        }))
    }

    /// Freezes this PPA as the source of a continuation.
    ///
    /// Sets `continued_by_ppa_id` and moves to `InContinuing`. This is the
    /// only path into `InContinuing` and the only transition allowed out of
    /// `Archived`.
    pub fn mark_continued_by(&mut self, successor_id: PpaId) -> DomainResult<PpaChange> {
        check_continuation_source(self)?;
        let successor_id = require_id("continuation target id", successor_id)?;
        if successor_id == self.id {
            return Err(DomainError::SelfContinuation(self.id));
        }

        let previous_status = self.status;
        self.continued_by_ppa_id = Some(successor_id);
        self.status = PpaStatus::InContinuing;
        self.touch();
        Ok(PpaChange::ContinuationCreated {
            previous_status,
            continued_by: successor_id,
        })
    }

    pub fn student_names(&self) -> Vec<String> {
        self.students
            .iter()
            .map(|student| student.name.clone())
            .collect()
    }

    fn assignment_list(&self) -> Vec<TeacherAssignmentId> {
        self.teacher_assignment_ids.iter().copied().collect()
    }

    fn ensure_mutable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::TerminalState {
                ppa_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Some(now());
    }
}
