//! Continuation workflow.
//!
//! # Responsibility
//! - Create a successor PPA in another academic period and link both
//!   records.
//!
//! # Invariants
//! - Source must be `Completed` or `Archived` with no successor yet.
//! - Target period differs from the source period, exists and is active.
//! - Target is created, source is frozen as `InContinuing` and all history
//!   is written in one transaction, or nothing is written.

use crate::collab::ReferenceData;
use crate::model::continuation::check_continuation_source;
use crate::model::ppa::{AcademicPeriodId, Ppa, PpaDraft, PpaId, TeacherAssignmentId, UserId};
use crate::repo::ppa_repo::PpaRepository;
use crate::service::{
    check_assignments, check_period, history_for, log_outcome, PpaServiceError, ServiceResult,
};
use log::info;
use std::collections::BTreeSet;

/// Caller choices for the successor record. Unset fields copy the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationRequest {
    pub source_ppa_id: PpaId,
    pub target_period_id: AcademicPeriodId,
    pub title: Option<String>,
    pub primary_teacher_id: Option<UserId>,
    pub teacher_assignment_ids: Option<Vec<TeacherAssignmentId>>,
    /// Copy general/specific objectives and description.
    pub copy_objectives: bool,
    pub copy_students: bool,
}

impl ContinuationRequest {
    pub fn new(source_ppa_id: PpaId, target_period_id: AcademicPeriodId) -> Self {
        Self {
            source_ppa_id,
            target_period_id,
            title: None,
            primary_teacher_id: None,
            teacher_assignment_ids: None,
            copy_objectives: true,
            copy_students: true,
        }
    }
}

/// Both records as persisted by a successful continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationOutcome {
    pub source: Ppa,
    pub target: Ppa,
}

pub struct ContinuationService<R: PpaRepository, D: ReferenceData> {
    ppas: R,
    reference: D,
}

impl<R: PpaRepository, D: ReferenceData> ContinuationService<R, D> {
    pub fn new(ppas: R, reference: D) -> Self {
        Self { ppas, reference }
    }

    /// Continues `request.source_ppa_id` into `request.target_period_id`.
    ///
    /// # Errors
    /// - `PpaNotFound` when the source does not exist.
    /// - `AlreadyContinued` / `NotContinuable` when the source is not a valid
    ///   continuation source.
    /// - `SamePeriod`, `PeriodNotFound`, `PeriodInactive` for the target
    ///   period.
    /// - `AssignmentNotFound` / `AssignmentInactive` for target assignments.
    /// - `AssignmentSetOccupied` when an active PPA already holds the target
    ///   assignment set in the target period.
    /// - `AlreadyContinued` / version conflict when another writer continued
    ///   or changed the source concurrently.
    pub fn continue_ppa(
        &self,
        request: ContinuationRequest,
        actor_id: UserId,
    ) -> ServiceResult<ContinuationOutcome> {
        let source_id = request.source_ppa_id;
        let result = self.continue_inner(request, actor_id);
        match &result {
            Ok(outcome) => info!(
                "event=ppa_continue module=service status=ok id={source_id} target_id={} target_period={}",
                outcome.target.id(),
                outcome.target.academic_period_id()
            ),
            Err(_) => log_outcome("ppa_continue", source_id, &result),
        }
        result
    }

    fn continue_inner(
        &self,
        request: ContinuationRequest,
        actor_id: UserId,
    ) -> ServiceResult<ContinuationOutcome> {
        let mut source = self
            .ppas
            .get_ppa(request.source_ppa_id)?
            .ok_or(PpaServiceError::PpaNotFound(request.source_ppa_id))?;
        check_continuation_source(&source)?;

        if request.target_period_id == source.academic_period_id() {
            return Err(PpaServiceError::SamePeriod(request.target_period_id));
        }
        check_period(&self.reference, request.target_period_id, true)?;

        let assignments: BTreeSet<TeacherAssignmentId> = match request.teacher_assignment_ids {
            Some(ids) => ids.into_iter().collect(),
            None => source.teacher_assignment_ids().clone(),
        };
        check_assignments(&self.reference, &assignments)?;

        let mut draft = PpaDraft::new(
            request
                .title
                .unwrap_or_else(|| source.title().to_string()),
            request.target_period_id,
            request
                .primary_teacher_id
                .unwrap_or_else(|| source.primary_teacher_id()),
        )
        .with_assignments(assignments);
        if request.copy_objectives {
            draft.general_objective = source.general_objective().map(str::to_string);
            draft.specific_objectives = source.specific_objectives().map(str::to_string);
            draft.description = source.description().map(str::to_string);
        }
        if request.copy_students {
            draft.student_names = source.student_names();
        }
        draft.continuation_of_ppa_id = Some(source.id());

        let (target, target_changes) = Ppa::create(draft)?;
        let source_change = source.mark_continued_by(target.id())?;

        let mut history = history_for(&source, actor_id, &[source_change])?;
        history.extend(history_for(&target, actor_id, &target_changes)?);

        let version = self.ppas.commit_continuation(&source, &target, &history)?;
        source.mark_persisted(version);

        Ok(ContinuationOutcome { source, target })
    }
}
